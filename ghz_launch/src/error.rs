//! Error types for the launcher core.

use ghz_env::{EnvError, PartyId};
use std::path::PathBuf;
use thiserror::Error;

/// An experiment parameter outside its valid domain.
///
/// Always carries the offending field and value; values are never clamped.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid {field} = {value}: {reason}")]
pub struct DomainError {
    pub field: &'static str,
    pub value: String,
    pub reason: String,
}

impl DomainError {
    /// Creates a domain error for `field`.
    pub fn new(field: &'static str, value: impl std::fmt::Display, reason: impl Into<String>) -> Self {
        Self {
            field,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// A persisted configuration that cannot be used as-is.
///
/// Recovered locally by regenerating the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("configuration violates schema: {0}")]
    Schema(String),
}

/// Errors that abort a launcher run.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid {what} JSON: {source}")]
    Json {
        what: &'static str,
        source: serde_json::Error,
    },

    #[error("invalid {what} command: {source}")]
    Command {
        what: &'static str,
        source: EnvError,
    },

    #[error("fabric is not ready; refusing to spawn parties")]
    FabricNotReady,

    #[error("fabric failure: {0}")]
    Fabric(#[source] EnvError),

    #[error("broadcast service failure: {0}")]
    Broadcast(#[source] EnvError),

    #[error("failed to spawn parties: {}", describe_failures(.failed))]
    Spawn { failed: Vec<(PartyId, EnvError)> },

    #[error("run interrupted")]
    Interrupted,
}

impl LaunchError {
    /// Creates an I/O error for `path`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Wraps an unusable command line for the `what` collaborator.
    pub fn command(what: &'static str) -> impl FnOnce(EnvError) -> Self {
        move |source| Self::Command { what, source }
    }
}

fn describe_failures(failed: &[(PartyId, EnvError)]) -> String {
    failed
        .iter()
        .map(|(party, err)| format!("{} ({})", party, err))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_error_names_field_and_value() {
        let err = DomainError::new("fidelity", 1.5, "must lie in (0, 1]");
        assert_eq!(err.to_string(), "invalid fidelity = 1.5: must lie in (0, 1]");
    }

    #[test]
    fn test_spawn_error_lists_every_party() {
        let err = LaunchError::Spawn {
            failed: vec![
                (PartyId(1), EnvError::spawn_failed(PartyId(1), "boom")),
                (PartyId(3), EnvError::spawn_failed(PartyId(3), "boom")),
            ],
        };
        let message = err.to_string();
        assert!(message.starts_with("failed to spawn parties: node1"));
        assert!(message.contains("node1"));
        assert!(message.contains("node3"));
    }
}
