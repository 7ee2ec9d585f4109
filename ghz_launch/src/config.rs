//! Persisted run configuration.
//!
//! The configuration is stored as
//!
//! ```json
//! {"params": {"n_nodes": 3, "fidelity": 1.0, "delta": 0.01,
//!             "epsilon": 0.0, "S": 10, "verbose": 2},
//!  "ordering": [0, 1, 2]}
//! ```
//!
//! and reused across runs as long as the requested parameters match.

use crate::error::{ConfigError, DomainError, LaunchError};
use crate::security::{self, SecurityParams};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Parameters requested for this run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RequestedParams {
    pub n_nodes: usize,
    pub fidelity: f64,
    pub delta: f64,
    pub verbose: u32,
}

/// The `params` section of the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Params {
    pub n_nodes: usize,
    pub fidelity: f64,
    pub delta: f64,
    pub epsilon: f64,
    #[serde(rename = "S")]
    pub rounds: u32,
    pub verbose: u32,
}

/// A complete run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    pub params: Params,

    /// Party ordering; always the identity permutation for now
    pub ordering: Vec<usize>,
}

impl Configuration {
    /// Generates a fresh configuration for the requested parameters.
    pub fn generate(requested: &RequestedParams) -> Result<Self, DomainError> {
        let security = SecurityParams::derive(requested.n_nodes, requested.fidelity, requested.delta)?;

        Ok(Self {
            params: Params {
                n_nodes: requested.n_nodes,
                fidelity: requested.fidelity,
                delta: requested.delta,
                epsilon: security.epsilon,
                rounds: security.rounds,
                verbose: requested.verbose,
            },
            ordering: (0..requested.n_nodes).collect(),
        })
    }

    pub fn n_nodes(&self) -> usize {
        self.params.n_nodes
    }

    /// Returns true if this configuration was generated for `requested`.
    pub fn matches(&self, requested: &RequestedParams) -> bool {
        self.params.n_nodes == requested.n_nodes
            && self.params.fidelity == requested.fidelity
            && self.params.delta == requested.delta
            && self.params.verbose == requested.verbose
    }

    /// Checks the structural and derived-field invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.params;
        security::check_nodes(p.n_nodes).map_err(|e| ConfigError::Schema(e.to_string()))?;

        let derived = SecurityParams::derive(p.n_nodes, p.fidelity, p.delta)
            .map_err(|e| ConfigError::Schema(e.to_string()))?;
        if (derived.epsilon - p.epsilon).abs() > 1e-12 {
            return Err(ConfigError::Schema(format!(
                "epsilon {} does not match fidelity {} (expected {})",
                p.epsilon, p.fidelity, derived.epsilon
            )));
        }
        if derived.rounds != p.rounds {
            return Err(ConfigError::Schema(format!(
                "S = {} does not match parameters (expected {})",
                p.rounds, derived.rounds
            )));
        }

        if self.ordering.len() != p.n_nodes {
            return Err(ConfigError::Schema(format!(
                "ordering has {} entries for {} parties",
                self.ordering.len(),
                p.n_nodes
            )));
        }
        let mut seen = vec![false; self.ordering.len()];
        for &index in &self.ordering {
            match seen.get_mut(index) {
                Some(slot) if !*slot => *slot = true,
                _ => {
                    return Err(ConfigError::Schema(format!(
                        "ordering {:?} is not a permutation of 0..{}",
                        self.ordering, p.n_nodes
                    )))
                }
            }
        }

        Ok(())
    }
}

/// Where the configuration used for a run came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Reused the persisted configuration unchanged
    Loaded,

    /// No configuration existed
    Generated,

    /// The persisted configuration was stale or unusable
    Regenerated(String),
}

/// Loads, validates and persists the run configuration.
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    /// Creates a store backed by `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads and validates the persisted configuration.
    ///
    /// Returns `Ok(None)` if no configuration has been persisted yet.
    pub fn load(&self) -> Result<Option<Configuration>, ConfigError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let config: Configuration = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(Some(config))
    }

    /// Returns the persisted configuration if it matches `requested`,
    /// otherwise generates, persists and returns a new one.
    pub fn load_or_generate(
        &self,
        requested: &RequestedParams,
    ) -> Result<(Configuration, ConfigSource), LaunchError> {
        let source = match self.load() {
            Ok(Some(config)) if config.matches(requested) => {
                debug!("Reusing configuration from {}", self.path.display());
                return Ok((config, ConfigSource::Loaded));
            }
            Ok(Some(_)) => {
                info!("Configuration at {} is stale, regenerating", self.path.display());
                ConfigSource::Regenerated("requested parameters changed".to_string())
            }
            Ok(None) => {
                info!("Missing {}, generating a new one", self.path.display());
                ConfigSource::Generated
            }
            Err(e) => {
                warn!("Unusable configuration at {}: {}; regenerating", self.path.display(), e);
                ConfigSource::Regenerated(e.to_string())
            }
        };

        let config = Configuration::generate(requested)?;
        self.persist(&config)?;
        Ok((config, source))
    }

    /// Writes the configuration to a temporary file and renames it over the
    /// target, so a crash never leaves a partial file behind.
    pub fn persist(&self, config: &Configuration) -> Result<(), LaunchError> {
        let json = serde_json::to_string_pretty(config).map_err(|source| LaunchError::Json {
            what: "configuration",
            source,
        })?;
        write_atomic(&self.path, json.as_bytes())
    }
}

/// Replaces `path` with `bytes` via a sibling temporary file.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), LaunchError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| LaunchError::io(parent, e))?;
    }

    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("tmpfile");
    let tmp = path.with_file_name(format!(".{}.tmp.{}", name, std::process::id()));

    let mut file = File::create(&tmp).map_err(|e| LaunchError::io(&tmp, e))?;
    file.write_all(bytes).map_err(|e| LaunchError::io(&tmp, e))?;
    file.sync_all().map_err(|e| LaunchError::io(&tmp, e))?;
    drop(file);

    fs::rename(&tmp, path).map_err(|e| LaunchError::io(path, e))
}
