//! Error types for the launcher's environment collaborators.

use crate::types::PartyId;
use thiserror::Error;

/// Errors raised by the fabric, broadcast service or party spawner.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Fabric failed to start or stop
    #[error("Fabric error: {0}")]
    FabricError(String),

    /// Broadcast service failed or exited abnormally
    #[error("Broadcast error: {0}")]
    BroadcastError(String),

    /// A party process could not be started
    #[error("Failed to spawn {party}: {reason}")]
    SpawnFailed { party: PartyId, reason: String },

    /// Waiting on or killing a running process failed
    #[error("Process error: {0}")]
    ProcessError(String),

    /// A command line was empty or malformed
    #[error("Invalid command: {0}")]
    InvalidCommand(String),
}

impl EnvError {
    /// Creates a fabric error.
    pub fn fabric(msg: impl Into<String>) -> Self {
        Self::FabricError(msg.into())
    }

    /// Creates a broadcast error.
    pub fn broadcast(msg: impl Into<String>) -> Self {
        Self::BroadcastError(msg.into())
    }

    /// Creates a spawn error for a party.
    pub fn spawn_failed(party: PartyId, reason: impl std::fmt::Display) -> Self {
        Self::SpawnFailed {
            party,
            reason: reason.to_string(),
        }
    }

    /// Creates a process error.
    pub fn process(msg: impl Into<String>) -> Self {
        Self::ProcessError(msg.into())
    }
}
