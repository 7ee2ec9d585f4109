//! Quantum fabric and classical broadcast abstractions.

use async_trait::async_trait;
use crate::error::EnvError;
use crate::types::{PartyId, Topology};

/// The simulated quantum channel fabric linking every party.
///
/// # Implementations
///
/// - **Production**: `CommandFabric` - drives an external simulator backend
/// - **Tests**: `mock::MockFabric` - records calls, configurable readiness
///
/// # Lifecycle
///
/// ```text
/// Orchestrator                 Fabric
///   |                             |
///   |-- start(parties, topo) ---->|
///   |<------------- Ok -----------|
///   |-- is_ready()? ------------->|   must be true before any spawn
///   |          ...                |
///   |-- stop() ------------------>|
/// ```
#[async_trait]
pub trait NetworkFabric: Send + Sync {
    /// Brings up the fabric for the given parties.
    ///
    /// Returns once the backend reports that it has started. Callers still
    /// check [`NetworkFabric::is_ready`] before spawning parties.
    async fn start(&mut self, parties: &[PartyId], topology: Topology) -> Result<(), EnvError>;

    /// Returns true once the fabric accepts party connections.
    fn is_ready(&self) -> bool;

    /// Tears the fabric down. Safe to call when never started.
    async fn stop(&mut self) -> Result<(), EnvError>;
}

/// The classical broadcast channel used between parties.
#[async_trait]
pub trait BroadcastService: Send + Sync {
    /// Creates the broadcast channel and serves it until terminated.
    ///
    /// Returns `Ok(())` when the service ends on its own.
    async fn create(&mut self) -> Result<(), EnvError>;

    /// Terminates the service. Safe to call when not running.
    async fn shutdown(&mut self) -> Result<(), EnvError>;
}
