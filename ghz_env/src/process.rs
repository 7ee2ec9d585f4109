//! Party process abstraction.

use async_trait::async_trait;
use crate::error::EnvError;
use crate::types::{PartyExit, PartyId};

/// A running party process.
///
/// Dropping a handle must not leave the process orphaned; production
/// handles kill the child on drop.
#[async_trait]
pub trait PartyProcess: Send {
    /// The party this process runs.
    fn party(&self) -> PartyId;

    /// OS process id, if the process is still known to the OS.
    fn pid(&self) -> Option<u32>;

    /// Waits for the process to exit.
    async fn wait(&mut self) -> Result<PartyExit, EnvError>;

    /// Kills the process and reaps it.
    async fn kill(&mut self) -> Result<(), EnvError>;
}

/// Starts party processes.
///
/// `spawn` must not block on the child: it returns as soon as the OS has
/// accepted the process.
pub trait PartySpawner: Send + Sync {
    /// Spawns the party with the given argument vector.
    ///
    /// # Arguments
    /// * `party` - The party being launched
    /// * `args` - `[index, role token words...]`
    fn spawn(&self, party: PartyId, args: &[String]) -> Result<Box<dyn PartyProcess>, EnvError>;
}
