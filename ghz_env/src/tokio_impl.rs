//! Production collaborators backed by `tokio::process`.
//!
//! Each collaborator drives an external program: the simulator backend for
//! the fabric, the broadcast server, and one node program per party.

use crate::error::EnvError;
use crate::network::{BroadcastService, NetworkFabric};
use crate::process::{PartyProcess, PartySpawner};
use crate::types::{PartyExit, PartyId, Topology};
use async_trait::async_trait;
use tokio::process::{Child, Command};
use tracing::{debug, info};

/// A program plus its leading arguments, e.g. `python3 node.py`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    program: String,
    args: Vec<String>,
}

impl CommandLine {
    /// Creates a command line from a program and arguments.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Splits a whitespace-separated command line.
    pub fn parse(line: &str) -> Result<Self, EnvError> {
        let mut words = line.split_whitespace().map(str::to_string);
        let program = words
            .next()
            .ok_or_else(|| EnvError::InvalidCommand(format!("empty command line {:?}", line)))?;
        Ok(Self {
            program,
            args: words.collect(),
        })
    }

    /// Returns the program name.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Builds a `Command` with the leading arguments applied.
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }
}

impl std::fmt::Display for CommandLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Fabric driven by start/stop commands of an external simulator.
///
/// `start` appends `--nodes <names> --topology <topology>` to the start
/// command and considers the fabric ready once that command exits with
/// status 0. `stop` runs the stop command after any start attempt, even one
/// that failed or was cancelled part way.
pub struct CommandFabric {
    start_cmd: CommandLine,
    stop_cmd: Option<CommandLine>,

    /// Set as soon as the start command is launched
    started: bool,
    ready: bool,
}

impl CommandFabric {
    /// Creates a fabric from its start and optional stop commands.
    pub fn new(start_cmd: CommandLine, stop_cmd: Option<CommandLine>) -> Self {
        Self {
            start_cmd,
            stop_cmd,
            started: false,
            ready: false,
        }
    }
}

#[async_trait]
impl NetworkFabric for CommandFabric {
    async fn start(&mut self, parties: &[PartyId], topology: Topology) -> Result<(), EnvError> {
        let names = parties
            .iter()
            .map(PartyId::name)
            .collect::<Vec<_>>()
            .join(",");

        info!("Starting fabric: {} --nodes {} --topology {}", self.start_cmd, names, topology);

        self.started = true;
        let status = self
            .start_cmd
            .command()
            .arg("--nodes")
            .arg(&names)
            .arg("--topology")
            .arg(topology.name())
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| EnvError::fabric(format!("failed to run {}: {}", self.start_cmd, e)))?;

        if !status.success() {
            return Err(EnvError::fabric(format!("{} exited with {}", self.start_cmd, status)));
        }

        self.ready = true;
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready
    }

    async fn stop(&mut self) -> Result<(), EnvError> {
        self.ready = false;
        let was_started = std::mem::replace(&mut self.started, false);
        let Some(stop_cmd) = &self.stop_cmd else {
            return Ok(());
        };
        if !was_started {
            return Ok(());
        }

        debug!("Stopping fabric: {}", stop_cmd);
        let status = stop_cmd
            .command()
            .status()
            .await
            .map_err(|e| EnvError::fabric(format!("failed to run {}: {}", stop_cmd, e)))?;

        if status.success() {
            Ok(())
        } else {
            Err(EnvError::fabric(format!("{} exited with {}", stop_cmd, status)))
        }
    }
}

/// Broadcast service run as a long-lived child process.
pub struct CommandBroadcast {
    cmd: CommandLine,
    child: Option<Child>,
}

impl CommandBroadcast {
    /// Creates a broadcast service from its command line.
    pub fn new(cmd: CommandLine) -> Self {
        Self { cmd, child: None }
    }

    /// Returns true while the broadcast process is running.
    pub fn is_running(&self) -> bool {
        self.child.is_some()
    }
}

#[async_trait]
impl BroadcastService for CommandBroadcast {
    async fn create(&mut self) -> Result<(), EnvError> {
        let child = self
            .cmd
            .command()
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EnvError::broadcast(format!("failed to start {}: {}", self.cmd, e)))?;

        info!("Broadcast service started (pid={:?})", child.id());

        let child = self.child.insert(child);
        let status = child
            .wait()
            .await
            .map_err(|e| EnvError::broadcast(e.to_string()))?;
        self.child = None;

        if status.success() {
            Ok(())
        } else {
            Err(EnvError::broadcast(format!("{} exited with {}", self.cmd, status)))
        }
    }

    async fn shutdown(&mut self) -> Result<(), EnvError> {
        if let Some(mut child) = self.child.take() {
            child
                .kill()
                .await
                .map_err(|e| EnvError::broadcast(format!("failed to kill broadcast service: {}", e)))?;
        }
        Ok(())
    }
}

/// Spawns one OS process per party: `<program> <args...> <index> <role...>`.
pub struct CommandSpawner {
    cmd: CommandLine,
}

impl CommandSpawner {
    /// Creates a spawner for the given node program.
    pub fn new(cmd: CommandLine) -> Self {
        Self { cmd }
    }
}

impl PartySpawner for CommandSpawner {
    fn spawn(&self, party: PartyId, args: &[String]) -> Result<Box<dyn PartyProcess>, EnvError> {
        let child = self
            .cmd
            .command()
            .args(args)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EnvError::spawn_failed(party, format!("{}: {}", self.cmd, e)))?;

        debug!("Spawned {} (pid={:?})", party, child.id());
        Ok(Box::new(ChildProcess { party, child }))
    }
}

/// A party running as a child process.
pub struct ChildProcess {
    party: PartyId,
    child: Child,
}

#[async_trait]
impl PartyProcess for ChildProcess {
    fn party(&self) -> PartyId {
        self.party
    }

    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    async fn wait(&mut self) -> Result<PartyExit, EnvError> {
        self.child
            .wait()
            .await
            .map(PartyExit::from)
            .map_err(|e| EnvError::process(format!("{}: {}", self.party, e)))
    }

    async fn kill(&mut self) -> Result<(), EnvError> {
        // Already reaped
        if self.child.id().is_none() {
            return Ok(());
        }
        self.child
            .kill()
            .await
            .map_err(|e| EnvError::process(format!("failed to kill {}: {}", self.party, e)))
    }
}
