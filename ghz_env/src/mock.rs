//! In-memory collaborators for testing the launcher without real processes.
//!
//! Every mock shares its recorded state through `Arc`s so a test can keep a
//! clone of the mock and inspect it after handing the original over.

use crate::error::EnvError;
use crate::network::{BroadcastService, NetworkFabric};
use crate::process::{PartyProcess, PartySpawner};
use crate::types::{PartyExit, PartyId, Topology};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Fabric that records `start`/`stop` calls.
#[derive(Clone, Default)]
pub struct MockFabric {
    started_with: Arc<Mutex<Option<(Vec<PartyId>, Topology)>>>,
    ready: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
    fail_start: bool,
    hang_start: bool,
    report_ready: bool,
}

impl MockFabric {
    /// A fabric that starts and becomes ready.
    pub fn new() -> Self {
        Self {
            report_ready: true,
            ..Default::default()
        }
    }

    /// A fabric whose `start` fails.
    pub fn failing() -> Self {
        Self {
            fail_start: true,
            ..Default::default()
        }
    }

    /// A fabric whose `start` never returns.
    pub fn hanging() -> Self {
        Self {
            hang_start: true,
            report_ready: true,
            ..Default::default()
        }
    }

    /// A fabric whose `start` succeeds but never reports ready.
    pub fn never_ready() -> Self {
        Self::default()
    }

    /// Parties and topology passed to `start`, if it was called.
    pub fn started_with(&self) -> Option<(Vec<PartyId>, Topology)> {
        self.started_with.lock().unwrap().clone()
    }

    /// Returns true if `stop` was called.
    pub fn was_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NetworkFabric for MockFabric {
    async fn start(&mut self, parties: &[PartyId], topology: Topology) -> Result<(), EnvError> {
        *self.started_with.lock().unwrap() = Some((parties.to_vec(), topology));
        if self.hang_start {
            std::future::pending::<()>().await;
        }
        if self.fail_start {
            return Err(EnvError::fabric("mock fabric refused to start"));
        }
        self.ready.store(self.report_ready, Ordering::SeqCst);
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn stop(&mut self) -> Result<(), EnvError> {
        self.ready.store(false, Ordering::SeqCst);
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Broadcast service that either returns immediately or runs until shut down.
#[derive(Clone, Default)]
pub struct MockBroadcast {
    created: Arc<AtomicUsize>,
    shut_down: Arc<AtomicBool>,
    run_forever: bool,
}

impl MockBroadcast {
    /// A service whose `create` returns as soon as it is called.
    pub fn immediate() -> Self {
        Self::default()
    }

    /// A service whose `create` never returns on its own.
    pub fn forever() -> Self {
        Self {
            run_forever: true,
            ..Default::default()
        }
    }

    /// Number of times `create` was called.
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Returns true if `shutdown` was called.
    pub fn was_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BroadcastService for MockBroadcast {
    async fn create(&mut self) -> Result<(), EnvError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        if self.run_forever {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), EnvError> {
        self.shut_down.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// How spawned mock parties behave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartyBehavior {
    /// Exit with the given code after the given delay.
    Exit { code: i32, after: Duration },
    /// Run until killed.
    RunForever,
}

/// Spawner that records argument vectors instead of starting processes.
#[derive(Clone)]
pub struct MockSpawner {
    spawned: Arc<Mutex<Vec<(PartyId, Vec<String>)>>>,
    killed: Arc<Mutex<Vec<PartyId>>>,
    fail_on: HashSet<usize>,
    behavior: PartyBehavior,
    /// Fabric whose readiness is sampled on every spawn
    observed_fabric: Option<MockFabric>,
    spawned_before_ready: Arc<AtomicBool>,
}

impl MockSpawner {
    /// A spawner whose parties exit successfully right away.
    pub fn new() -> Self {
        Self::with_behavior(PartyBehavior::Exit {
            code: 0,
            after: Duration::ZERO,
        })
    }

    /// A spawner whose parties follow `behavior`.
    pub fn with_behavior(behavior: PartyBehavior) -> Self {
        Self {
            spawned: Arc::new(Mutex::new(Vec::new())),
            killed: Arc::new(Mutex::new(Vec::new())),
            fail_on: HashSet::new(),
            behavior,
            observed_fabric: None,
            spawned_before_ready: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Makes spawning fail for the given party indices.
    pub fn failing_on(mut self, indices: &[usize]) -> Self {
        self.fail_on.extend(indices.iter().copied());
        self
    }

    /// Records whether any spawn happens while `fabric` is not ready.
    pub fn observing(mut self, fabric: &MockFabric) -> Self {
        self.observed_fabric = Some(fabric.clone());
        self
    }

    /// Parties spawned so far with their argument vectors.
    pub fn spawned(&self) -> Vec<(PartyId, Vec<String>)> {
        self.spawned.lock().unwrap().clone()
    }

    /// Parties killed so far.
    pub fn killed(&self) -> Vec<PartyId> {
        self.killed.lock().unwrap().clone()
    }

    /// Returns true if a spawn was observed before the fabric was ready.
    pub fn spawned_before_ready(&self) -> bool {
        self.spawned_before_ready.load(Ordering::SeqCst)
    }
}

impl Default for MockSpawner {
    fn default() -> Self {
        Self::new()
    }
}

impl PartySpawner for MockSpawner {
    fn spawn(&self, party: PartyId, args: &[String]) -> Result<Box<dyn PartyProcess>, EnvError> {
        if let Some(fabric) = &self.observed_fabric {
            if !fabric.is_ready() {
                self.spawned_before_ready.store(true, Ordering::SeqCst);
            }
        }

        if self.fail_on.contains(&party.index()) {
            return Err(EnvError::spawn_failed(party, "mock spawn failure"));
        }

        self.spawned.lock().unwrap().push((party, args.to_vec()));
        Ok(Box::new(MockParty {
            party,
            behavior: self.behavior,
            killed: Arc::clone(&self.killed),
            exited: false,
        }))
    }
}

/// A party spawned by [`MockSpawner`].
pub struct MockParty {
    party: PartyId,
    behavior: PartyBehavior,
    killed: Arc<Mutex<Vec<PartyId>>>,
    exited: bool,
}

#[async_trait]
impl PartyProcess for MockParty {
    fn party(&self) -> PartyId {
        self.party
    }

    fn pid(&self) -> Option<u32> {
        if self.exited {
            None
        } else {
            Some(10_000 + self.party.index() as u32)
        }
    }

    async fn wait(&mut self) -> Result<PartyExit, EnvError> {
        match self.behavior {
            PartyBehavior::Exit { code, after } => {
                tokio::time::sleep(after).await;
                self.exited = true;
                Ok(PartyExit { code: Some(code) })
            }
            PartyBehavior::RunForever => std::future::pending().await,
        }
    }

    async fn kill(&mut self) -> Result<(), EnvError> {
        if !self.exited {
            self.exited = true;
            self.killed.lock().unwrap().push(self.party);
        }
        Ok(())
    }
}
