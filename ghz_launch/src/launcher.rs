//! Per-party process launch.
//!
//! Every party runs as its own OS process with arguments
//! `[index, role token words...]`. All parties are spawned without blocking;
//! [`LaunchedParties::wait_all`] is the join barrier afterwards.

use crate::error::LaunchError;
use crate::roles::RoleAssignment;
use ghz_env::{EnvError, NetworkFabric, PartyExit, PartyId, PartyProcess, PartySpawner};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Argument vectors for every party of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    entries: Vec<(PartyId, Vec<String>)>,
}

impl LaunchPlan {
    /// Builds the plan for `n_nodes` parties.
    pub fn build(n_nodes: usize, assignment: &RoleAssignment, unentangled_adv: bool) -> Self {
        let entries = PartyId::all(n_nodes)
            .into_iter()
            .map(|party| {
                let mut args = vec![party.index().to_string()];
                args.extend(assignment.role_of(party.index(), unentangled_adv).token());
                (party, args)
            })
            .collect();
        Self { entries }
    }

    pub fn entries(&self) -> &[(PartyId, Vec<String>)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Arguments for one party.
    pub fn args_for(&self, party: PartyId) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(p, _)| *p == party)
            .map(|(_, args)| args.as_slice())
    }
}

/// Spawns the parties of a [`LaunchPlan`].
pub struct ProcessLauncher<'a, S: PartySpawner + ?Sized> {
    spawner: &'a S,
}

impl<'a, S: PartySpawner + ?Sized> ProcessLauncher<'a, S> {
    pub fn new(spawner: &'a S) -> Self {
        Self { spawner }
    }

    /// Spawns every party in the plan.
    ///
    /// # Errors
    /// - `FabricNotReady` if `fabric` is not ready; nothing is spawned
    /// - `Interrupted` if `shutdown` fires mid-launch; spawned parties are killed
    /// - `Spawn` listing every party that failed; spawned parties are killed
    pub async fn launch<F: NetworkFabric + ?Sized>(
        &self,
        plan: &LaunchPlan,
        fabric: &F,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<LaunchedParties, LaunchError> {
        if !fabric.is_ready() {
            error!("Fabric not ready, refusing to spawn {} parties", plan.len());
            return Err(LaunchError::FabricNotReady);
        }

        let mut started = Vec::with_capacity(plan.len());
        let mut failed: Vec<(PartyId, EnvError)> = Vec::new();

        for (party, args) in plan.entries() {
            let interrupted = *shutdown.borrow();
            if interrupted {
                warn!("Interrupted after spawning {} of {} parties", started.len(), plan.len());
                LaunchedParties::new(started).shutdown().await;
                return Err(LaunchError::Interrupted);
            }

            match self.spawner.spawn(*party, args) {
                Ok(process) => {
                    debug!("Spawned {} with {:?} (pid={:?})", party, args, process.pid());
                    started.push(process);
                }
                Err(e) => {
                    error!("Failed to spawn {}: {}", party, e);
                    failed.push((*party, e));
                }
            }
        }

        if !failed.is_empty() {
            warn!(
                "{} of {} parties failed to spawn; tearing down the rest",
                failed.len(),
                plan.len()
            );
            LaunchedParties::new(started).shutdown().await;
            return Err(LaunchError::Spawn { failed });
        }

        info!("Launched {} parties", started.len());
        Ok(LaunchedParties::new(started))
    }
}

/// Handles of every spawned party.
pub struct LaunchedParties {
    processes: Vec<Box<dyn PartyProcess>>,

    /// Exit of each process, `None` while running or once killed
    exits: Vec<Option<PartyExit>>,
}

impl LaunchedParties {
    fn new(processes: Vec<Box<dyn PartyProcess>>) -> Self {
        let exits = vec![None; processes.len()];
        Self { processes, exits }
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    /// Waits until every party has exited.
    ///
    /// Cancel safe: exits observed before cancellation are kept.
    pub async fn wait_all(&mut self) {
        for (process, exit) in self.processes.iter_mut().zip(self.exits.iter_mut()) {
            if exit.is_some() {
                continue;
            }
            let observed = match process.wait().await {
                Ok(status) => status,
                Err(e) => {
                    warn!("Lost track of {}: {}", process.party(), e);
                    PartyExit { code: None }
                }
            };
            debug!("{} exited with {:?}", process.party(), observed.code);
            *exit = Some(observed);
        }
    }

    /// Kills every party that has not exited; returns how many were killed.
    pub async fn shutdown(&mut self) -> usize {
        let mut killed = 0;
        for (process, exit) in self.processes.iter_mut().zip(self.exits.iter()) {
            if exit.is_some() {
                continue;
            }
            match process.kill().await {
                Ok(()) => killed += 1,
                Err(e) => warn!("Failed to kill {}: {}", process.party(), e),
            }
        }
        if killed > 0 {
            info!("Killed {} running parties", killed);
        }
        killed
    }

    /// Exit of every party; `None` for parties that never exited on their own.
    pub fn exits(&self) -> Vec<(PartyId, Option<PartyExit>)> {
        self.processes
            .iter()
            .zip(self.exits.iter())
            .map(|(process, exit)| (process.party(), *exit))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ghz_env::mock::{MockFabric, MockSpawner, PartyBehavior};
    use std::time::Duration;

    fn roles() -> RoleAssignment {
        RoleAssignment {
            sender: 1,
            adversaries: vec![4, 2],
            honest_verifier: false,
        }
    }

    async fn ready_fabric() -> MockFabric {
        let mut fabric = MockFabric::new();
        fabric.start(&PartyId::all(5), Default::default()).await.unwrap();
        fabric
    }

    #[test]
    fn test_plan_arguments() {
        let plan = LaunchPlan::build(5, &roles(), true);

        assert_eq!(plan.len(), 5);
        assert_eq!(plan.args_for(PartyId(0)).unwrap(), ["0", "honest"]);
        assert_eq!(plan.args_for(PartyId(1)).unwrap(), ["1", "sender"]);
        assert_eq!(plan.args_for(PartyId(2)).unwrap(), ["2", "adversary", "4-2", "1"]);
        assert_eq!(plan.args_for(PartyId(3)).unwrap(), ["3", "honest"]);
        assert_eq!(plan.args_for(PartyId(4)).unwrap(), ["4", "adversary", "4-2", "1"]);
        assert!(plan.args_for(PartyId(5)).is_none());
    }

    #[test]
    fn test_plan_without_adversaries() {
        let assignment = RoleAssignment {
            sender: 0,
            adversaries: vec![],
            honest_verifier: false,
        };
        let plan = LaunchPlan::build(3, &assignment, false);

        let tokens: Vec<&str> = plan.entries().iter().map(|(_, a)| a[1].as_str()).collect();
        assert_eq!(tokens, vec!["sender", "honest", "honest"]);
    }

    #[tokio::test]
    async fn test_launch_spawns_everyone() {
        let fabric = ready_fabric().await;
        let spawner = MockSpawner::new().observing(&fabric);
        let (_tx, rx) = watch::channel(false);

        let plan = LaunchPlan::build(5, &roles(), true);
        let mut launched = ProcessLauncher::new(&spawner).launch(&plan, &fabric, &rx).await.unwrap();

        assert_eq!(launched.len(), 5);
        assert!(!spawner.spawned_before_ready());
        let spawned: Vec<_> = spawner.spawned().into_iter().map(|(p, _)| p).collect();
        assert_eq!(spawned, PartyId::all(5));

        launched.wait_all().await;
        assert!(launched.exits().iter().all(|(_, exit)| exit.map_or(false, |e| e.success())));
    }

    #[tokio::test]
    async fn test_launch_refuses_unready_fabric() {
        let fabric = MockFabric::never_ready();
        let spawner = MockSpawner::new();
        let (_tx, rx) = watch::channel(false);

        let plan = LaunchPlan::build(5, &roles(), true);
        let result = ProcessLauncher::new(&spawner).launch(&plan, &fabric, &rx).await;

        assert!(matches!(result, Err(LaunchError::FabricNotReady)));
        assert!(spawner.spawned().is_empty());
    }

    #[tokio::test]
    async fn test_spawn_failures_abort_launch() {
        let fabric = ready_fabric().await;
        let spawner = MockSpawner::with_behavior(PartyBehavior::RunForever).failing_on(&[1, 3]);
        let (_tx, rx) = watch::channel(false);

        let plan = LaunchPlan::build(5, &roles(), true);
        let result = ProcessLauncher::new(&spawner).launch(&plan, &fabric, &rx).await;

        match result {
            Err(LaunchError::Spawn { failed }) => {
                let parties: Vec<_> = failed.iter().map(|(p, _)| *p).collect();
                assert_eq!(parties, vec![PartyId(1), PartyId(3)]);
            }
            other => panic!("expected spawn failure, got {:?}", other.err()),
        }

        // Nobody left running
        let mut killed = spawner.killed();
        killed.sort();
        assert_eq!(killed, vec![PartyId(0), PartyId(2), PartyId(4)]);
    }

    #[tokio::test]
    async fn test_interrupt_halts_spawning() {
        let fabric = ready_fabric().await;
        let spawner = MockSpawner::new();
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let plan = LaunchPlan::build(5, &roles(), true);
        let result = ProcessLauncher::new(&spawner).launch(&plan, &fabric, &rx).await;

        assert!(matches!(result, Err(LaunchError::Interrupted)));
        assert!(spawner.spawned().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_kills_running_parties() {
        let fabric = ready_fabric().await;
        let spawner = MockSpawner::with_behavior(PartyBehavior::RunForever);
        let (_tx, rx) = watch::channel(false);

        let plan = LaunchPlan::build(3, &roles_for_three(), false);
        let mut launched = ProcessLauncher::new(&spawner).launch(&plan, &fabric, &rx).await.unwrap();

        let waited = tokio::time::timeout(Duration::from_millis(50), launched.wait_all()).await;
        assert!(waited.is_err());

        assert_eq!(launched.shutdown().await, 3);
        assert_eq!(spawner.killed().len(), 3);
        assert!(launched.exits().iter().all(|(_, exit)| exit.is_none()));
    }

    fn roles_for_three() -> RoleAssignment {
        RoleAssignment {
            sender: 0,
            adversaries: vec![2],
            honest_verifier: false,
        }
    }
}
