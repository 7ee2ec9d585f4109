//! Run orchestrator - drives one launcher run from parameters to teardown.

use crate::config::{ConfigSource, ConfigStore, Configuration, RequestedParams};
use crate::context::RunContext;
use crate::error::LaunchError;
use crate::launcher::{LaunchPlan, ProcessLauncher};
use crate::recorder::RunRecorder;
use crate::roles::{self, AdversaryPin, RoleAssignment};
use ghz_env::{BroadcastService, EnvError, NetworkFabric, PartyExit, PartyId, PartySpawner, Topology};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Parameters of a single run, as given on the command line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LaunchRequest {
    pub n_nodes: usize,
    pub fidelity: f64,
    pub delta: f64,
    pub adversaries: usize,
    pub honest_verifier: bool,
    pub unentangled_adv: bool,
    pub verbose: u32,
    pub topology: Topology,
}

impl LaunchRequest {
    /// The subset of parameters persisted in the configuration.
    pub fn params(&self) -> RequestedParams {
        RequestedParams {
            n_nodes: self.n_nodes,
            fidelity: self.fidelity,
            delta: self.delta,
            verbose: self.verbose,
        }
    }
}

impl Default for LaunchRequest {
    fn default() -> Self {
        Self {
            n_nodes: 3,
            fidelity: 1.0,
            delta: 0.01,
            adversaries: 0,
            honest_verifier: false,
            unentangled_adv: true,
            verbose: 2,
            topology: Topology::Complete,
        }
    }
}

/// Everything decided before any collaborator is started.
#[derive(Debug, Clone)]
pub struct PreparedRun {
    pub config: Configuration,
    pub config_source: ConfigSource,
    pub assignment: RoleAssignment,
    pub plan: LaunchPlan,
}

/// What ended the broadcast phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEnd {
    /// Every party exited on its own
    PartiesExited,

    /// The broadcast service terminated
    BroadcastEnded,
}

/// Results from a completed run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Seed the roles were drawn with
    pub seed: u64,

    /// Security parameter used
    pub rounds: u32,

    pub sender: usize,
    pub adversaries: Vec<usize>,

    /// What ended the run
    pub ended_by: RunEnd,

    /// Exit of each party; `None` if it was killed during teardown
    pub exits: Vec<(PartyId, Option<PartyExit>)>,
}

impl RunSummary {
    /// Returns true if every party exited with status 0.
    pub fn all_parties_succeeded(&self) -> bool {
        self.exits
            .iter()
            .all(|(_, exit)| exit.map_or(false, |e| e.success()))
    }
}

/// Drives a run: configuration, roles, run log, fabric, parties, broadcast.
pub struct Orchestrator<F, B, S> {
    ctx: RunContext,
    request: LaunchRequest,
    fabric: F,
    broadcast: B,
    spawner: S,
}

impl<F, B, S> Orchestrator<F, B, S>
where
    F: NetworkFabric,
    B: BroadcastService,
    S: PartySpawner,
{
    /// Creates an orchestrator over the given collaborators.
    pub fn new(ctx: RunContext, request: LaunchRequest, fabric: F, broadcast: B, spawner: S) -> Self {
        Self {
            ctx,
            request,
            fabric,
            broadcast,
            spawner,
        }
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    /// Loads or generates the configuration, assigns roles, syncs the
    /// adversary pin and builds the launch plan.
    ///
    /// Starts no collaborator and spawns nothing.
    pub fn prepare(&self) -> Result<PreparedRun, LaunchError> {
        let store = ConfigStore::new(self.ctx.config_path());
        let (config, config_source) = store.load_or_generate(&self.request.params())?;
        let n_nodes = config.n_nodes();

        info!(
            "Configuration: nodes={} fidelity={} delta={} epsilon={:.4} S={} ({:?})",
            n_nodes,
            config.params.fidelity,
            config.params.delta,
            config.params.epsilon,
            config.params.rounds,
            config_source
        );

        let assignment = roles::assign(
            n_nodes,
            self.request.adversaries,
            self.request.honest_verifier,
            &mut self.ctx.rng(),
        )?;
        info!(
            "Roles (seed={}): sender={} adversaries={:?}",
            self.ctx.seed(),
            assignment.sender,
            assignment.adversaries
        );

        AdversaryPin::new(self.ctx.pin_path()).sync(&assignment)?;

        let plan = LaunchPlan::build(n_nodes, &assignment, self.request.unentangled_adv);

        Ok(PreparedRun {
            config,
            config_source,
            assignment,
            plan,
        })
    }

    /// Runs to completion.
    ///
    /// Setting `shutdown` to `true` at any point halts the run and tears down
    /// everything already started; the run then fails with `Interrupted`.
    pub async fn run(mut self, shutdown: watch::Receiver<bool>) -> Result<RunSummary, LaunchError> {
        let prepared = self.prepare()?;
        let n_nodes = prepared.config.n_nodes();

        let block = RunRecorder::new(self.ctx.results_dir()).record(
            self.ctx.label(),
            &prepared.config,
            &prepared.assignment,
            self.request.unentangled_adv,
        )?;
        info!("{}", block);

        // Fabric readiness strictly precedes every spawn
        let parties = PartyId::all(n_nodes);
        let mut interrupt = shutdown.clone();
        let started = tokio::select! {
            result = self.fabric.start(&parties, self.request.topology) => result,
            _ = wait_for_shutdown(&mut interrupt) => {
                self.stop_fabric().await;
                return Err(LaunchError::Interrupted);
            }
        };
        if let Err(e) = started {
            self.stop_fabric().await;
            return Err(LaunchError::Fabric(e));
        }
        info!("Fabric ready ({} parties, {} topology)", n_nodes, self.request.topology);

        let launched = ProcessLauncher::new(&self.spawner)
            .launch(&prepared.plan, &self.fabric, &shutdown)
            .await;
        let mut launched = match launched {
            Ok(launched) => launched,
            Err(e) => {
                self.stop_fabric().await;
                return Err(e);
            }
        };

        info!("All parties launched; creating broadcast service");
        let phase = tokio::select! {
            result = self.broadcast.create() => match result {
                Ok(()) => Phase::Ended(RunEnd::BroadcastEnded),
                Err(e) => Phase::BroadcastFailed(e),
            },
            _ = launched.wait_all() => Phase::Ended(RunEnd::PartiesExited),
            _ = wait_for_shutdown(&mut interrupt) => Phase::Interrupted,
        };
        debug!("Broadcast phase ended: {:?}", phase);

        // Teardown: parties, broadcast service, fabric
        launched.shutdown().await;
        if let Err(e) = self.broadcast.shutdown().await {
            warn!("Broadcast shutdown failed: {}", e);
        }
        self.stop_fabric().await;

        let ended_by = match phase {
            Phase::Ended(end) => end,
            Phase::BroadcastFailed(e) => return Err(LaunchError::Broadcast(e)),
            Phase::Interrupted => return Err(LaunchError::Interrupted),
        };

        Ok(RunSummary {
            seed: self.ctx.seed(),
            rounds: prepared.config.params.rounds,
            sender: prepared.assignment.sender,
            adversaries: prepared.assignment.adversaries,
            ended_by,
            exits: launched.exits(),
        })
    }

    async fn stop_fabric(&mut self) {
        if let Err(e) = self.fabric.stop().await {
            warn!("Fabric shutdown failed: {}", e);
        }
    }
}

#[derive(Debug)]
enum Phase {
    Ended(RunEnd),
    BroadcastFailed(EnvError),
    Interrupted,
}

/// Resolves once `shutdown` reads `true`; never resolves if the sender is gone.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
