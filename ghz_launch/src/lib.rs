//! GHZ Verification Launcher
//!
//! Prepares and launches a multi-party simulation of the GHZ state
//! verification protocol: N parties share a GHZ state, some of them may be
//! adversarial, and the honest ones verify the state before using it.
//!
//! This crate turns a handful of experiment parameters into
//! - a security parameter `S` (number of verification rounds),
//! - a role assignment (sender, adversary coalition, optional verifier pin),
//! - one OS process per party carrying its role on the command line.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Orchestrator                          │
//! │                                                              │
//! │  ConfigStore ──► SecurityParams ──► assign() ──► RunRecorder │
//! │   conf.json                         adv.json    results/*.csv│
//! │                                                              │
//! │       NetworkFabric.start ──► ProcessLauncher ──► Broadcast  │
//! │        (must be ready)        node0 .. nodeN-1    .create()  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The fabric, broadcast service and party programs sit behind the
//! `ghz_env` traits.
//!
//! # Usage
//!
//! ```ignore
//! use ghz_launch::{LaunchRequest, Orchestrator, RunContext};
//! use ghz_env::mock::{MockBroadcast, MockFabric, MockSpawner};
//!
//! let ctx = RunContext::new("/tmp/run", 42);
//! let request = LaunchRequest { n_nodes: 5, adversaries: 2, ..Default::default() };
//!
//! let orchestrator = Orchestrator::new(ctx, request, MockFabric::new(),
//!     MockBroadcast::immediate(), MockSpawner::new());
//! let summary = orchestrator.run(shutdown_rx).await?;
//! ```

mod context;
mod error;
mod runner;
pub mod config;
pub mod launcher;
pub mod recorder;
pub mod roles;
pub mod security;

pub use context::{RunContext, DEFAULT_LABEL};
pub use error::{ConfigError, DomainError, LaunchError};
pub use runner::{LaunchRequest, Orchestrator, PreparedRun, RunEnd, RunSummary};
pub use config::{ConfigSource, ConfigStore, Configuration, RequestedParams};
pub use launcher::{LaunchPlan, LaunchedParties, ProcessLauncher};
pub use recorder::{RunRecord, RunRecorder};
pub use roles::{AdversaryPin, Role, RoleAssignment};
pub use security::{check_delta, check_fidelity, check_nodes, derive_epsilon, derive_s, SecurityParams};
