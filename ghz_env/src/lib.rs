//! GHZ Launcher Environment Abstraction Layer
//!
//! The launcher only orchestrates; the simulated quantum fabric, the
//! classical broadcast channel and the per-party node programs live outside
//! it. This crate is the seam between the two:
//!
//! - [`NetworkFabric`]: brings the quantum channel fabric up and down
//! - [`BroadcastService`]: the classical broadcast channel between parties
//! - [`PartySpawner`] / [`PartyProcess`]: one OS process per party
//!
//! Production implementations drive external programs through
//! `tokio::process`; the [`mock`] module provides in-memory versions for
//! tests.
//!
//! # Example
//!
//! ```ignore
//! use ghz_env::{CommandFabric, CommandLine, NetworkFabric, PartyId, Topology};
//!
//! let start = CommandLine::parse("simulaqron start")?;
//! let mut fabric = CommandFabric::new(start, None);
//! fabric.start(&PartyId::all(3), Topology::Complete).await?;
//! assert!(fabric.is_ready());
//! ```

mod network;
mod process;
mod types;
mod error;
mod tokio_impl;
pub mod mock;

pub use network::{NetworkFabric, BroadcastService};
pub use process::{PartyProcess, PartySpawner};
pub use types::{PartyId, PartyExit, Topology};
pub use error::EnvError;
pub use tokio_impl::{CommandLine, CommandFabric, CommandBroadcast, CommandSpawner, ChildProcess};
