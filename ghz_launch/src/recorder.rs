//! Human-readable run log.
//!
//! Each run appends one parameter block to `<results>/<label>_<n_nodes>.csv`.
//! Party processes append their own results to the same file, so the block
//! layout is kept stable.

use crate::config::Configuration;
use crate::error::LaunchError;
use crate::roles::RoleAssignment;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

/// Everything logged about a single run.
#[derive(Debug, Clone)]
pub struct RunRecord<'a> {
    pub timestamp: SystemTime,
    pub config: &'a Configuration,
    pub assignment: &'a RoleAssignment,
    pub unentangled_adv: bool,
}

impl RunRecord<'_> {
    /// Formats the record as an indented parameter block.
    pub fn render(&self) -> String {
        let p = &self.config.params;
        let mut block = format!(
            "simulation parameters:\
             \n\ttimestamp: {}\
             \n\tnodes: {}\
             \n\tsender: {}\
             \n\tadversaries: {:?}\
             \n\tdelta: {}\
             \n\tGHZ states fidelity and epsilon: {} {:.4}\
             \n\tsecurity parameter (S): {}\
             \n\tordering: {:?}",
            humantime::format_rfc3339_seconds(self.timestamp),
            p.n_nodes,
            self.assignment.sender,
            self.assignment.adversaries,
            p.delta,
            p.fidelity,
            p.epsilon,
            p.rounds,
            self.config.ordering,
        );

        if self.assignment.honest_verifier {
            block.push_str("\n\thonest verifier: true");
        }
        if !self.assignment.adversaries.is_empty() {
            block.push_str(&format!(
                "\n\tunentangled qubits for adversaries: {}",
                self.unentangled_adv
            ));
        }
        block.push('\n');
        block
    }
}

/// Appends run records to per-label, per-size log files.
pub struct RunRecorder {
    results_dir: PathBuf,
}

impl RunRecorder {
    pub fn new(results_dir: impl Into<PathBuf>) -> Self {
        Self {
            results_dir: results_dir.into(),
        }
    }

    /// Log file for `(label, n_nodes)`.
    pub fn log_path(&self, label: &str, n_nodes: usize) -> PathBuf {
        self.results_dir.join(format!("{}_{}.csv", label, n_nodes))
    }

    /// Appends a record stamped with the current time; returns the block.
    pub fn record(
        &self,
        label: &str,
        config: &Configuration,
        assignment: &RoleAssignment,
        unentangled_adv: bool,
    ) -> Result<String, LaunchError> {
        self.record_at(label, config, assignment, unentangled_adv, SystemTime::now())
    }

    /// Appends a record with an explicit timestamp; returns the block.
    pub fn record_at(
        &self,
        label: &str,
        config: &Configuration,
        assignment: &RoleAssignment,
        unentangled_adv: bool,
        timestamp: SystemTime,
    ) -> Result<String, LaunchError> {
        let block = RunRecord {
            timestamp,
            config,
            assignment,
            unentangled_adv,
        }
        .render();

        let path = self.log_path(label, config.n_nodes());
        append(&path, &block)?;
        debug!("Recorded run parameters to {}", path.display());

        Ok(block)
    }
}

fn append(path: &Path, block: &str) -> Result<(), LaunchError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| LaunchError::io(parent, e))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| LaunchError::io(path, e))?;
    writeln!(file, "{}", block).map_err(|e| LaunchError::io(path, e))
}
