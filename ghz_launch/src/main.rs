//! GHZ Verification Launcher CLI
//!
//! Derives the security parameter, assigns roles and starts one process per
//! party on top of the quantum fabric and broadcast service.

use clap::{ArgAction, Parser};
use ghz_env::{CommandBroadcast, CommandFabric, CommandLine, CommandSpawner, Topology};
use ghz_launch::{
    check_delta, check_fidelity, check_nodes, LaunchError, LaunchRequest, Orchestrator,
    RunContext, DEFAULT_LABEL,
};
use std::path::PathBuf;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Launch a multi-party GHZ verification simulation
#[derive(Parser, Debug)]
#[command(name = "ghz-launch")]
#[command(about = "Launch a multi-party GHZ verification simulation", long_about = None)]
struct Args {
    /// Number of parties (at least 2)
    #[arg(short = 'n', long = "nodes", default_value = "3", value_parser = parse_nodes)]
    nodes: usize,

    /// Fidelity of the GHZ states produced by the source, in (0, 1]
    #[arg(short, long, default_value = "1", value_parser = parse_fidelity)]
    fidelity: f64,

    /// Allowed probability of an undetected cheat, in (0, 1)
    #[arg(short, long, default_value = "0.01", value_parser = parse_delta)]
    delta: f64,

    /// Number of adversaries; the source controller is always one of them
    #[arg(short = 'a', long = "adv", default_value = "0")]
    adv: usize,

    /// Pin the adversary set so the verifier is never adversarial (0 or 1)
    #[arg(long = "honest-verifier", default_value = "0", value_parser = parse_toggle, action = ArgAction::Set)]
    honest_verifier: bool,

    /// Leave adversarial qubits out of the GHZ state (0 or 1)
    #[arg(long = "unentangled-adv", default_value = "1", value_parser = parse_toggle, action = ArgAction::Set)]
    unentangled_adv: bool,

    /// Verbosity passed to the parties; also sets the log level
    #[arg(short, long, default_value = "2")]
    verbose: u32,

    /// Seed for role selection (default: derived from the clock)
    #[arg(long)]
    seed: Option<u64>,

    /// Label keying the run log in results/
    #[arg(long, default_value = DEFAULT_LABEL)]
    label: String,

    /// Directory holding conf.json, adv.json and results/
    #[arg(long, default_value = ".")]
    run_dir: PathBuf,

    /// Fabric topology (complete, ring, path)
    #[arg(long, default_value = "complete")]
    topology: Topology,

    /// Program started for every party, followed by `<index> <role...>`
    #[arg(long, default_value = "python3 node.py")]
    party_cmd: String,

    /// Command starting the fabric, followed by `--nodes <names> --topology <t>`
    #[arg(long, default_value = "simulaqron start")]
    fabric_cmd: String,

    /// Command stopping the fabric
    #[arg(long, default_value = "simulaqron stop")]
    fabric_stop_cmd: String,

    /// Command running the classical broadcast service
    #[arg(long, default_value = "python3 broadcast_server.py")]
    broadcast_cmd: String,

    /// Prepare the run and print the party command lines without starting anything
    #[arg(long)]
    dry_run: bool,
}

fn parse_nodes(s: &str) -> Result<usize, String> {
    let n: usize = s.parse().map_err(|e| format!("{}", e))?;
    check_nodes(n).map_err(|e| e.to_string())?;
    Ok(n)
}

fn parse_fidelity(s: &str) -> Result<f64, String> {
    let f: f64 = s.parse().map_err(|e| format!("{}", e))?;
    check_fidelity(f).map_err(|e| e.to_string())?;
    Ok(f)
}

fn parse_delta(s: &str) -> Result<f64, String> {
    let d: f64 = s.parse().map_err(|e| format!("{}", e))?;
    check_delta(d).map_err(|e| e.to_string())?;
    Ok(d)
}

fn parse_toggle(s: &str) -> Result<bool, String> {
    match s {
        "0" => Ok(false),
        "1" => Ok(true),
        _ => Err(format!("expected 0 or 1, got {:?}", s)),
    }
}

/// Flips `shutdown` on Ctrl+C or SIGTERM.
fn spawn_signal_listener(shutdown: watch::Sender<bool>) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                warn!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    warn!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
            _ = terminate => info!("Received SIGTERM, shutting down"),
        }
        let _ = shutdown.send(true);
    });
}

async fn run(args: Args) -> Result<bool, LaunchError> {
    let seed = args.seed.unwrap_or_else(RunContext::seed_from_time);
    let ctx = RunContext::new(&args.run_dir, seed).with_label(&args.label);

    let request = LaunchRequest {
        n_nodes: args.nodes,
        fidelity: args.fidelity,
        delta: args.delta,
        adversaries: args.adv,
        honest_verifier: args.honest_verifier,
        unentangled_adv: args.unentangled_adv,
        verbose: args.verbose,
        topology: args.topology,
    };

    let party_cmd = CommandLine::parse(&args.party_cmd).map_err(LaunchError::command("party"))?;
    let fabric = CommandFabric::new(
        CommandLine::parse(&args.fabric_cmd).map_err(LaunchError::command("fabric start"))?,
        Some(CommandLine::parse(&args.fabric_stop_cmd).map_err(LaunchError::command("fabric stop"))?),
    );
    let broadcast = CommandBroadcast::new(
        CommandLine::parse(&args.broadcast_cmd).map_err(LaunchError::command("broadcast"))?,
    );

    let orchestrator = Orchestrator::new(
        ctx,
        request,
        fabric,
        broadcast,
        CommandSpawner::new(party_cmd.clone()),
    );

    if args.dry_run {
        let prepared = orchestrator.prepare()?;
        info!(
            "Dry run: S={} sender={} adversaries={:?}",
            prepared.config.params.rounds, prepared.assignment.sender, prepared.assignment.adversaries
        );
        for (_, party_args) in prepared.plan.entries() {
            println!("{} {}", party_cmd, party_args.join(" "));
        }
        return Ok(true);
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    spawn_signal_listener(shutdown_tx);

    let summary = orchestrator.run(shutdown_rx).await?;

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!(
        "Run finished ({:?}): seed={} S={} sender={} adversaries={:?}",
        summary.ended_by, summary.seed, summary.rounds, summary.sender, summary.adversaries
    );
    for (party, exit) in &summary.exits {
        match exit {
            Some(exit) if exit.success() => info!("  {} exited cleanly", party),
            Some(exit) => error!("  {} exited with {:?}", party, exit.code),
            None => warn!("  {} was stopped during teardown", party),
        }
    }

    Ok(summary.all_parties_succeeded())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize logging
    let default_level = match args.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    info!("GHZ launcher v{}", env!("CARGO_PKG_VERSION"));

    match run(args).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(LaunchError::Interrupted) => {
            warn!("Run interrupted; all started processes were stopped");
            std::process::exit(130);
        }
        Err(e) => {
            error!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["ghz-launch"]).unwrap();

        assert_eq!(args.nodes, 3);
        assert_eq!(args.fidelity, 1.0);
        assert_eq!(args.delta, 0.01);
        assert_eq!(args.adv, 0);
        assert!(!args.honest_verifier);
        assert!(args.unentangled_adv);
        assert_eq!(args.verbose, 2);
        assert_eq!(args.topology, Topology::Complete);
        assert_eq!(args.label, "test_simulation");
    }

    #[test]
    fn test_short_and_long_flags() {
        let args = Args::try_parse_from([
            "ghz-launch", "-n", "5", "-f", "0.9", "-d", "0.05", "-a", "2",
            "--honest-verifier", "1", "--unentangled-adv", "0", "-v", "0",
        ])
        .unwrap();

        assert_eq!(args.nodes, 5);
        assert_eq!(args.fidelity, 0.9);
        assert_eq!(args.delta, 0.05);
        assert_eq!(args.adv, 2);
        assert!(args.honest_verifier);
        assert!(!args.unentangled_adv);
        assert_eq!(args.verbose, 0);

        let args = Args::try_parse_from(["ghz-launch", "--nodes=4", "--adv=1", "--fidelity=0.99"]).unwrap();
        assert_eq!((args.nodes, args.adv, args.fidelity), (4, 1, 0.99));
    }

    #[test]
    fn test_rejects_out_of_domain_values() {
        for argv in [
            vec!["ghz-launch", "-n", "1"],
            vec!["ghz-launch", "-f", "0"],
            vec!["ghz-launch", "-f", "1.5"],
            vec!["ghz-launch", "-d", "1"],
            vec!["ghz-launch", "-d", "abc"],
            vec!["ghz-launch", "-a", "-1"],
            vec!["ghz-launch", "--honest-verifier", "2"],
            vec!["ghz-launch", "--unentangled-adv", "yes"],
            vec!["ghz-launch", "--topology", "star"],
            vec!["ghz-launch", "--bogus"],
        ] {
            assert!(Args::try_parse_from(&argv).is_err(), "accepted {:?}", argv);
        }
    }

    #[test]
    fn test_help_is_not_an_error_exit() {
        let err = Args::try_parse_from(["ghz-launch", "-h"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
        assert_eq!(err.exit_code(), 0);
    }
}
