//! Metronome Simulator CLI
//!
//! Run a deterministic leader-election simulation on repeated timer tasks.
//!
//! # Example
//!
//! ```bash
//! # Five nodes for ten seconds of virtual time, fixed seed
//! metronome-sim --seed 42 -n 5 -d 10000
//!
//! # Crash the leader every two seconds and show per-task state
//! metronome-sim --crash-every-ms 2000 --describe
//! ```

use clap::Parser;
use metronome_simulator::{Cluster, ClusterConfig};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Metronome Simulator
///
/// Runs a cluster of nodes whose election and heartbeat timers are repeated
/// timer tasks on a virtual clock. Reproducible when the same seed is used.
#[derive(Parser, Debug)]
#[command(name = "metronome-sim")]
#[command(version, about, long_about = None)]
struct Args {
    /// Number of nodes
    #[arg(short = 'n', long, default_value = "5")]
    nodes: usize,

    /// Simulated duration in milliseconds
    #[arg(short = 'd', long, default_value = "10000")]
    duration_ms: u64,

    /// Random seed for reproducible results. When omitted, a random seed is used.
    #[arg(long)]
    seed: Option<u64>,

    /// Base election timeout in milliseconds
    #[arg(long, default_value = "150")]
    election_timeout_ms: u64,

    /// Maximum election jitter as a fraction of the timeout
    #[arg(long, default_value = "1.0")]
    election_jitter: f64,

    /// Heartbeat interval in milliseconds
    #[arg(long, default_value = "50")]
    heartbeat_ms: u64,

    /// Crash the current leader at this interval (milliseconds)
    #[arg(long)]
    crash_every_ms: Option<u64>,

    /// Print one describe line per timer task
    #[arg(long)]
    describe: bool,

    /// Record Prometheus metrics and print them at the end
    #[arg(long)]
    metrics: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,metronome_simulator=info")),
        )
        .init();

    let args = Args::parse();

    if args.metrics {
        if let Err(e) = metronome_metrics_prometheus::install() {
            error!(error = %e, "Failed to install Prometheus metrics");
            return ExitCode::FAILURE;
        }
    } else {
        metronome_metrics_noop::install();
    }

    let seed = args.seed.unwrap_or_else(rand::random);

    info!(
        nodes = args.nodes,
        duration_ms = args.duration_ms,
        seed,
        election_timeout_ms = args.election_timeout_ms,
        heartbeat_ms = args.heartbeat_ms,
        crash_every_ms = ?args.crash_every_ms,
        "Starting simulation"
    );

    let mut config = ClusterConfig::new(args.nodes)
        .with_seed(seed)
        .with_election_timeout(Duration::from_millis(args.election_timeout_ms))
        .with_election_jitter(args.election_jitter)
        .with_heartbeat_interval(Duration::from_millis(args.heartbeat_ms));
    if let Some(every) = args.crash_every_ms {
        config = config.with_crash_every(Duration::from_millis(every));
    }

    let mut cluster = match Cluster::new(config) {
        Ok(cluster) => cluster,
        Err(e) => {
            error!(error = %e, "Failed to create cluster");
            return ExitCode::FAILURE;
        }
    };

    cluster.start();
    let report = cluster.run_for(Duration::from_millis(args.duration_ms));
    report.print_summary(args.describe);

    if let Err(e) = cluster.shutdown() {
        error!(error = %e, "Shutdown check failed");
        return ExitCode::FAILURE;
    }
    println!("\nAll timer tasks finalized exactly once.");

    if args.metrics {
        match metronome_metrics_prometheus::encode_metrics() {
            Ok((_, body)) => println!("\n{}", String::from_utf8_lossy(&body)),
            Err(e) => warn!(error = %e, "Failed to encode metrics"),
        }
    }

    ExitCode::SUCCESS
}
