//! Metronome Simulator
//!
//! A deterministic leader-election workload built on repeated timer tasks.
//!
//! # Architecture
//!
//! Every node owns two [`RepeatedTimerTask`](metronome_task::RepeatedTimerTask)s
//! on a shared `ManualScheduler` virtual clock:
//!
//! - **Election timeout**: jittered per node from a seeded RNG. On fire the
//!   node makes itself leader, stops its own election timer from inside the
//!   action and starts its heartbeat.
//! - **Heartbeat**: while leading, resets every follower's election timer.
//!
//! Leaders can be crashed at a fixed interval to force re-elections. Fires
//! are dispatched inline, so a run is reproducible from its seed.
//!
//! # Example
//!
//! ```ignore
//! use metronome_simulator::{Cluster, ClusterConfig};
//! use std::time::Duration;
//!
//! let config = ClusterConfig::new(5)
//!     .with_seed(42)
//!     .with_crash_every(Duration::from_secs(2));
//!
//! let mut cluster = Cluster::new(config)?;
//! cluster.start();
//! let report = cluster.run_for(Duration::from_secs(10));
//! report.print_summary(true);
//! cluster.shutdown()?;
//! ```

mod actions;
mod cluster;
mod config;
mod error;
mod report;

pub use cluster::{Cluster, ClusterStats, Role};
pub use config::ClusterConfig;
pub use error::SimulatorError;
pub use report::SimulationReport;
