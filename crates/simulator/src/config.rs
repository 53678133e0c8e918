//! Cluster simulation configuration.

use crate::SimulatorError;
use std::time::Duration;

/// Configuration for a simulated election/heartbeat cluster.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Number of nodes.
    pub nodes: usize,

    /// Seed for election timeout jitter. Same seed, same run.
    pub seed: u64,

    /// Base election timeout before jitter.
    pub election_timeout: Duration,

    /// Maximum jitter added to the election timeout, as a fraction of it.
    pub election_jitter: f64,

    /// Interval between leader heartbeats. Must be below the election
    /// timeout for a leader to keep its followers.
    pub heartbeat_interval: Duration,

    /// Crash the current leader at this interval of virtual time.
    pub crash_every: Option<Duration>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            nodes: 5,
            seed: 0,
            election_timeout: Duration::from_millis(150),
            election_jitter: 1.0,
            heartbeat_interval: Duration::from_millis(50),
            crash_every: None,
        }
    }
}

impl ClusterConfig {
    pub fn new(nodes: usize) -> Self {
        Self {
            nodes,
            ..Self::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_election_timeout(mut self, timeout: Duration) -> Self {
        self.election_timeout = timeout;
        self
    }

    pub fn with_election_jitter(mut self, fraction: f64) -> Self {
        self.election_jitter = fraction;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_crash_every(mut self, interval: Duration) -> Self {
        self.crash_every = Some(interval);
        self
    }

    pub fn validate(&self) -> Result<(), SimulatorError> {
        if self.nodes == 0 {
            return Err(SimulatorError::InvalidConfig(
                "nodes must be at least 1".to_string(),
            ));
        }
        if self.election_timeout.is_zero() || self.heartbeat_interval.is_zero() {
            return Err(SimulatorError::InvalidConfig(
                "timeouts must be non-zero".to_string(),
            ));
        }
        if self.heartbeat_interval >= self.election_timeout {
            return Err(SimulatorError::InvalidConfig(format!(
                "heartbeat interval {:?} must be below election timeout {:?}",
                self.heartbeat_interval, self.election_timeout
            )));
        }
        if !self.election_jitter.is_finite() || self.election_jitter < 0.0 {
            return Err(SimulatorError::InvalidConfig(
                "election jitter must be a non-negative fraction".to_string(),
            ));
        }
        if self.crash_every.is_some_and(|every| every.is_zero()) {
            return Err(SimulatorError::InvalidConfig(
                "crash interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
