use thiserror::Error;

/// Errors from building or tearing down a simulated cluster.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimulatorError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Timer task {task} finalized {count} times, expected once")]
    FinalizeCount { task: String, count: usize },

    #[error("{0} timers still armed after shutdown")]
    LeakedTimers(usize),
}
