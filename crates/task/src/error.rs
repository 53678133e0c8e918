use thiserror::Error;

/// Errors returned by timer task lifecycle operations.
///
/// Only (re)initialization can fail. `start`, `stop`, `reset` and `destroy`
/// are idempotent and treat every out-of-place call as a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimerTaskError {
    /// An armed registration or an in-flight fire still belongs to the task.
    #[error("Timer task `{0}` is still running")]
    StillRunning(String),

    /// The task was destroyed but its finalizer has not returned yet.
    #[error("Timer task `{0}` is still finalizing")]
    FinalizePending(String),
}
