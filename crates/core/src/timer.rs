//! Timer scheduling abstraction.
//!
//! A repeated timer task arms exactly one registration at a time and relies
//! on the result of [`TimerScheduler::cancel`] to settle the race between a
//! cancellation request and a natural fire:
//! - Production: `TokioTimerScheduler` spawns one sleeping tokio task per registration
//! - Simulation: `ManualScheduler` inserts into a deterministic virtual-clock queue

use std::fmt;
use std::time::Instant;
use thiserror::Error;

/// Callback invoked by the scheduler when a registration elapses.
pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// Opaque identifier for a single outstanding registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerHandle(u64);

impl TimerHandle {
    /// Wrap a scheduler-assigned registration id.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// The raw registration id.
    pub const fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// Authoritative result of a cancellation attempt.
///
/// There is no third outcome. Callers treat the result as final and never
/// retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The callback was dropped without running and never will run.
    Prevented,
    /// The callback has run, is running, or is guaranteed to run.
    AlreadyFired,
}

impl CancelOutcome {
    /// Whether the fire was prevented.
    pub const fn is_prevented(self) -> bool {
        matches!(self, Self::Prevented)
    }
}

/// Errors from arming a registration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("Timer facility is at capacity ({limit} pending registrations)")]
    CapacityExceeded { limit: usize },

    #[error("Timer facility rejected registration: {0}")]
    Rejected(String),
}

/// Abstraction over a one-shot timer facility.
///
/// # Contract
///
/// - `register` arms exactly one registration and must never invoke the
///   callback synchronously from inside the call.
/// - `cancel` returns [`CancelOutcome::Prevented`] only if the callback has
///   been dropped unrun. Unknown or already-fired handles report
///   [`CancelOutcome::AlreadyFired`]. It must never invoke a callback.
/// - Callbacks may be invoked on any thread.
///
/// Repeated timer tasks call `register` and `cancel` while holding their
/// internal lock, which is why neither may call back into the task.
pub trait TimerScheduler: Send + Sync + 'static {
    /// Current time on this facility's clock. Due times are expressed on it.
    fn now(&self) -> Instant;

    /// Arm a one-shot registration that invokes `callback` at or after `due`.
    fn register(&self, due: Instant, callback: TimerCallback) -> Result<TimerHandle, ScheduleError>;

    /// Attempt to prevent a registration from firing.
    fn cancel(&self, handle: TimerHandle) -> CancelOutcome;

    /// Number of registrations that are armed and not yet fired or cancelled.
    fn pending(&self) -> usize;
}
