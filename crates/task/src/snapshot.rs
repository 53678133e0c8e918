//! Point-in-time view of a task's state.

use std::fmt;
use std::time::Duration;

/// Consistent copy of a task's flags, taken under its lock.
///
/// The [`Display`](fmt::Display) form is the human-readable description
/// returned by [`RepeatedTimerTask::describe`](crate::RepeatedTimerTask::describe):
///
/// ```text
/// timeout(100ms) SCHEDULING(in 42ms)
/// timeout(100ms) STOPPED INVOKING
/// timeout(100ms) DESTROYED STOPPED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskSnapshot {
    /// Configured timeout, before any per-arm adjustment.
    pub timeout: Duration,
    pub destroyed: bool,
    pub stopped: bool,
    pub running: bool,
    pub invoking: bool,
    /// Time until the pending fire, when one is armed and not yet executing.
    /// Zero once the due time has passed.
    pub remaining: Option<Duration>,
}

impl fmt::Display for TaskSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timeout({}ms)", self.timeout.as_millis())?;
        if self.destroyed {
            f.write_str(" DESTROYED")?;
        }
        if self.stopped {
            f.write_str(" STOPPED")?;
        }
        if self.running {
            if self.invoking {
                f.write_str(" INVOKING")?;
            } else {
                let remaining = self.remaining.unwrap_or_default();
                write!(f, " SCHEDULING(in {}ms)", remaining.as_millis())?;
            }
        }
        Ok(())
    }
}
