//! The work a repeated timer task performs.

use std::time::Duration;

/// Behavior supplied by the owner of a repeated timer task.
///
/// Both [`run`](Self::run) and [`finalize`](Self::finalize) are invoked with
/// no task lock held, so either may call `start`, `stop`, `reset` or
/// `destroy` on the task that owns it.
///
/// # Example
///
/// ```ignore
/// struct ElectionTimeout {
///     node: Weak<Node>,
///     jitter: UniformJitter,
/// }
///
/// impl TimerAction for ElectionTimeout {
///     fn run(&self) {
///         if let Some(node) = self.node.upgrade() {
///             node.start_election();
///         }
///     }
///
///     fn adjust_timeout(&self, timeout: Duration) -> Duration {
///         self.jitter.apply(timeout)
///     }
/// }
/// ```
pub trait TimerAction: Send + Sync + 'static {
    /// Perform one fire's worth of work.
    ///
    /// Must return once the unit of work is done and must not block
    /// indefinitely: the next fire is not armed until it returns.
    fn run(&self);

    /// Release resources once the task is destroyed.
    ///
    /// Called exactly once, after the last `run` has returned and after no
    /// further arming is possible.
    fn finalize(&self) {}

    /// Interval to apply for the next arm, given the configured timeout.
    ///
    /// The configured value reported by introspection is unaffected.
    fn adjust_timeout(&self, timeout: Duration) -> Duration {
        timeout
    }
}

impl<T: TimerAction + ?Sized> TimerAction for std::sync::Arc<T> {
    fn run(&self) {
        (**self).run();
    }

    fn finalize(&self) {
        (**self).finalize();
    }

    fn adjust_timeout(&self, timeout: Duration) -> Duration {
        (**self).adjust_timeout(timeout)
    }
}
