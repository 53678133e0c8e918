//! Repeated timer task.
//!
//! A [`RepeatedTimerTask`] runs a [`TimerAction`](metronome_core::TimerAction)
//! periodically on top of a one-shot [`TimerScheduler`](metronome_core::TimerScheduler),
//! handing each fire to a [`Dispatch`](metronome_dispatch::Dispatch) worker.
//! It is the building block for consensus-style timers: election timeouts,
//! vote timeouts, heartbeats and snapshot intervals.
//!
//! # Lifecycle
//!
//! ```text
//!            start                 elapsed             action returns
//!   Idle ───────────→ Armed ───────────────→ Invoking ────────────────┐
//!    ▲                  │  ▲                     │                    │
//!    │ stop (prevented) │  └──── re-arm ─────────┼────────────────────┘
//!    └──────────────────┘                        │
//!                                    destroy ────┴──→ Destroyed + finalize
//! ```
//!
//! Cancellation can lose a race with a fire the scheduler has already
//! committed to. The task tracks such a fire as in flight and records what
//! should happen after it (re-arm, go idle, or finalize), so:
//!
//! - at most one registration is outstanding at any time
//! - the action never runs concurrently with itself
//! - the finalizer runs exactly once, after the last action has returned
//!
//! # Example
//!
//! ```ignore
//! use metronome_task::{RepeatedTimerTask, TimerTaskConfig};
//!
//! let task = RepeatedTimerTask::new(
//!     TimerTaskConfig::new("heartbeat", Duration::from_millis(50)),
//!     Heartbeat::new(peers),
//!     Arc::new(TokioTimerScheduler::try_current()?),
//!     PooledDispatch::new(ThreadPoolConfig::auto())?,
//! );
//! task.start();
//! // ...
//! task.destroy();
//! task.wait_finalized(Duration::from_secs(1));
//! ```

mod config;
mod error;
mod phase;
mod snapshot;
mod task;
mod trampoline;

pub use config::TimerTaskConfig;
pub use error::TimerTaskError;
pub use snapshot::TaskSnapshot;
pub use task::{RepeatedTimerTask, WeakTimerTask};
