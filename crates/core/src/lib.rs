//! Core abstractions for repeated timer tasks.
//!
//! This crate defines the seams between a repeated timer task and the world
//! around it:
//!
//! - [`TimerScheduler`]: The timer facility that arms and cancels one-shot
//!   registrations
//! - [`TimerAction`]: The work a task performs on each fire, plus its one-time
//!   cleanup
//! - [`UniformJitter`]: Randomized interval adjustment for election-style
//!   timeouts
//!
//! # Architecture
//!
//! ```text
//! caller ─ start/stop/reset/destroy ─→ RepeatedTimerTask ─ register/cancel ─→ TimerScheduler
//!                                            ▲                                     │
//!                                            └──── on_fire (via Dispatch) ←── callback
//! ```
//!
//! Concrete schedulers live in `metronome-production` (tokio) and
//! `metronome-simulation` (virtual clock). The task itself lives in
//! `metronome-task`.

mod jitter;
mod timer;
mod traits;

pub use jitter::UniformJitter;
pub use timer::{CancelOutcome, ScheduleError, TimerCallback, TimerHandle, TimerScheduler};
pub use traits::TimerAction;
