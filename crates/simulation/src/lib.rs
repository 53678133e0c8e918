//! Deterministic simulation timer facility.
//!
//! This crate provides [`ManualScheduler`], a [`metronome_core::TimerScheduler`]
//! driven by a virtual clock. Nothing fires until the test or simulation
//! advances time, and fires are delivered on the advancing thread in a fixed
//! order. Given the same sequence of calls, it produces identical results
//! every run.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                  ManualScheduler                        │
//! │                                                         │
//! │  ┌────────────────────────────────────────────────────┐ │
//! │  │     Event Queue (BTreeMap<EventKey, Entry>)        │ │
//! │  │     Ordered by: due time, sequence                 │ │
//! │  └────────────────────────┬───────────────────────────┘ │
//! │                           │ advance / fire_next         │
//! │                           ▼                             │
//! │  ┌────────────────────────────────────────────────────┐ │
//! │  │     callback() on the caller's thread, no lock     │ │
//! │  └────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Fault injection covers the degraded paths of a timer task: refused
//! registrations ([`ManualScheduler::fail_next_registrations`]) and fires that
//! are already in flight when a cancellation arrives
//! ([`ManualScheduler::begin_next_fire`]).

mod event_queue;
mod scheduler;

pub use event_queue::EventKey;
pub use scheduler::{InFlightFire, ManualScheduler, SchedulerStats};
