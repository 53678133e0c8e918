//! Production timer facility with async I/O.
//!
//! This crate provides [`TokioTimerScheduler`], the production implementation
//! of [`metronome_core::TimerScheduler`]:
//!
//! - Each registration is a tokio task sleeping until its due time
//! - Cancellation aborts the sleeping task
//! - A per-registration atomic decides the cancel/fire race, so a
//!   cancellation result is always authoritative
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │ register(due, cb) ──→ tokio::spawn(sleep_until(due); CAS; cb())  │
//! │                                     │                             │
//! │ cancel(handle) ──→ CAS pending→cancelled ──→ abort ──→ Prevented  │
//! │                      (CAS lost)         ──→ AlreadyFired          │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Callbacks run on a tokio worker. Timer tasks immediately hand them to a
//! worker pool, so the runtime is blocked only when that pool refuses.

mod timers;

pub use timers::{TokioSchedulerConfig, TokioTimerScheduler};
