//! Dispatch trait for running timer fires on worker threads.
//!
//! This crate defines the [`Dispatch`] trait used by repeated timer tasks to
//! move the user action off the timer facility's delivery thread, which must
//! never be blocked by slow work such as disk access.
//!
//! - [`SyncDispatch`](https://docs.rs/metronome-dispatch-sync) runs closures inline (deterministic simulation)
//! - [`PooledDispatch`](https://docs.rs/metronome-dispatch-pooled) uses a rayon thread pool (production)
//!
//! # Rejection
//!
//! A launch may be refused (pool overloaded, shutting down). The closure is
//! handed back to the caller, which is then responsible for running it. Timer
//! tasks run it inline: a late fire is better than a lost one.

/// Trait for launching fire-and-forget work on a worker.
pub trait Dispatch: Send + Sync + Clone + 'static {
    /// Try to launch `f` on a worker.
    ///
    /// Returns `Err(f)` with the closure untouched if the launch was refused.
    /// On `Ok(())` the closure will run exactly once.
    fn try_spawn<F>(&self, f: F) -> Result<(), F>
    where
        F: FnOnce() + Send + 'static;

    /// Number of launched closures that have not finished.
    fn queue_depth(&self) -> usize;
}
