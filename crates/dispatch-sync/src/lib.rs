//! Synchronous inline dispatch for deterministic simulation.
//!
//! [`SyncDispatch`] runs all closures inline on the calling thread,
//! ensuring deterministic execution order. Queue depth is always 0.
//!
//! [`RejectingDispatch`] refuses every launch, forcing callers onto their
//! inline fallback path.

use metronome_dispatch::Dispatch;

/// Synchronous dispatch that runs closures inline.
///
/// Used by simulation runners for deterministic execution.
/// All work runs on the calling thread in the order dispatched.
#[derive(Debug, Default, Clone, Copy)]
pub struct SyncDispatch;

impl SyncDispatch {
    pub fn new() -> Self {
        Self
    }
}

impl Dispatch for SyncDispatch {
    fn try_spawn<F>(&self, f: F) -> Result<(), F>
    where
        F: FnOnce() + Send + 'static,
    {
        f();
        Ok(())
    }

    fn queue_depth(&self) -> usize {
        0
    }
}

/// Dispatch that refuses every launch.
#[derive(Debug, Default, Clone, Copy)]
pub struct RejectingDispatch;

impl RejectingDispatch {
    pub fn new() -> Self {
        Self
    }
}

impl Dispatch for RejectingDispatch {
    fn try_spawn<F>(&self, f: F) -> Result<(), F>
    where
        F: FnOnce() + Send + 'static,
    {
        Err(f)
    }

    fn queue_depth(&self) -> usize {
        0
    }
}
