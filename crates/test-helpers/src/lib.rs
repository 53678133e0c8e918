//! Test helpers for repeated timer tasks.
//!
//! [`RecordingAction`] counts runs and finalizes and watches for the
//! conditions a correct task must never produce: overlapping runs, a run
//! after finalize, or a finalize while a run is executing. [`Gate`] lets a
//! test hold an action inside `run` while it pokes at the task from outside.
//!
//! # Example
//!
//! ```rust
//! use metronome_core::TimerAction;
//! use metronome_test_helpers::RecordingAction;
//!
//! let action = RecordingAction::new();
//! action.run();
//! action.finalize();
//! assert_eq!(action.runs(), 1);
//! assert_eq!(action.finalizes(), 1);
//! action.assert_well_behaved();
//! ```

use metronome_core::TimerAction;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Hook invoked inside `run` with the 1-based run number.
pub type RunHook = Box<dyn Fn(usize) + Send + Sync>;

/// Hook invoked inside `finalize`.
pub type FinalizeHook = Box<dyn Fn() + Send + Sync>;

type AdjustFn = Box<dyn Fn(Duration) -> Duration + Send + Sync>;

/// A [`TimerAction`] that records what the task did to it.
///
/// Hooks are installed after construction because they usually need a
/// handle to the task that owns the action.
#[derive(Default)]
pub struct RecordingAction {
    runs: AtomicUsize,
    completed: AtomicUsize,
    finalizes: AtomicUsize,
    in_run: AtomicBool,
    overlapped: AtomicBool,
    ran_after_finalize: AtomicBool,
    finalized_during_run: AtomicBool,
    run_delay: Duration,
    adjust: Option<AdjustFn>,
    adjusted: Mutex<Vec<Duration>>,
    on_run: OnceLock<RunHook>,
    on_finalize: OnceLock<FinalizeHook>,
}

impl RecordingAction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep for `delay` inside every run.
    pub fn with_run_delay(mut self, delay: Duration) -> Self {
        self.run_delay = delay;
        self
    }

    /// Transform the interval used for each arm.
    pub fn with_adjust(mut self, adjust: impl Fn(Duration) -> Duration + Send + Sync + 'static) -> Self {
        self.adjust = Some(Box::new(adjust));
        self
    }

    /// Install the run hook. Returns false if one is already installed.
    pub fn set_on_run(&self, hook: impl Fn(usize) + Send + Sync + 'static) -> bool {
        self.on_run.set(Box::new(hook)).is_ok()
    }

    /// Install the finalize hook. Returns false if one is already installed.
    pub fn set_on_finalize(&self, hook: impl Fn() + Send + Sync + 'static) -> bool {
        self.on_finalize.set(Box::new(hook)).is_ok()
    }

    /// Runs started.
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    /// Runs that returned.
    pub fn completed_runs(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn finalizes(&self) -> usize {
        self.finalizes.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.in_run.load(Ordering::SeqCst)
    }

    pub fn overlapped(&self) -> bool {
        self.overlapped.load(Ordering::SeqCst)
    }

    pub fn ran_after_finalize(&self) -> bool {
        self.ran_after_finalize.load(Ordering::SeqCst)
    }

    pub fn finalized_during_run(&self) -> bool {
        self.finalized_during_run.load(Ordering::SeqCst)
    }

    /// Configured timeouts passed to `adjust_timeout`, one per arm.
    pub fn armed_timeouts(&self) -> Vec<Duration> {
        self.adjusted.lock().clone()
    }

    /// Panic if any run overlapped another, ran after finalize, or was
    /// still executing when finalize began, or if finalize ran twice.
    pub fn assert_well_behaved(&self) {
        assert!(!self.overlapped(), "action runs overlapped");
        assert!(!self.ran_after_finalize(), "action ran after finalize");
        assert!(
            !self.finalized_during_run(),
            "finalize ran while the action was executing"
        );
        assert!(self.finalizes() <= 1, "finalize ran {} times", self.finalizes());
    }
}

impl TimerAction for RecordingAction {
    fn run(&self) {
        if self.in_run.swap(true, Ordering::SeqCst) {
            self.overlapped.store(true, Ordering::SeqCst);
        }
        if self.finalizes() > 0 {
            self.ran_after_finalize.store(true, Ordering::SeqCst);
        }
        let run = self.runs.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(hook) = self.on_run.get() {
            hook(run);
        }
        if !self.run_delay.is_zero() {
            std::thread::sleep(self.run_delay);
        }

        self.completed.fetch_add(1, Ordering::SeqCst);
        self.in_run.store(false, Ordering::SeqCst);
    }

    fn finalize(&self) {
        if self.in_run.load(Ordering::SeqCst) {
            self.finalized_during_run.store(true, Ordering::SeqCst);
        }
        self.finalizes.fetch_add(1, Ordering::SeqCst);
        if let Some(hook) = self.on_finalize.get() {
            hook();
        }
    }

    fn adjust_timeout(&self, timeout: Duration) -> Duration {
        self.adjusted.lock().push(timeout);
        match &self.adjust {
            Some(adjust) => adjust(timeout),
            None => timeout,
        }
    }
}

impl std::fmt::Debug for RecordingAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingAction")
            .field("runs", &self.runs())
            .field("completed", &self.completed_runs())
            .field("finalizes", &self.finalizes())
            .finish()
    }
}

/// One-shot barrier: threads calling [`wait`](Self::wait) block until
/// [`open`](Self::open) is called. Also records whether anyone has arrived.
#[derive(Default)]
pub struct Gate {
    state: Mutex<GateState>,
    cv: Condvar,
}

#[derive(Default)]
struct GateState {
    open: bool,
    arrived: usize,
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the gate opens.
    pub fn wait(&self) {
        let mut state = self.state.lock();
        state.arrived += 1;
        self.cv.notify_all();
        while !state.open {
            self.cv.wait(&mut state);
        }
    }

    pub fn open(&self) {
        self.state.lock().open = true;
        self.cv.notify_all();
    }

    /// Block until at least `count` threads have called `wait`, up to
    /// `timeout`. Returns whether they did.
    pub fn wait_for_arrivals(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.arrived < count {
            if self.cv.wait_until(&mut state, deadline).timed_out() {
                return state.arrived >= count;
            }
        }
        true
    }
}

/// Poll `condition` every millisecond until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}
