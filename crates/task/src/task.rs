//! The repeated timer task and its lifecycle state machine.

use crate::config::TimerTaskConfig;
use crate::error::TimerTaskError;
use crate::phase::{AfterFire, Phase};
use crate::snapshot::TaskSnapshot;
use crate::trampoline;
use metronome_core::{CancelOutcome, TimerAction, TimerHandle, TimerScheduler};
use metronome_dispatch::Dispatch;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, error, instrument, trace, warn};

/// Upper bound on a single arm interval, keeping `now + interval` in range.
const MAX_INTERVAL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

pub(crate) struct TaskState {
    pub(crate) timeout: Duration,
    pub(crate) phase: Phase,
    pub(crate) finalized: bool,
}

/// Lifecycle state shared by the user handles and the fire path.
///
/// Scheduler callbacks and dispatched fires hold strong references, so the
/// state outlives the last user handle until a destroyed task's
/// asynchronous tail (an in-flight fire or a pending finalize) has drained.
pub(crate) struct TaskInner<A, S, D> {
    pub(crate) name: String,
    pub(crate) action: A,
    pub(crate) scheduler: Arc<S>,
    pub(crate) dispatch: D,
    pub(crate) state: Mutex<TaskState>,
    finalized_cv: Condvar,
}

/// A periodic timer that runs a [`TimerAction`] every `timeout`.
///
/// The task arms one registration with its [`TimerScheduler`] at a time.
/// When it elapses, the fire is handed to a [`Dispatch`] worker, the action
/// runs, and the next registration is armed only after the action returns.
/// Executions therefore never overlap, and the interval is measured from the
/// end of one execution to the next fire.
///
/// All lifecycle operations are safe to call from any thread, including
/// from inside the action and the finalizer:
///
/// - [`start`](Self::start): arm if idle
/// - [`stop`](Self::stop): prevent further fires (an already-committed fire
///   still runs once)
/// - [`reset`](Self::reset) / [`reset_timeout`](Self::reset_timeout): restart
///   the countdown
/// - [`destroy`](Self::destroy): shut down and run
///   [`TimerAction::finalize`] exactly once, possibly after this call returns
///
/// Handles are cheap to clone and all refer to the same task.
///
/// # Scheduler contract
///
/// The task holds its lock while calling [`TimerScheduler::register`] and
/// [`TimerScheduler::cancel`]. Schedulers must never invoke a callback
/// synchronously from inside either call.
///
/// # Teardown
///
/// The last handle must not be released before [`destroy`](Self::destroy)
/// has been called. Dropping a task that was never destroyed panics, armed
/// or not. A destroyed task may be dropped with a fire still in flight; the
/// fire completes and finalizes on its own. Actions that need to reach their
/// own task should hold a [`WeakTimerTask`] to avoid a reference cycle.
pub struct RepeatedTimerTask<A, S, D> {
    owner: Arc<Owner<A, S, D>>,
}

/// The user-facing side of a task.
///
/// Only [`RepeatedTimerTask`] handles reference it. Scheduler callbacks and
/// dispatched fires hold the inner state directly, so this is dropped when
/// the last user handle goes away even while a registration is armed.
struct Owner<A, S, D> {
    inner: Arc<TaskInner<A, S, D>>,
    halt: fn(&TaskInner<A, S, D>),
}

impl<A, S, D> Clone for RepeatedTimerTask<A, S, D> {
    fn clone(&self) -> Self {
        Self {
            owner: Arc::clone(&self.owner),
        }
    }
}

/// Non-owning handle to a [`RepeatedTimerTask`].
///
/// Upgrading fails once every strong handle is gone, even if an in-flight
/// fire or finalize is still draining.
pub struct WeakTimerTask<A, S, D> {
    owner: Weak<Owner<A, S, D>>,
}

impl<A, S, D> Clone for WeakTimerTask<A, S, D> {
    fn clone(&self) -> Self {
        Self {
            owner: Weak::clone(&self.owner),
        }
    }
}

impl<A, S, D> WeakTimerTask<A, S, D> {
    pub fn upgrade(&self) -> Option<RepeatedTimerTask<A, S, D>> {
        self.owner.upgrade().map(|owner| RepeatedTimerTask { owner })
    }
}

impl<A, S, D> RepeatedTimerTask<A, S, D>
where
    A: TimerAction,
    S: TimerScheduler,
    D: Dispatch,
{
    /// Create an idle task with the configured timeout.
    pub fn new(config: TimerTaskConfig, action: A, scheduler: Arc<S>, dispatch: D) -> Self {
        let TimerTaskConfig { name, timeout } = config;
        debug!(task = %name, ?timeout, "Created timer task");
        let inner = Arc::new(TaskInner {
            name,
            action,
            scheduler,
            dispatch,
            state: Mutex::new(TaskState {
                timeout,
                phase: Phase::Idle,
                finalized: false,
            }),
            finalized_cv: Condvar::new(),
        });
        Self {
            owner: Arc::new(Owner {
                inner,
                halt: TaskInner::stop,
            }),
        }
    }

    /// Set the timeout and return the task to idle.
    ///
    /// Reopens a destroyed task once its finalizer has returned, after
    /// which the finalizer may run again on the next destroy.
    pub fn init(&self, timeout: Duration) -> Result<(), TimerTaskError> {
        let mut state = self.owner.inner.state.lock();
        match state.phase {
            Phase::Armed { .. } | Phase::InFlight { .. } | Phase::Invoking { .. } => {
                Err(TimerTaskError::StillRunning(self.owner.inner.name.clone()))
            }
            Phase::Destroyed if !state.finalized => {
                Err(TimerTaskError::FinalizePending(self.owner.inner.name.clone()))
            }
            Phase::Idle | Phase::Destroyed => {
                state.timeout = timeout;
                state.phase = Phase::Idle;
                state.finalized = false;
                debug!(task = %self.owner.inner.name, ?timeout, "Initialized timer task");
                Ok(())
            }
        }
    }

    /// Arm the timer unless the task is destroyed or already started.
    ///
    /// Called while a stopped fire is still in flight, the fire re-arms once
    /// the action returns instead of a second registration being made.
    pub fn start(&self) {
        self.owner.inner.start();
    }

    /// Stop further fires.
    ///
    /// A fire the scheduler has already committed to still runs once.
    pub fn stop(&self) {
        self.owner.inner.stop();
    }

    /// Restart the countdown from now with the current timeout.
    ///
    /// No effect on a stopped task. If a fire is already in flight, it runs
    /// and the next arm uses the current timeout.
    pub fn reset(&self) {
        self.owner.inner.reset(None);
    }

    /// Replace the timeout, then restart the countdown as in [`reset`](Self::reset).
    ///
    /// The new timeout is kept even when the task is stopped and applies to
    /// the next arm.
    pub fn reset_timeout(&self, timeout: Duration) {
        self.owner.inner.reset(Some(timeout));
    }

    /// Shut the task down.
    ///
    /// If nothing is in flight the finalizer runs before this returns.
    /// Otherwise it runs on whichever thread completes the in-flight fire,
    /// after the action has returned. Use
    /// [`wait_finalized`](Self::wait_finalized) to block on it.
    pub fn destroy(&self) {
        self.owner.inner.destroy();
    }

    /// Block until the finalizer has returned, up to `timeout`.
    ///
    /// Returns whether the task is finalized.
    pub fn wait_finalized(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout.min(MAX_INTERVAL);
        let inner = &self.owner.inner;
        let mut state = inner.state.lock();
        while !state.finalized {
            if inner
                .finalized_cv
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return state.finalized;
            }
        }
        true
    }

    /// Consistent view of the task's flags.
    pub fn snapshot(&self) -> TaskSnapshot {
        let (phase, timeout) = {
            let state = self.owner.inner.state.lock();
            (state.phase, state.timeout)
        };
        let remaining = phase
            .due()
            .map(|due| due.saturating_duration_since(self.owner.inner.scheduler.now()));

        TaskSnapshot {
            timeout,
            destroyed: phase.is_destroyed(),
            stopped: phase.is_stopped(),
            running: phase.is_running(),
            invoking: phase.is_invoking(),
            remaining,
        }
    }

    /// Single-line human-readable state, e.g. `timeout(100ms) SCHEDULING(in 42ms)`.
    pub fn describe(&self) -> String {
        self.snapshot().to_string()
    }

    pub fn name(&self) -> &str {
        &self.owner.inner.name
    }

    /// Configured timeout.
    pub fn timeout(&self) -> Duration {
        self.owner.inner.state.lock().timeout
    }

    pub fn is_finalized(&self) -> bool {
        self.owner.inner.state.lock().finalized
    }

    pub fn action(&self) -> &A {
        &self.owner.inner.action
    }

    pub fn scheduler(&self) -> &Arc<S> {
        &self.owner.inner.scheduler
    }

    pub fn downgrade(&self) -> WeakTimerTask<A, S, D> {
        WeakTimerTask {
            owner: Arc::downgrade(&self.owner),
        }
    }
}

impl<A, S, D> fmt::Debug for RepeatedTimerTask<A, S, D>
where
    A: TimerAction,
    S: TimerScheduler,
    D: Dispatch,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepeatedTimerTask")
            .field("name", &self.owner.inner.name)
            .field("state", &self.snapshot())
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Lifecycle transitions
// ═══════════════════════════════════════════════════════════════════════════

impl<A, S, D> TaskInner<A, S, D>
where
    A: TimerAction,
    S: TimerScheduler,
    D: Dispatch,
{
    fn start(self: &Arc<Self>) {
        let mut state = self.state.lock();
        match state.phase {
            Phase::Idle => self.arm(state),
            Phase::InFlight {
                due,
                then: AfterFire::Idle,
            } => {
                state.phase = Phase::InFlight {
                    due,
                    then: AfterFire::Rearm,
                };
                debug!(task = %self.name, "Restarted with a fire in flight");
            }
            Phase::Invoking {
                then: AfterFire::Idle,
            } => {
                state.phase = Phase::Invoking {
                    then: AfterFire::Rearm,
                };
                debug!(task = %self.name, "Restarted while invoking");
            }
            phase if phase.is_destroyed() => {
                trace!(task = %self.name, "Ignoring start on destroyed task");
            }
            _ => trace!(task = %self.name, "Already started"),
        }
    }

    fn stop(&self) {
        let mut state = self.state.lock();
        match state.phase {
            Phase::Armed { handle, due } => {
                state.phase = match self.cancel(handle) {
                    CancelOutcome::Prevented => Phase::Idle,
                    CancelOutcome::AlreadyFired => Phase::InFlight {
                        due,
                        then: AfterFire::Idle,
                    },
                };
                debug!(task = %self.name, %handle, "Stopped");
            }
            Phase::InFlight {
                due,
                then: AfterFire::Rearm,
            } => {
                state.phase = Phase::InFlight {
                    due,
                    then: AfterFire::Idle,
                };
                debug!(task = %self.name, "Stopped with a fire in flight");
            }
            Phase::Invoking {
                then: AfterFire::Rearm,
            } => {
                state.phase = Phase::Invoking {
                    then: AfterFire::Idle,
                };
                debug!(task = %self.name, "Stopped while invoking");
            }
            _ => trace!(task = %self.name, "Already stopped"),
        }
    }

    fn reset(self: &Arc<Self>, timeout: Option<Duration>) {
        let mut state = self.state.lock();
        if let Some(timeout) = timeout {
            state.timeout = timeout;
        }

        match state.phase {
            Phase::Armed { handle, due } => match self.cancel(handle) {
                CancelOutcome::Prevented => {
                    debug!(task = %self.name, %handle, "Resetting countdown");
                    self.arm(state);
                }
                CancelOutcome::AlreadyFired => {
                    state.phase = Phase::InFlight {
                        due,
                        then: AfterFire::Rearm,
                    };
                    debug!(task = %self.name, "Reset lost the race with a fire");
                }
            },
            // A started fire in flight re-arms with the latest timeout.
            _ => trace!(task = %self.name, "Reset has nothing armed to restart"),
        }
    }

    fn destroy(&self) {
        let mut state = self.state.lock();
        match state.phase {
            Phase::Idle => {
                state.phase = Phase::Destroyed;
                drop(state);
                self.finalize();
            }
            Phase::Armed { handle, due } => match self.cancel(handle) {
                CancelOutcome::Prevented => {
                    state.phase = Phase::Destroyed;
                    drop(state);
                    self.finalize();
                }
                CancelOutcome::AlreadyFired => {
                    state.phase = Phase::InFlight {
                        due,
                        then: AfterFire::Finalize,
                    };
                    debug!(task = %self.name, "Destroy deferred to in-flight fire");
                }
            },
            Phase::Destroyed
            | Phase::InFlight {
                then: AfterFire::Finalize,
                ..
            }
            | Phase::Invoking {
                then: AfterFire::Finalize,
            } => trace!(task = %self.name, "Already destroyed"),
            Phase::InFlight { due, .. } => {
                state.phase = Phase::InFlight {
                    due,
                    then: AfterFire::Finalize,
                };
                debug!(task = %self.name, "Destroy deferred to in-flight fire");
            }
            Phase::Invoking { .. } => {
                state.phase = Phase::Invoking {
                    then: AfterFire::Finalize,
                };
                debug!(task = %self.name, "Destroy deferred to running action");
            }
        }
    }

    /// Run one fire: claim it, execute the action unlocked, then apply
    /// whatever the lifecycle calls made in the meantime asked for.
    #[instrument(level = "debug", skip_all, fields(task = %self.name))]
    pub(crate) fn on_fire(self: &Arc<Self>) {
        {
            let mut state = self.state.lock();
            state.phase = match state.phase {
                Phase::Armed { .. } => Phase::Invoking {
                    then: AfterFire::Rearm,
                },
                Phase::InFlight { then, .. } => Phase::Invoking { then },
                phase => {
                    error!(?phase, "Timer fired with no fire expected, ignoring");
                    return;
                }
            };
        }

        metronome_metrics::record_timer_fired(&self.name);
        let started = Instant::now();
        self.action.run();
        metronome_metrics::record_action_latency(&self.name, started.elapsed().as_secs_f64());

        let mut state = self.state.lock();
        let Phase::Invoking { then } = state.phase else {
            error!(phase = ?state.phase, "Lost track of running fire");
            return;
        };
        match then {
            AfterFire::Rearm => self.arm(state),
            AfterFire::Idle => {
                state.phase = Phase::Idle;
                debug!("Went idle after fire");
            }
            AfterFire::Finalize => {
                state.phase = Phase::Destroyed;
                drop(state);
                self.finalize();
            }
        }
    }

    /// Register the next fire. Consumes the guard because a failed
    /// registration delivers the fire immediately, which needs the lock.
    fn arm(self: &Arc<Self>, mut state: MutexGuard<'_, TaskState>) {
        let interval = self.action.adjust_timeout(state.timeout).min(MAX_INTERVAL);
        let now = self.scheduler.now();
        let due = now + interval;

        let task = Arc::clone(self);
        let callback = Box::new(move || trampoline::on_timer_elapsed(task));
        match self.scheduler.register(due, callback) {
            Ok(handle) => {
                state.phase = Phase::Armed { handle, due };
                metronome_metrics::record_timer_armed(&self.name);
                trace!(task = %self.name, %handle, ?interval, "Armed");
            }
            Err(e) => {
                state.phase = Phase::InFlight {
                    due: now,
                    then: AfterFire::Rearm,
                };
                drop(state);
                warn!(task = %self.name, error = %e, "Failed to arm timer, firing now");
                metronome_metrics::record_register_failure(&self.name);
                trampoline::on_timer_elapsed(Arc::clone(self));
            }
        }
    }

    fn cancel(&self, handle: TimerHandle) -> CancelOutcome {
        let outcome = self.scheduler.cancel(handle);
        metronome_metrics::record_cancel(&self.name, outcome.is_prevented());
        outcome
    }

    fn finalize(&self) {
        debug!(task = %self.name, "Finalizing");
        self.action.finalize();
        metronome_metrics::record_task_finalized(&self.name);

        let mut state = self.state.lock();
        state.finalized = true;
        self.finalized_cv.notify_all();
    }
}

impl<A, S, D> Drop for Owner<A, S, D> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }
        let phase = self.inner.state.lock().phase;
        if phase.is_destroyed() {
            return;
        }
        // Unreachable from here on; cancel any registration so it stops firing.
        (self.halt)(&self.inner);
        if phase.is_running() {
            panic!(
                "timer task `{}` dropped without destroy() while still running",
                self.inner.name
            );
        }
        panic!("timer task `{}` dropped without destroy()", self.inner.name);
    }
}
