//! Virtual-clock timer facility.

use crate::event_queue::EventKey;
use metronome_core::{CancelOutcome, ScheduleError, TimerCallback, TimerHandle, TimerScheduler};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};
use tracing::trace;

/// Counters kept by [`ManualScheduler`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Registrations accepted.
    pub timers_set: u64,
    /// Cancellations that prevented a fire.
    pub timers_cancelled: u64,
    /// Cancellations that reported the fire as already happening.
    pub cancels_lost: u64,
    /// Callbacks handed out for execution.
    pub timers_fired: u64,
    /// Registrations refused by fault injection.
    pub registrations_refused: u64,
}

struct Entry {
    handle: TimerHandle,
    callback: TimerCallback,
}

struct SchedulerState {
    now: Duration,
    sequence: u64,
    queue: BTreeMap<EventKey, Entry>,
    keys: HashMap<TimerHandle, EventKey>,
    refuse_registrations: usize,
    peak_pending: usize,
    stats: SchedulerStats,
}

impl SchedulerState {
    /// Pop the earliest entry, moving the clock forward to its due time.
    fn pop_first(&mut self) -> Option<(EventKey, Entry)> {
        let (key, entry) = self.queue.pop_first()?;
        self.keys.remove(&entry.handle);
        self.now = self.now.max(key.time);
        self.stats.timers_fired += 1;
        Some((key, entry))
    }
}

/// Deterministic timer facility driven by explicit calls to advance time.
///
/// Registrations never fire on their own. [`advance`](Self::advance),
/// [`advance_to`](Self::advance_to) and [`fire_next`](Self::fire_next) pop
/// due registrations in `(due time, sequence)` order and run their callbacks
/// on the calling thread with no internal lock held, so callbacks may
/// register and cancel freely.
///
/// Cancellation is authoritative: a registration still in the queue is
/// removed and reported [`CancelOutcome::Prevented`]; anything else
/// (fired, in flight, unknown) reports [`CancelOutcome::AlreadyFired`].
pub struct ManualScheduler {
    base: Instant,
    state: Mutex<SchedulerState>,
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            state: Mutex::new(SchedulerState {
                now: Duration::ZERO,
                sequence: 0,
                queue: BTreeMap::new(),
                keys: HashMap::new(),
                refuse_registrations: 0,
                peak_pending: 0,
                stats: SchedulerStats::default(),
            }),
        }
    }

    /// Virtual time elapsed since construction.
    pub fn elapsed(&self) -> Duration {
        self.state.lock().now
    }

    /// Convert an instant on this scheduler's clock to virtual elapsed time.
    pub fn offset_of(&self, instant: Instant) -> Duration {
        instant.saturating_duration_since(self.base)
    }

    /// Advance the clock by `by`, firing everything that comes due.
    ///
    /// Returns the number of callbacks run. Registrations made by those
    /// callbacks that fall within the window fire in the same call.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.elapsed().saturating_add(by);
        self.advance_to(target)
    }

    /// Advance the clock to `target` (virtual elapsed time), firing
    /// everything due at or before it.
    pub fn advance_to(&self, target: Duration) -> usize {
        let mut fired = 0;
        loop {
            let next = {
                let mut state = self.state.lock();
                let due = state.queue.first_key_value().map(|(key, _)| key.time);
                match due {
                    Some(time) if time <= target => state.pop_first(),
                    _ => {
                        state.now = state.now.max(target);
                        None
                    }
                }
            };

            let Some((key, entry)) = next else {
                return fired;
            };
            trace!(handle = %entry.handle, time = ?key.time, "Firing timer");
            (entry.callback)();
            fired += 1;
        }
    }

    /// Fire the earliest registration regardless of its due time, moving
    /// the clock forward to it. Returns false if nothing is armed.
    pub fn fire_next(&self) -> bool {
        match self.begin_next_fire() {
            Some(fire) => {
                fire.complete();
                true
            }
            None => false,
        }
    }

    /// Take the earliest registration out of the queue without running it.
    ///
    /// The returned fire is in flight: cancelling its handle now reports
    /// [`CancelOutcome::AlreadyFired`]. Call [`InFlightFire::complete`] to
    /// deliver it. Dropping it abandons the fire.
    pub fn begin_next_fire(&self) -> Option<InFlightFire> {
        let (key, entry) = self.state.lock().pop_first()?;
        Some(InFlightFire {
            handle: entry.handle,
            due: key.time,
            callback: entry.callback,
        })
    }

    /// Refuse the next `count` registrations with [`ScheduleError::Rejected`].
    pub fn fail_next_registrations(&self, count: usize) {
        self.state.lock().refuse_registrations = count;
    }

    /// Due time (virtual) of the earliest armed registration.
    pub fn next_due(&self) -> Option<Duration> {
        self.state.lock().queue.first_key_value().map(|(key, _)| key.time)
    }

    /// Largest number of simultaneously armed registrations observed.
    pub fn peak_pending(&self) -> usize {
        self.state.lock().peak_pending
    }

    pub fn stats(&self) -> SchedulerStats {
        self.state.lock().stats
    }
}

impl TimerScheduler for ManualScheduler {
    fn now(&self) -> Instant {
        self.base + self.state.lock().now
    }

    fn register(&self, due: Instant, callback: TimerCallback) -> Result<TimerHandle, ScheduleError> {
        let time = self.offset_of(due);
        let mut state = self.state.lock();

        if state.refuse_registrations > 0 {
            state.refuse_registrations -= 1;
            state.stats.registrations_refused += 1;
            return Err(ScheduleError::Rejected("injected registration failure".to_string()));
        }

        state.sequence += 1;
        let key = EventKey::new(time, state.sequence);
        let handle = TimerHandle::new(state.sequence);
        state.queue.insert(key, Entry { handle, callback });
        state.keys.insert(handle, key);
        state.stats.timers_set += 1;
        state.peak_pending = state.peak_pending.max(state.queue.len());
        Ok(handle)
    }

    fn cancel(&self, handle: TimerHandle) -> CancelOutcome {
        let removed = {
            let mut state = self.state.lock();
            let removed = state
                .keys
                .remove(&handle)
                .and_then(|key| state.queue.remove(&key));
            if removed.is_some() {
                state.stats.timers_cancelled += 1;
            } else {
                state.stats.cancels_lost += 1;
            }
            removed
        };

        // The callback is dropped here, outside the lock.
        match removed {
            Some(_) => CancelOutcome::Prevented,
            None => CancelOutcome::AlreadyFired,
        }
    }

    fn pending(&self) -> usize {
        self.state.lock().queue.len()
    }
}

/// A fire taken out of the queue but not yet delivered.
#[must_use = "dropping an in-flight fire abandons it"]
pub struct InFlightFire {
    handle: TimerHandle,
    due: Duration,
    callback: TimerCallback,
}

impl InFlightFire {
    pub fn handle(&self) -> TimerHandle {
        self.handle
    }

    /// Virtual due time of the registration.
    pub fn due(&self) -> Duration {
        self.due
    }

    /// Deliver the fire on the calling thread.
    pub fn complete(self) {
        trace!(handle = %self.handle, time = ?self.due, "Completing in-flight fire");
        (self.callback)();
    }
}

impl std::fmt::Debug for InFlightFire {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InFlightFire")
            .field("handle", &self.handle)
            .field("due", &self.due)
            .finish()
    }
}
