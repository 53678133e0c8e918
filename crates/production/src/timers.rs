//! Tokio-based timer facility.

use metronome_core::{CancelOutcome, ScheduleError, TimerCallback, TimerHandle, TimerScheduler};
use metronome_metrics as metrics;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

const PENDING: u8 = 0;
const FIRED: u8 = 1;
const CANCELLED: u8 = 2;

/// Configuration for [`TokioTimerScheduler`].
#[derive(Debug, Clone)]
pub struct TokioSchedulerConfig {
    /// Label for this scheduler's metrics.
    pub name: String,

    /// Maximum armed registrations. `None` means unbounded.
    pub max_pending: Option<usize>,
}

impl Default for TokioSchedulerConfig {
    fn default() -> Self {
        Self {
            name: "tokio-timer".to_string(),
            max_pending: None,
        }
    }
}

impl TokioSchedulerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Refuse registrations beyond `limit` armed timers.
    pub fn with_max_pending(mut self, limit: usize) -> Self {
        self.max_pending = Some(limit);
        self
    }
}

struct Registration {
    state: Arc<AtomicU8>,
    task: JoinHandle<()>,
}

type Registry = Arc<Mutex<HashMap<TimerHandle, Registration>>>;

/// Timer facility backed by tokio sleep tasks.
///
/// Spawns one async sleep task per registration via the tokio handle. The
/// task and a concurrent `cancel` race on a compare-and-swap of the
/// registration's state; whichever wins decides the outcome.
pub struct TokioTimerScheduler {
    tokio_handle: tokio::runtime::Handle,
    name: Arc<str>,
    config: TokioSchedulerConfig,
    next_id: AtomicU64,
    active: Registry,
}

impl TokioTimerScheduler {
    /// Create an unbounded scheduler on the given runtime.
    pub fn new(tokio_handle: tokio::runtime::Handle) -> Self {
        Self::with_config(tokio_handle, TokioSchedulerConfig::default())
    }

    pub fn with_config(tokio_handle: tokio::runtime::Handle, config: TokioSchedulerConfig) -> Self {
        Self {
            tokio_handle,
            name: Arc::from(config.name.as_str()),
            config,
            next_id: AtomicU64::new(1),
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Create a scheduler on the runtime the caller is running in.
    pub fn try_current() -> Result<Self, tokio::runtime::TryCurrentError> {
        Ok(Self::new(tokio::runtime::Handle::try_current()?))
    }

    pub fn config(&self) -> &TokioSchedulerConfig {
        &self.config
    }
}

impl TimerScheduler for TokioTimerScheduler {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn register(&self, due: Instant, callback: TimerCallback) -> Result<TimerHandle, ScheduleError> {
        let mut active = self.active.lock();
        if let Some(limit) = self.config.max_pending {
            if active.len() >= limit {
                return Err(ScheduleError::CapacityExceeded { limit });
            }
        }

        let handle = TimerHandle::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let state = Arc::new(AtomicU8::new(PENDING));

        let task_state = Arc::clone(&state);
        let registry = Arc::clone(&self.active);
        let name = Arc::clone(&self.name);
        let deadline = tokio::time::Instant::from_std(due);
        let task = self.tokio_handle.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if task_state
                .compare_exchange(PENDING, FIRED, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                let pending = {
                    let mut active = registry.lock();
                    active.remove(&handle);
                    active.len()
                };
                metrics::set_scheduler_pending(&name, pending);
                trace!(%handle, "Timer elapsed");
                callback();
            }
        });

        // A shut-down runtime drops the sleep task unrun. The registry lock
        // is held, so a finished task here cannot have fired.
        if task.is_finished() && state.load(Ordering::Acquire) == PENDING {
            warn!(%handle, "Tokio runtime is shut down, refusing registration");
            return Err(ScheduleError::Rejected("tokio runtime is shut down".to_string()));
        }

        active.insert(handle, Registration { state, task });
        metrics::set_scheduler_pending(&self.name, active.len());
        Ok(handle)
    }

    fn cancel(&self, handle: TimerHandle) -> CancelOutcome {
        let (registration, pending) = {
            let mut active = self.active.lock();
            let registration = active.remove(&handle);
            (registration, active.len())
        };
        metrics::set_scheduler_pending(&self.name, pending);

        let Some(registration) = registration else {
            return CancelOutcome::AlreadyFired;
        };

        if registration
            .state
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            registration.task.abort();
            CancelOutcome::Prevented
        } else {
            debug!(%handle, "Cancellation lost the race against an elapsed timer");
            CancelOutcome::AlreadyFired
        }
    }

    fn pending(&self) -> usize {
        self.active.lock().len()
    }
}

impl Drop for TokioTimerScheduler {
    fn drop(&mut self) {
        for (_, registration) in self.active.lock().drain() {
            registration.task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn counting_callback(counter: &Arc<AtomicUsize>) -> TimerCallback {
        let counter = Arc::clone(counter);
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_registration_fires_after_due() {
        let scheduler = TokioTimerScheduler::try_current().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel();

        let due = scheduler.now() + Duration::from_millis(20);
        scheduler
            .register(
                due,
                Box::new(move || {
                    let _ = tx.send(Instant::now());
                }),
            )
            .unwrap();
        assert_eq!(scheduler.pending(), 1);

        let fired_at = tokio::time::timeout(Duration::from_secs(5), rx)
            .await
            .unwrap()
            .unwrap();
        assert!(fired_at >= due);
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_before_due_prevents_fire() {
        let scheduler = TokioTimerScheduler::try_current().unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        let handle = scheduler
            .register(
                scheduler.now() + Duration::from_millis(30),
                counting_callback(&counter),
            )
            .unwrap();
        assert_eq!(scheduler.cancel(handle), CancelOutcome::Prevented);
        assert_eq!(scheduler.pending(), 0);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_after_fire_reports_already_fired() {
        let scheduler = TokioTimerScheduler::try_current().unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        let handle = scheduler
            .register(scheduler.now(), counting_callback(&counter))
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while counter.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.cancel(handle), CancelOutcome::AlreadyFired);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_unknown_handle_reports_already_fired() {
        let scheduler = TokioTimerScheduler::try_current().unwrap();
        assert_eq!(
            scheduler.cancel(TimerHandle::new(9_999)),
            CancelOutcome::AlreadyFired
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_capacity_limit() {
        let scheduler = TokioTimerScheduler::with_config(
            tokio::runtime::Handle::current(),
            TokioSchedulerConfig::new().with_max_pending(1),
        );
        let counter = Arc::new(AtomicUsize::new(0));
        let due = scheduler.now() + Duration::from_secs(60);

        let first = scheduler.register(due, counting_callback(&counter)).unwrap();
        let err = scheduler
            .register(due, counting_callback(&counter))
            .unwrap_err();
        assert_eq!(err, ScheduleError::CapacityExceeded { limit: 1 });

        assert_eq!(scheduler.cancel(first), CancelOutcome::Prevented);
        assert!(scheduler.register(due, counting_callback(&counter)).is_ok());
    }

    #[test]
    fn test_register_after_runtime_shutdown_is_rejected() {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_time()
            .build()
            .unwrap();
        let scheduler = TokioTimerScheduler::new(rt.handle().clone());
        drop(rt);

        let counter = Arc::new(AtomicUsize::new(0));
        let err = scheduler
            .register(
                scheduler.now() + Duration::from_millis(5),
                counting_callback(&counter),
            )
            .unwrap_err();
        assert!(matches!(err, ScheduleError::Rejected(_)), "{err:?}");
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancelled_callback_is_released() {
        let scheduler = TokioTimerScheduler::try_current().unwrap();
        let payload = Arc::new(());
        let held = Arc::clone(&payload);

        let handle = scheduler
            .register(
                scheduler.now() + Duration::from_secs(60),
                Box::new(move || drop(held)),
            )
            .unwrap();
        assert_eq!(Arc::strong_count(&payload), 2);
        assert_eq!(scheduler.cancel(handle), CancelOutcome::Prevented);

        let deadline = Instant::now() + Duration::from_secs(5);
        while Arc::strong_count(&payload) > 1 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(Arc::strong_count(&payload), 1);
    }
}
