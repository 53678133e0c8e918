//! Lifecycle tests on a virtual clock.
//!
//! Every fire is delivered inline by `ManualScheduler::advance` through
//! `SyncDispatch`, so each test is a deterministic sequence of transitions.

use metronome_core::TimerScheduler;
use metronome_dispatch_sync::SyncDispatch;
use metronome_simulation::ManualScheduler;
use metronome_task::{RepeatedTimerTask, TimerTaskConfig, TimerTaskError};
use metronome_test_helpers::RecordingAction;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

type Task = RepeatedTimerTask<Arc<RecordingAction>, ManualScheduler, SyncDispatch>;

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

fn setup_with(action: RecordingAction, timeout: Duration) -> (Task, Arc<RecordingAction>, Arc<ManualScheduler>) {
    let action = Arc::new(action);
    let scheduler = Arc::new(ManualScheduler::new());
    let task = RepeatedTimerTask::new(
        TimerTaskConfig::new("test", timeout),
        Arc::clone(&action),
        Arc::clone(&scheduler),
        SyncDispatch::new(),
    );
    (task, action, scheduler)
}

fn setup(timeout: Duration) -> (Task, Arc<RecordingAction>, Arc<ManualScheduler>) {
    setup_with(RecordingAction::new(), timeout)
}

// ═══════════════════════════════════════════════════════════════════════════
// Periodic firing
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_fires_every_timeout_until_destroyed() {
    let (task, action, scheduler) = setup(ms(100));
    task.start();
    assert_eq!(scheduler.next_due(), Some(ms(100)));

    assert_eq!(scheduler.advance(ms(99)), 0);
    assert_eq!(action.runs(), 0);
    assert_eq!(scheduler.advance(ms(1)), 1);
    assert_eq!(action.runs(), 1);
    assert_eq!(scheduler.next_due(), Some(ms(200)));

    scheduler.advance(ms(1000));
    assert_eq!(action.runs(), 11);
    assert_eq!(scheduler.peak_pending(), 1);

    task.destroy();
    assert!(task.is_finalized());
    assert_eq!(action.finalizes(), 1);
    assert_eq!(scheduler.pending(), 0);

    scheduler.advance(ms(1000));
    assert_eq!(action.runs(), 11);
    action.assert_well_behaved();
}

#[test]
fn test_start_is_idempotent() {
    let (task, _action, scheduler) = setup(ms(100));
    task.start();
    task.start();
    task.start();

    assert_eq!(scheduler.pending(), 1);
    assert_eq!(scheduler.stats().timers_set, 1);
    task.destroy();
}

#[test]
fn test_interval_measured_from_end_of_previous_fire() {
    let (task, action, scheduler) = setup(ms(100));
    task.start();
    scheduler.advance(ms(130));
    assert_eq!(action.runs(), 1);
    // Fired at 100, re-armed relative to the fire, not to the advance target.
    assert_eq!(scheduler.next_due(), Some(ms(200)));
    task.destroy();
}

// ═══════════════════════════════════════════════════════════════════════════
// Stop
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_stop_before_fire_prevents_it() {
    let (task, action, scheduler) = setup(ms(100));
    task.start();
    task.stop();

    assert_eq!(scheduler.pending(), 0);
    scheduler.advance(ms(1000));
    assert_eq!(action.runs(), 0);

    let snapshot = task.snapshot();
    assert!(snapshot.stopped);
    assert!(!snapshot.running);
    assert_eq!(task.describe(), "timeout(100ms) STOPPED");
    task.destroy();
}

#[test]
fn test_stop_racing_fire_runs_it_once_then_idles() {
    let (task, action, scheduler) = setup(ms(100));
    task.start();

    let fire = scheduler.begin_next_fire().unwrap();
    task.stop();

    let snapshot = task.snapshot();
    assert!(snapshot.stopped);
    assert!(snapshot.running);
    assert!(!snapshot.invoking);
    assert_eq!(task.describe(), "timeout(100ms) STOPPED SCHEDULING(in 0ms)");

    fire.complete();
    assert_eq!(action.runs(), 1);
    assert!(!task.snapshot().running);
    assert_eq!(scheduler.pending(), 0);

    task.start();
    assert_eq!(scheduler.next_due(), Some(ms(200)));
    scheduler.advance(ms(100));
    assert_eq!(action.runs(), 2);

    task.destroy();
    action.assert_well_behaved();
}

#[test]
fn test_start_while_stopped_fire_in_flight_does_not_double_arm() {
    let (task, action, scheduler) = setup(ms(100));
    task.start();

    let fire = scheduler.begin_next_fire().unwrap();
    task.stop();
    task.start();
    assert_eq!(scheduler.pending(), 0);
    assert!(!task.snapshot().stopped);

    fire.complete();
    assert_eq!(action.runs(), 1);
    assert_eq!(scheduler.pending(), 1);
    assert_eq!(scheduler.peak_pending(), 1);
    task.destroy();
}

#[test]
fn test_stop_inside_action_goes_idle() {
    let (task, action, scheduler) = setup(ms(100));
    let weak = task.downgrade();
    action.set_on_run(move |_| {
        if let Some(task) = weak.upgrade() {
            task.stop();
        }
    });

    task.start();
    scheduler.advance(ms(100));
    assert_eq!(action.runs(), 1);
    assert_eq!(scheduler.pending(), 0);

    task.start();
    assert_eq!(scheduler.pending(), 1);
    task.destroy();
}

#[test]
fn test_stop_then_start_inside_action_rearms_once() {
    let (task, action, scheduler) = setup(ms(100));
    let weak = task.downgrade();
    action.set_on_run(move |_| {
        if let Some(task) = weak.upgrade() {
            task.stop();
            task.start();
        }
    });

    task.start();
    scheduler.advance(ms(300));
    assert_eq!(action.runs(), 3);
    assert_eq!(scheduler.peak_pending(), 1);
    task.destroy();
}

// ═══════════════════════════════════════════════════════════════════════════
// Reset
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_reset_restarts_countdown() {
    let (task, action, scheduler) = setup(ms(100));
    task.start();
    scheduler.advance(ms(50));
    task.reset();
    assert_eq!(scheduler.next_due(), Some(ms(150)));

    scheduler.advance(ms(99));
    assert_eq!(action.runs(), 0);
    scheduler.advance(ms(1));
    assert_eq!(action.runs(), 1);
    assert_eq!(scheduler.peak_pending(), 1);
    task.destroy();
}

#[test]
fn test_reset_timeout_applies_to_this_and_later_arms() {
    let (task, action, scheduler) = setup(ms(100));
    task.start();
    scheduler.advance(ms(50));
    task.reset_timeout(ms(30));

    assert_eq!(task.timeout(), ms(30));
    assert_eq!(scheduler.next_due(), Some(ms(80)));
    scheduler.advance(ms(30));
    assert_eq!(action.runs(), 1);
    assert_eq!(scheduler.next_due(), Some(ms(110)));
    task.destroy();
}

#[test]
fn test_reset_when_stopped_only_updates_timeout() {
    let (task, action, scheduler) = setup(ms(100));
    task.reset();
    task.reset_timeout(ms(250));
    assert_eq!(scheduler.pending(), 0);
    assert_eq!(task.timeout(), ms(250));

    task.start();
    assert_eq!(scheduler.next_due(), Some(ms(250)));
    assert_eq!(action.armed_timeouts(), vec![ms(250)]);
    task.destroy();
}

#[test]
fn test_reset_racing_fire_lets_it_run_and_rearms_with_new_timeout() {
    let (task, action, scheduler) = setup(ms(100));
    task.start();

    let fire = scheduler.begin_next_fire().unwrap();
    task.reset_timeout(ms(250));
    assert_eq!(scheduler.pending(), 0);
    assert_eq!(scheduler.stats().cancels_lost, 1);

    fire.complete();
    assert_eq!(action.runs(), 1);
    assert_eq!(scheduler.next_due(), Some(ms(350)));
    task.destroy();
}

#[test]
fn test_reset_inside_action_rearms_once() {
    let (task, action, scheduler) = setup(ms(100));
    let weak = task.downgrade();
    action.set_on_run(move |_| {
        if let Some(task) = weak.upgrade() {
            task.reset_timeout(Duration::from_millis(40));
        }
    });

    task.start();
    scheduler.advance(ms(100));
    assert_eq!(action.runs(), 1);
    assert_eq!(scheduler.pending(), 1);
    assert_eq!(scheduler.next_due(), Some(ms(140)));
    task.destroy();
}

// ═══════════════════════════════════════════════════════════════════════════
// Destroy
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_destroy_idle_finalizes_immediately() {
    let (task, action, scheduler) = setup(ms(100));
    task.destroy();
    assert!(task.is_finalized());
    assert!(task.wait_finalized(Duration::ZERO));

    task.start();
    assert_eq!(scheduler.pending(), 0);
    task.destroy();
    assert_eq!(action.finalizes(), 1);
    assert_eq!(task.describe(), "timeout(100ms) DESTROYED STOPPED");
}

#[test]
fn test_destroy_armed_cancels_and_finalizes() {
    let (task, action, scheduler) = setup(ms(100));
    task.start();
    task.destroy();

    assert_eq!(action.finalizes(), 1);
    assert_eq!(scheduler.pending(), 0);
    assert_eq!(scheduler.stats().timers_cancelled, 1);
    scheduler.advance(ms(500));
    assert_eq!(action.runs(), 0);
}

#[test]
fn test_destroy_racing_fire_finalizes_after_it() {
    let (task, action, scheduler) = setup(ms(100));
    task.start();

    let fire = scheduler.begin_next_fire().unwrap();
    task.destroy();
    assert!(!task.is_finalized());
    assert!(!task.wait_finalized(Duration::ZERO));
    let snapshot = task.snapshot();
    assert!(snapshot.destroyed && snapshot.stopped && snapshot.running);

    fire.complete();
    assert_eq!(action.runs(), 1);
    assert_eq!(action.finalizes(), 1);
    assert!(task.is_finalized());
    assert_eq!(scheduler.pending(), 0);

    scheduler.advance(ms(1000));
    assert_eq!(action.runs(), 1);
    action.assert_well_behaved();
}

#[test]
fn test_destroy_inside_action() {
    let (task, action, scheduler) = setup(ms(100));
    let weak = task.downgrade();
    action.set_on_run(move |_| {
        if let Some(task) = weak.upgrade() {
            task.destroy();
            assert!(!task.is_finalized());
        }
    });

    task.start();
    scheduler.advance(ms(100));
    assert_eq!(action.runs(), 1);
    assert_eq!(action.finalizes(), 1);
    assert_eq!(scheduler.pending(), 0);

    scheduler.advance(ms(1000));
    assert_eq!(action.runs(), 1);
    assert_eq!(task.describe(), "timeout(100ms) DESTROYED STOPPED");
    action.assert_well_behaved();
}

#[test]
fn test_destroy_twice_finalizes_once() {
    let (task, action, _scheduler) = setup(ms(100));
    task.start();
    task.destroy();
    task.destroy();
    assert_eq!(action.finalizes(), 1);
}

#[test]
fn test_start_after_destroy_pending_is_ignored() {
    let (task, action, scheduler) = setup(ms(100));
    task.start();
    let fire = scheduler.begin_next_fire().unwrap();
    task.destroy();
    task.start();
    task.reset();

    fire.complete();
    assert_eq!(scheduler.pending(), 0);
    assert_eq!(action.finalizes(), 1);
}

// ═══════════════════════════════════════════════════════════════════════════
// Initialization
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_init_refused_while_running() {
    let (task, _action, scheduler) = setup(ms(100));
    task.start();
    assert_eq!(
        task.init(ms(10)),
        Err(TimerTaskError::StillRunning("test".to_string()))
    );

    let fire = scheduler.begin_next_fire().unwrap();
    task.destroy();
    assert!(matches!(task.init(ms(10)), Err(TimerTaskError::StillRunning(_))));
    fire.complete();
}

#[test]
fn test_init_reopens_finalized_task() {
    let (task, action, scheduler) = setup(ms(100));
    task.destroy();
    assert_eq!(action.finalizes(), 1);

    task.init(ms(20)).unwrap();
    assert!(!task.is_finalized());
    assert_eq!(task.describe(), "timeout(20ms) STOPPED");

    task.start();
    assert_eq!(scheduler.next_due(), Some(ms(20)));
    task.destroy();
    assert_eq!(action.finalizes(), 2);
}

#[test]
fn test_init_from_finalizer_is_refused() {
    let (task, action, _scheduler) = setup(ms(100));
    let result = Arc::new(Mutex::new(None));

    let weak = task.downgrade();
    let sink = Arc::clone(&result);
    action.set_on_finalize(move || {
        if let Some(task) = weak.upgrade() {
            *sink.lock() = Some(task.init(Duration::from_millis(5)));
        }
    });

    task.destroy();
    assert_eq!(
        *result.lock(),
        Some(Err(TimerTaskError::FinalizePending("test".to_string())))
    );
    assert!(task.is_finalized());
}

// ═══════════════════════════════════════════════════════════════════════════
// Introspection
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_describe_counts_down() {
    let (task, _action, scheduler) = setup(ms(100));
    task.start();
    assert_eq!(task.describe(), "timeout(100ms) SCHEDULING(in 100ms)");
    scheduler.advance(ms(40));
    assert_eq!(task.describe(), "timeout(100ms) SCHEDULING(in 60ms)");
    task.destroy();
}

#[test]
fn test_describe_while_invoking() {
    let (task, action, scheduler) = setup(ms(100));
    let seen = Arc::new(Mutex::new(String::new()));

    let weak = task.downgrade();
    let sink = Arc::clone(&seen);
    action.set_on_run(move |_| {
        if let Some(task) = weak.upgrade() {
            *sink.lock() = task.describe();
            assert!(task.snapshot().remaining.is_none());
        }
    });

    task.start();
    scheduler.advance(ms(100));
    assert_eq!(*seen.lock(), "timeout(100ms) INVOKING");
    task.destroy();
}

#[test]
fn test_adjusted_interval_does_not_change_reported_timeout() {
    let action = RecordingAction::new().with_adjust(|timeout| timeout * 2);
    let (task, _action, scheduler) = setup_with(action, ms(100));
    task.start();

    assert_eq!(scheduler.next_due(), Some(ms(200)));
    assert_eq!(task.timeout(), ms(100));
    assert_eq!(task.describe(), "timeout(100ms) SCHEDULING(in 200ms)");
    task.destroy();
}

// ═══════════════════════════════════════════════════════════════════════════
// Handles and teardown
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_weak_handle_dies_with_last_strong_handle() {
    let (task, _action, scheduler) = setup(ms(100));
    let weak = task.downgrade();
    let other = task.clone();

    task.start();
    assert!(weak.upgrade().is_some());
    other.destroy();
    drop(other);
    drop(task);

    assert_eq!(scheduler.pending(), 0);
    assert!(weak.upgrade().is_none());
}

#[test]
fn test_debug_includes_name_and_state() {
    let (task, _action, _scheduler) = setup(ms(100));
    let debug = format!("{task:?}");
    assert!(debug.contains("test"));
    assert!(debug.contains("stopped: true"));
    task.destroy();
}

#[test]
#[should_panic(expected = "dropped without destroy")]
fn test_dropping_live_task_panics() {
    let (task, _action, _scheduler) = setup(ms(100));
    drop(task);
}

#[test]
#[should_panic(expected = "dropped without destroy() while still running")]
fn test_dropping_armed_task_panics() {
    let (task, _action, _scheduler) = setup(ms(10));
    task.start();
    drop(task);
}

#[test]
fn test_dropped_armed_task_stops_firing() {
    let (task, action, scheduler) = setup(ms(10));
    task.start();
    scheduler.advance(ms(10));
    assert_eq!(action.runs(), 1);

    let dropped = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || drop(task)));
    assert!(dropped.is_err());
    assert_eq!(scheduler.pending(), 0);

    scheduler.advance(ms(100));
    assert_eq!(action.runs(), 1);
    assert_eq!(action.finalizes(), 0);
}

#[test]
fn test_dropping_destroyed_task_with_fire_in_flight() {
    let (task, action, scheduler) = setup(ms(100));
    task.start();

    let fire = scheduler.begin_next_fire().unwrap();
    task.destroy();
    drop(task);

    fire.complete();
    assert_eq!(action.runs(), 1);
    assert_eq!(action.finalizes(), 1);
    assert_eq!(scheduler.pending(), 0);
    action.assert_well_behaved();
}
