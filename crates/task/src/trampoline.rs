//! Hand-off from the scheduler's delivery thread to a dispatch worker.

use crate::task::TaskInner;
use metronome_core::{TimerAction, TimerScheduler};
use metronome_dispatch::Dispatch;
use std::sync::Arc;
use tracing::warn;

/// Deliver an elapsed registration to the task.
///
/// Runs on the scheduler's delivery thread and returns quickly: the fire is
/// launched on the task's dispatch. If the dispatch refuses, the fire runs
/// inline on the calling thread.
pub(crate) fn on_timer_elapsed<A, S, D>(task: Arc<TaskInner<A, S, D>>)
where
    A: TimerAction,
    S: TimerScheduler,
    D: Dispatch,
{
    let worker = Arc::clone(&task);
    if let Err(fire) = task.dispatch.try_spawn(move || worker.on_fire()) {
        warn!(task = %task.name, "Dispatch refused timer fire, running inline");
        metronome_metrics::record_dispatch_fallback(&task.name);
        fire();
    }
}
