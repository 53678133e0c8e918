//! Metrics facade for Metronome.
//!
//! Provides a [`MetricsRecorder`] trait with domain-specific methods and default
//! no-op implementations. A global singleton recorder is accessed via `recorder()`,
//! and convenience free functions delegate to it.
//!
//! # Usage
//!
//! Callers record metrics via free functions:
//! ```ignore
//! metronome_metrics::record_timer_fired("election");
//! metronome_metrics::record_dispatch_fallback("election");
//! ```
//!
//! At startup, install a backend:
//! ```ignore
//! // Production:
//! metronome_metrics_prometheus::install();
//!
//! // Simulation (optional, defaults to no-op):
//! metronome_metrics_noop::install();
//! ```

use std::sync::OnceLock;

// ═══════════════════════════════════════════════════════════════════════
// Trait
// ═══════════════════════════════════════════════════════════════════════

/// Domain-specific metrics recording trait.
///
/// All methods have default no-op implementations so backends only need
/// to override the metrics they care about. `task` is the task's configured
/// name.
#[allow(unused_variables)]
pub trait MetricsRecorder: Send + Sync + 'static {
    // ── Lifecycle ────────────────────────────────────────────────────

    /// Record a registration armed with the timer facility.
    fn record_timer_armed(&self, task: &str) {}

    /// Record a fire delivered by the timer facility.
    fn record_timer_fired(&self, task: &str) {}

    /// Record a cancellation attempt and whether it prevented the fire.
    fn record_cancel(&self, task: &str, prevented: bool) {}

    /// Record a task finalized after destruction.
    fn record_task_finalized(&self, task: &str) {}

    /// Record how long one run of the user action took.
    fn record_action_latency(&self, task: &str, latency_secs: f64) {}

    // ── Degraded paths ───────────────────────────────────────────────

    /// Record a registration refused by the timer facility.
    fn record_register_failure(&self, task: &str) {}

    /// Record a fire executed inline because dispatch refused the launch.
    fn record_dispatch_fallback(&self, task: &str) {}

    // ── Infrastructure ───────────────────────────────────────────────

    /// Set the launched-but-unfinished fires gauge of one worker pool.
    fn set_dispatch_queue_depth(&self, pool: &str, depth: usize) {}

    /// Set the armed registrations gauge of one timer facility.
    fn set_scheduler_pending(&self, scheduler: &str, count: usize) {}
}

// ═══════════════════════════════════════════════════════════════════════
// Global singleton
// ═══════════════════════════════════════════════════════════════════════

struct NoopRecorder;
impl MetricsRecorder for NoopRecorder {}

static RECORDER: OnceLock<Box<dyn MetricsRecorder>> = OnceLock::new();

/// Install the global recorder. Only the first call takes effect.
pub fn set_global_recorder(recorder: Box<dyn MetricsRecorder>) {
    let _ = RECORDER.set(recorder);
}

#[inline]
fn recorder() -> &'static dyn MetricsRecorder {
    RECORDER.get().map(|r| r.as_ref()).unwrap_or(&NoopRecorder)
}

// ═══════════════════════════════════════════════════════════════════════
// Convenience free functions
// ═══════════════════════════════════════════════════════════════════════

// ── Lifecycle ────────────────────────────────────────────────────────

#[inline]
pub fn record_timer_armed(task: &str) {
    recorder().record_timer_armed(task);
}

#[inline]
pub fn record_timer_fired(task: &str) {
    recorder().record_timer_fired(task);
}

#[inline]
pub fn record_cancel(task: &str, prevented: bool) {
    recorder().record_cancel(task, prevented);
}

#[inline]
pub fn record_task_finalized(task: &str) {
    recorder().record_task_finalized(task);
}

#[inline]
pub fn record_action_latency(task: &str, latency_secs: f64) {
    recorder().record_action_latency(task, latency_secs);
}

// ── Degraded paths ───────────────────────────────────────────────────

#[inline]
pub fn record_register_failure(task: &str) {
    recorder().record_register_failure(task);
}

#[inline]
pub fn record_dispatch_fallback(task: &str) {
    recorder().record_dispatch_fallback(task);
}

// ── Infrastructure ───────────────────────────────────────────────────

#[inline]
pub fn set_dispatch_queue_depth(pool: &str, depth: usize) {
    recorder().set_dispatch_queue_depth(pool, depth);
}

#[inline]
pub fn set_scheduler_pending(scheduler: &str, count: usize) {
    recorder().set_scheduler_pending(scheduler, count);
}
