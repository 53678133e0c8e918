//! Prometheus metrics backend for Metronome.
//!
//! Implements [`metronome_metrics::MetricsRecorder`] using native Prometheus
//! counters, gauges, and histograms registered in the default registry.
//!
//! # Usage
//!
//! Call [`install()`] once at startup before any metrics are recorded:
//! ```ignore
//! metronome_metrics_prometheus::install()?;
//! ```

use metronome_metrics::MetricsRecorder;
use parking_lot::Mutex;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, GaugeVec,
    HistogramVec,
};

/// Domain-specific Prometheus metrics for timer tasks.
pub struct Metrics {
    // === Lifecycle ===
    pub timers_armed: CounterVec,
    pub timers_fired: CounterVec,
    pub cancellations: CounterVec,
    pub tasks_finalized: CounterVec,
    pub action_latency: HistogramVec,

    // === Degraded paths ===
    pub register_failures: CounterVec,
    pub dispatch_fallbacks: CounterVec,

    // === Infrastructure ===
    pub dispatch_queue_depth: GaugeVec,
    pub scheduler_pending: GaugeVec,
}

impl Metrics {
    fn new() -> Result<Self, prometheus::Error> {
        let latency_buckets = vec![
            0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
        ];

        Ok(Self {
            // Lifecycle
            timers_armed: register_counter_vec!(
                "metronome_timer_armed_total",
                "Registrations armed with the timer facility",
                &["task"]
            )?,

            timers_fired: register_counter_vec!(
                "metronome_timer_fired_total",
                "Fires delivered by the timer facility",
                &["task"]
            )?,

            cancellations: register_counter_vec!(
                "metronome_timer_cancel_total",
                "Cancellation attempts by outcome",
                &["task", "outcome"]
            )?,

            tasks_finalized: register_counter_vec!(
                "metronome_task_finalized_total",
                "Tasks finalized after destruction",
                &["task"]
            )?,

            action_latency: register_histogram_vec!(
                "metronome_action_latency_seconds",
                "Duration of one run of the timer action",
                &["task"],
                latency_buckets
            )?,

            // Degraded paths
            register_failures: register_counter_vec!(
                "metronome_register_failures_total",
                "Registrations refused by the timer facility (fired immediately instead)",
                &["task"]
            )?,

            dispatch_fallbacks: register_counter_vec!(
                "metronome_dispatch_fallbacks_total",
                "Fires run inline because the worker pool refused the launch",
                &["task"]
            )?,

            // Infrastructure
            dispatch_queue_depth: register_gauge_vec!(
                "metronome_dispatch_queue_depth",
                "Launched timer fires not yet finished, per worker pool",
                &["pool"]
            )?,

            scheduler_pending: register_gauge_vec!(
                "metronome_scheduler_pending",
                "Armed registrations not yet fired or cancelled, per timer facility",
                &["scheduler"]
            )?,
        })
    }
}

/// Prometheus-backed metrics recorder.
pub struct PrometheusRecorder {
    metrics: Metrics,
}

impl PrometheusRecorder {
    fn new() -> Result<Self, prometheus::Error> {
        Ok(Self {
            metrics: Metrics::new()?,
        })
    }
}

impl MetricsRecorder for PrometheusRecorder {
    // ── Lifecycle ────────────────────────────────────────────────────

    fn record_timer_armed(&self, task: &str) {
        self.metrics.timers_armed.with_label_values(&[task]).inc();
    }

    fn record_timer_fired(&self, task: &str) {
        self.metrics.timers_fired.with_label_values(&[task]).inc();
    }

    fn record_cancel(&self, task: &str, prevented: bool) {
        let outcome = if prevented { "prevented" } else { "already_fired" };
        self.metrics
            .cancellations
            .with_label_values(&[task, outcome])
            .inc();
    }

    fn record_task_finalized(&self, task: &str) {
        self.metrics.tasks_finalized.with_label_values(&[task]).inc();
    }

    fn record_action_latency(&self, task: &str, latency_secs: f64) {
        self.metrics
            .action_latency
            .with_label_values(&[task])
            .observe(latency_secs);
    }

    // ── Degraded paths ───────────────────────────────────────────────

    fn record_register_failure(&self, task: &str) {
        self.metrics
            .register_failures
            .with_label_values(&[task])
            .inc();
    }

    fn record_dispatch_fallback(&self, task: &str) {
        self.metrics
            .dispatch_fallbacks
            .with_label_values(&[task])
            .inc();
    }

    // ── Infrastructure ───────────────────────────────────────────────

    fn set_dispatch_queue_depth(&self, pool: &str, depth: usize) {
        self.metrics
            .dispatch_queue_depth
            .with_label_values(&[pool])
            .set(depth as f64);
    }

    fn set_scheduler_pending(&self, scheduler: &str, count: usize) {
        self.metrics
            .scheduler_pending
            .with_label_values(&[scheduler])
            .set(count as f64);
    }
}

static INSTALLED: Mutex<bool> = Mutex::new(false);

/// Install the Prometheus metrics recorder as the global backend.
///
/// Idempotent, safe to call multiple times (e.g., in tests). Only the
/// first successful call creates and registers the Prometheus metrics.
pub fn install() -> Result<(), prometheus::Error> {
    let mut installed = INSTALLED.lock();
    if *installed {
        return Ok(());
    }
    metronome_metrics::set_global_recorder(Box::new(PrometheusRecorder::new()?));
    *installed = true;
    Ok(())
}

/// Gather and encode all registered Prometheus metrics as text format.
///
/// Returns `(content_type, encoded_body)` suitable for an HTTP response.
pub fn encode_metrics() -> Result<(String, Vec<u8>), String> {
    use prometheus::{Encoder, TextEncoder};
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let content_type = encoder.format_type().to_string();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| format!("{e}"))?;
    Ok((content_type, buffer))
}
