//! Prometheus metrics for the CA watch pipeline.
//!
//! Covers:
//! - Upstream source requests, latency and fingerprint blocks
//! - Resolution outcomes, chart and risk side fetches
//! - Filter results and failing fields
//! - Dedup hits and dispatch outcomes
//! - Scheduler fires, skips and per-task window state
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. If registration fails,
//! it indicates a fatal configuration error (e.g., duplicate metric names)
//! that should cause an immediate crash at startup rather than silent failure.
//! These panics only occur during static initialization, never at runtime.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_gauge, register_int_gauge_vec,
    CounterVec, HistogramVec, IntGauge, IntGaugeVec,
};

/// Upstream requests per source and outcome.
/// Labels: source, outcome (ok/not_found/blocked/timeout/unavailable/decode/unsupported)
pub static SOURCE_REQUESTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "cawatch_source_requests_total",
        "Total upstream source requests by outcome",
        &["source", "outcome"]
    )
    .unwrap()
});

/// Upstream request latency in milliseconds.
pub static SOURCE_LATENCY_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "cawatch_source_latency_ms",
        "Upstream source request latency in milliseconds",
        &["source"],
        vec![50.0, 100.0, 250.0, 500.0, 1000.0, 2000.0, 5000.0, 10000.0, 20000.0]
    )
    .unwrap()
});

/// Fingerprint identities put into cool-down after a block.
pub static FINGERPRINT_BLOCKED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "cawatch_fingerprint_blocked_total",
        "Total fingerprint identities blocked by an upstream",
        &["source", "identity"]
    )
    .unwrap()
});

/// Resolutions by outcome (complete/partial/no_data/unavailable).
pub static RESOLVE_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "cawatch_resolve_total",
        "Total metric resolutions by outcome",
        &["outcome"]
    )
    .unwrap()
});

/// Side fetches (chart, first trade, risk) by outcome.
pub static SIDE_FETCH_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "cawatch_side_fetch_total",
        "Total chart, first-trade and risk fetches by outcome",
        &["kind", "source", "outcome"]
    )
    .unwrap()
});

/// Filter evaluations per task and result (pass/fail/invalid).
pub static FILTER_RESULTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "cawatch_filter_results_total",
        "Total filter evaluations by result",
        &["task", "result"]
    )
    .unwrap()
});

/// Failed fields per task.
pub static FILTER_FAILED_FIELDS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "cawatch_filter_failed_fields_total",
        "Total failed filter fields",
        &["task", "field"]
    )
    .unwrap()
});

/// Dedup hits per task and stage (precheck/mark).
pub static DEDUP_HITS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "cawatch_dedup_hits_total",
        "Total work items suppressed by dedup",
        &["task", "stage"]
    )
    .unwrap()
});

/// Live dedup entries.
pub static DEDUP_ENTRIES: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("cawatch_dedup_entries", "Live dedup entries").unwrap()
});

/// Dispatch attempts by target kind and outcome.
pub static DISPATCH_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "cawatch_dispatch_total",
        "Total notification dispatch attempts",
        &["kind", "outcome"]
    )
    .unwrap()
});

/// Scheduled re-check fires per task.
pub static SCHEDULER_FIRES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "cawatch_scheduler_fires_total",
        "Total scheduled re-checks fired",
        &["task"]
    )
    .unwrap()
});

/// Scheduled re-checks skipped per task and reason.
pub static SCHEDULER_SKIPS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "cawatch_scheduler_skips_total",
        "Total scheduled re-checks skipped",
        &["task", "reason"]
    )
    .unwrap()
});

/// Window state per task (0 disabled, 1 closed, 2 open).
pub static TASK_WINDOW_STATE: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "cawatch_task_window_state",
        "Task window state (0=disabled, 1=closed, 2=open)",
        &["task"]
    )
    .unwrap()
});

/// Inbound messages by handling result.
pub static MESSAGES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "cawatch_messages_total",
        "Total inbound chat messages by handling result",
        &["result"]
    )
    .unwrap()
});

/// Pipeline runs currently executing.
pub static RUNS_INFLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("cawatch_runs_inflight", "Pipeline runs in flight").unwrap()
});

/// Pipeline run duration in milliseconds by trigger and outcome.
pub static RUN_DURATION_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "cawatch_run_duration_ms",
        "Pipeline run duration in milliseconds",
        &["trigger", "outcome"],
        vec![100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 30000.0, 60000.0, 120000.0]
    )
    .unwrap()
});

/// Metrics facade for easy access.
pub struct Metrics;

impl Metrics {
    /// Record one upstream request.
    pub fn source_request(source: &str, outcome: &str, latency_ms: f64) {
        SOURCE_REQUESTS_TOTAL
            .with_label_values(&[source, outcome])
            .inc();
        SOURCE_LATENCY_MS
            .with_label_values(&[source])
            .observe(latency_ms);
    }

    /// Record a fingerprint identity entering cool-down.
    pub fn fingerprint_blocked(source: &str, identity: &str) {
        FINGERPRINT_BLOCKED_TOTAL
            .with_label_values(&[source, identity])
            .inc();
    }

    /// Record a resolution outcome.
    pub fn resolve_outcome(outcome: &str) {
        RESOLVE_TOTAL.with_label_values(&[outcome]).inc();
    }

    /// Record a chart, first-trade or risk fetch.
    pub fn side_fetch(kind: &str, source: &str, outcome: &str) {
        SIDE_FETCH_TOTAL
            .with_label_values(&[kind, source, outcome])
            .inc();
    }

    /// Record a filter result.
    pub fn filter_result(task: &str, result: &str) {
        FILTER_RESULTS_TOTAL
            .with_label_values(&[task, result])
            .inc();
    }

    /// Record one failed filter field.
    pub fn filter_failed_field(task: &str, field: &str) {
        FILTER_FAILED_FIELDS_TOTAL
            .with_label_values(&[task, field])
            .inc();
    }

    /// Record a dedup suppression.
    pub fn dedup_hit(task: &str, stage: &str) {
        DEDUP_HITS_TOTAL.with_label_values(&[task, stage]).inc();
    }

    /// Set live dedup entry count.
    pub fn dedup_entries(count: i64) {
        DEDUP_ENTRIES.set(count);
    }

    /// Record a dispatch attempt.
    pub fn dispatch(kind: &str, outcome: &str) {
        DISPATCH_TOTAL.with_label_values(&[kind, outcome]).inc();
    }

    /// Record a scheduled re-check fire.
    pub fn scheduler_fired(task: &str) {
        SCHEDULER_FIRES_TOTAL.with_label_values(&[task]).inc();
    }

    /// Record a skipped scheduled re-check.
    pub fn scheduler_skipped(task: &str, reason: &str) {
        SCHEDULER_SKIPS_TOTAL
            .with_label_values(&[task, reason])
            .inc();
    }

    /// Set a task's window state gauge.
    pub fn task_window_state(task: &str, state: i64) {
        TASK_WINDOW_STATE.with_label_values(&[task]).set(state);
    }

    /// Drop the window state series of a removed task.
    pub fn task_removed(task: &str) {
        let _ = TASK_WINDOW_STATE.remove_label_values(&[task]);
    }

    /// Record an inbound message.
    pub fn message(result: &str) {
        MESSAGES_TOTAL.with_label_values(&[result]).inc();
    }

    pub fn run_started() {
        RUNS_INFLIGHT.inc();
    }

    /// Record a finished pipeline run.
    pub fn run_finished(trigger: &str, outcome: &str, duration_ms: f64) {
        RUNS_INFLIGHT.dec();
        RUN_DURATION_MS
            .with_label_values(&[trigger, outcome])
            .observe(duration_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_facade_updates_counters() {
        let before = SOURCE_REQUESTS_TOTAL
            .with_label_values(&["unit_source", "ok"])
            .get();
        Metrics::source_request("unit_source", "ok", 12.0);
        let after = SOURCE_REQUESTS_TOTAL
            .with_label_values(&["unit_source", "ok"])
            .get();
        assert_eq!(after - before, 1.0);
    }

    #[test]
    fn test_window_state_gauge_removed() {
        Metrics::task_window_state("unit_task", 2);
        assert_eq!(TASK_WINDOW_STATE.with_label_values(&["unit_task"]).get(), 2);
        Metrics::task_removed("unit_task");
        Metrics::task_removed("unit_task");
    }
}
