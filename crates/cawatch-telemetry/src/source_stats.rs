//! Periodic per-source statistics summary.
//!
//! Reads the process metrics registry and logs, per upstream source:
//! - request counts by outcome and success rate
//! - latency distribution (P50/P95/P99)

use crate::metrics::{SOURCE_LATENCY_MS, SOURCE_REQUESTS_TOTAL};
use chrono::{DateTime, Utc};
use prometheus::core::Collector;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

/// Outcome labels recorded for source requests.
pub const SOURCE_OUTCOMES: [&str; 7] = [
    "ok",
    "not_found",
    "blocked",
    "timeout",
    "unavailable",
    "decode",
    "unsupported",
];

/// Statistics for one source.
#[derive(Debug, Clone, Serialize)]
pub struct SourceStats {
    pub source: String,
    pub requests: u64,
    pub ok: u64,
    pub blocked: u64,
    pub timeout: u64,
    pub success_rate: f64,
    pub latency_p50_ms: f64,
    pub latency_p95_ms: f64,
    pub latency_p99_ms: f64,
}

/// Per-source statistics reporter.
pub struct SourceStatsReporter {
    sources: Vec<String>,
    start_time: DateTime<Utc>,
}

impl SourceStatsReporter {
    pub fn new(sources: Vec<String>) -> Self {
        Self {
            sources,
            start_time: Utc::now(),
        }
    }

    /// Current statistics for all sources.
    pub fn get_stats(&self) -> Vec<SourceStats> {
        self.sources
            .iter()
            .map(|source| self.get_source_stats(source))
            .collect()
    }

    fn get_source_stats(&self, source: &str) -> SourceStats {
        let by_outcome: BTreeMap<&str, u64> = SOURCE_OUTCOMES
            .iter()
            .map(|outcome| (*outcome, self.get_counter_value(&[source, outcome])))
            .collect();
        let requests: u64 = by_outcome.values().sum();
        let ok = by_outcome.get("ok").copied().unwrap_or(0);
        let success_rate = if requests > 0 {
            ok as f64 / requests as f64
        } else {
            0.0
        };

        let (latency_p50_ms, latency_p95_ms, latency_p99_ms) =
            get_histogram_percentiles(&SOURCE_LATENCY_MS, &[source]);

        SourceStats {
            source: source.to_string(),
            requests,
            ok,
            blocked: by_outcome.get("blocked").copied().unwrap_or(0),
            timeout: by_outcome.get("timeout").copied().unwrap_or(0),
            success_rate,
            latency_p50_ms,
            latency_p95_ms,
            latency_p99_ms,
        }
    }

    fn get_counter_value(&self, labels: &[&str]) -> u64 {
        SOURCE_REQUESTS_TOTAL.with_label_values(labels).get() as u64
    }

    /// Log the summary.
    pub fn output_summary(&self) {
        let stats = self.get_stats();
        let duration = Utc::now() - self.start_time;

        info!(
            since = %self.start_time.format("%Y-%m-%d %H:%M:%S UTC"),
            hours = duration.num_hours(),
            minutes = duration.num_minutes() % 60,
            "Source statistics summary"
        );

        for s in &stats {
            info!(
                source = %s.source,
                requests = s.requests,
                ok = s.ok,
                blocked = s.blocked,
                timeout = s.timeout,
                success_rate = format!("{:.2}%", s.success_rate * 100.0),
                p50_ms = format!("{:.1}", s.latency_p50_ms),
                p95_ms = format!("{:.1}", s.latency_p95_ms),
                p99_ms = format!("{:.1}", s.latency_p99_ms),
                "Source stats"
            );
        }
    }
}

/// Percentiles (p50, p95, p99) from a histogram series.
fn get_histogram_percentiles(histogram: &prometheus::HistogramVec, labels: &[&str]) -> (f64, f64, f64) {
    for mf in histogram.collect() {
        for m in mf.get_metric() {
            let label_pairs = m.get_label();
            if label_pairs.len() != labels.len()
                || label_pairs
                    .iter()
                    .zip(labels)
                    .any(|(pair, want)| pair.get_value() != *want)
            {
                continue;
            }

            let h = m.get_histogram();
            let count = h.get_sample_count();
            if count == 0 {
                return (0.0, 0.0, 0.0);
            }

            let buckets = h.get_bucket();
            return (
                percentile_from_buckets(buckets, count, 0.50),
                percentile_from_buckets(buckets, count, 0.95),
                percentile_from_buckets(buckets, count, 0.99),
            );
        }
    }
    (0.0, 0.0, 0.0)
}

/// Percentile from cumulative buckets with linear interpolation.
fn percentile_from_buckets(buckets: &[prometheus::proto::Bucket], total_count: u64, percentile: f64) -> f64 {
    let target = (total_count as f64 * percentile).ceil() as u64;
    let mut prev_bound = 0.0;
    let mut prev_count = 0u64;

    for bucket in buckets {
        let upper_bound = bucket.get_upper_bound();
        let cumulative_count = bucket.get_cumulative_count();

        if cumulative_count >= target {
            let bucket_count = cumulative_count - prev_count;
            if bucket_count == 0 {
                return upper_bound;
            }
            let position = (target - prev_count) as f64 / bucket_count as f64;
            return prev_bound + position * (upper_bound - prev_bound);
        }

        prev_bound = upper_bound;
        prev_count = cumulative_count;
    }

    buckets.last().map(|b| b.get_upper_bound()).unwrap_or(0.0)
}
