//! Prometheus metrics and structured logging for the CA watch pipeline.
//!
//! - Structured logging with tracing (JSON in production)
//! - Prometheus metrics behind the `Metrics` facade
//! - Optional `/metrics` + `/healthz` exporter
//! - Periodic per-source statistics summary

pub mod error;
pub mod exporter;
pub mod logging;
pub mod metrics;
pub mod source_stats;

pub use error::{TelemetryError, TelemetryResult};
pub use exporter::{render_metrics, serve_metrics};
pub use logging::init_logging;
pub use metrics::Metrics;
pub use source_stats::{SourceStats, SourceStatsReporter};
