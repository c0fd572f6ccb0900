//! Source contracts.
//!
//! Every upstream provider sits behind one of three capability traits:
//! - `SourceFetcher`: primary market fields, driven in priority order
//! - `ChartSource`: OHLCV series
//! - `RiskSource`: named risk scores
//!
//! `MetricsResolver` is the seam the pipeline depends on; the orchestrator
//! implements it and tests substitute fakes.

use crate::error::{FetchFailure, SourceResult};
use crate::retry::RetryPolicy;
use cawatch_core::{Chain, ChartSeries, FilterField, MarketData, RiskScore, TokenMetrics};
use std::pin::Pin;
use std::sync::Arc;

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// One fetch attempt against a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub chain: Chain,
    pub address: String,
    /// 1-based attempt number within the current resolution.
    pub attempt: u32,
}

impl FetchRequest {
    pub fn new(chain: Chain, address: impl Into<String>) -> Self {
        Self {
            chain,
            address: address.into(),
            attempt: 1,
        }
    }

    pub fn with_attempt(&self, attempt: u32) -> Self {
        Self {
            attempt,
            ..self.clone()
        }
    }
}

/// Primary market-data provider.
pub trait SourceFetcher: Send + Sync {
    /// Stable name used in logs, metrics and `TokenMetrics::sources`.
    fn name(&self) -> &str;

    fn supports(&self, chain: Chain) -> bool;

    /// Retry policy applied by the orchestrator to this source.
    fn retry_policy(&self) -> &RetryPolicy;

    /// Single attempt. Must not retry internally.
    fn fetch<'a>(&'a self, request: &'a FetchRequest) -> BoxFuture<'a, SourceResult<MarketData>>;
}

/// Requested chart span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChartSpan {
    /// Short recent series for the notification.
    Recent { minutes: u32, resolution: String },
    /// Long coarse series whose first bar approximates the first trade.
    History { days: u32, resolution: String },
}

impl ChartSpan {
    pub fn resolution(&self) -> &str {
        match self {
            Self::Recent { resolution, .. } | Self::History { resolution, .. } => resolution,
        }
    }

    /// Span length in seconds.
    pub fn seconds(&self) -> i64 {
        match self {
            Self::Recent { minutes, .. } => i64::from(*minutes) * 60,
            Self::History { days, .. } => i64::from(*days) * 86_400,
        }
    }
}

/// OHLCV provider.
pub trait ChartSource: Send + Sync {
    fn name(&self) -> &str;

    fn supports(&self, chain: Chain) -> bool;

    fn fetch_series<'a>(
        &'a self,
        chain: Chain,
        address: &'a str,
        span: &'a ChartSpan,
    ) -> BoxFuture<'a, SourceResult<ChartSeries>>;
}

/// Risk-scoring provider.
pub trait RiskSource: Send + Sync {
    fn name(&self) -> &str;

    fn supports(&self, chain: Chain) -> bool;

    fn fetch_scores<'a>(
        &'a self,
        chain: Chain,
        address: &'a str,
    ) -> BoxFuture<'a, SourceResult<Vec<RiskScore>>>;
}

/// Resolves consolidated metrics for an address.
///
/// `constrained` lists the fields the caller is about to filter on; a
/// resolver keeps consulting sources until those are present or exhausted.
pub trait MetricsResolver: Send + Sync {
    fn resolve<'a>(
        &'a self,
        chain: Chain,
        address: &'a str,
        constrained: &'a [FilterField],
    ) -> BoxFuture<'a, Result<TokenMetrics, FetchFailure>>;
}

pub type DynSource = Arc<dyn SourceFetcher>;
pub type DynChartSource = Arc<dyn ChartSource>;
pub type DynRiskSource = Arc<dyn RiskSource>;
pub type DynResolver = Arc<dyn MetricsResolver>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_request_attempt() {
        let req = FetchRequest::new(Chain::Solana, "abc");
        assert_eq!(req.attempt, 1);
        let next = req.with_attempt(3);
        assert_eq!(next.attempt, 3);
        assert_eq!(next.address, "abc");
    }

    #[test]
    fn test_chart_span_seconds() {
        let recent = ChartSpan::Recent {
            minutes: 60,
            resolution: "1m".into(),
        };
        assert_eq!(recent.seconds(), 3600);
        assert_eq!(recent.resolution(), "1m");
        let history = ChartSpan::History {
            days: 30,
            resolution: "1H".into(),
        };
        assert_eq!(history.seconds(), 30 * 86_400);
    }
}
