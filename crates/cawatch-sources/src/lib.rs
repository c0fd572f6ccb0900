//! Upstream data sources for token metrics.
//!
//! Provides the primary market sources (GMGN, DexScreener), chart and risk
//! providers, browser-fingerprint rotation for the GMGN endpoints, per-source
//! retry with backoff, and the aggregation orchestrator that merges them into
//! one `TokenMetrics` record.

pub mod birdeye;
pub mod dexscreener;
pub mod error;
pub mod fakes;
pub mod fingerprint;
pub mod gmgn;
pub mod http;
pub mod orchestrator;
pub mod parse;
pub mod retry;
pub mod risk;
pub mod source;

pub use birdeye::{BirdeyeChartSource, BIRDEYE_SOURCE, DEFAULT_BIRDEYE_BASE_URL};
pub use dexscreener::{DexScreenerSource, DEFAULT_DEXSCREENER_BASE_URL, DEXSCREENER_SOURCE};
pub use error::{FetchFailure, SourceError, SourceResult};
pub use fingerprint::{Fingerprint, FingerprintPool, DEFAULT_BLOCK_COOLDOWN};
pub use gmgn::{
    gmgn_browser_headers, GmgnHoldersSource, GmgnSource, DEFAULT_GMGN_BASE_URL, GMGN_HOLDERS_SOURCE,
    GMGN_SOURCE,
};
pub use orchestrator::{AggregationOrchestrator, OrchestratorConfig};
pub use retry::RetryPolicy;
pub use risk::{
    GoPlusSource, RugCheckSource, DEFAULT_GOPLUS_BASE_URL, DEFAULT_RUGCHECK_BASE_URL, GOPLUS_SOURCE,
    RUGCHECK_SOURCE,
};
pub use source::{
    BoxFuture, ChartSource, ChartSpan, DynChartSource, DynResolver, DynRiskSource, DynSource,
    FetchRequest, MetricsResolver, RiskSource, SourceFetcher,
};
