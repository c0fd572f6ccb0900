//! Multi-source aggregation.
//!
//! Primary fields come from an ordered waterfall of `SourceFetcher`s: each
//! source runs under its own retry policy and fills only fields still empty,
//! and the waterfall stops once the configured required fields and the
//! caller's constrained fields are all populated. The chart series, the
//! first-trade lookup and every risk source run concurrently with the
//! waterfall, each under its own timeout; their failures only degrade the
//! record.

use crate::error::{FetchFailure, SourceError};
use crate::source::{
    BoxFuture, ChartSpan, DynChartSource, DynRiskSource, DynSource, FetchRequest, MetricsResolver,
};
use cawatch_core::{Chain, ChartSeries, Clock, FilterField, MarketData, SystemClock, TokenMetrics};
use cawatch_telemetry::Metrics;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Orchestrator settings.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Fields that end the waterfall once all are populated.
    pub required_fields: Vec<FilterField>,
    /// Recent chart span; `None` disables the chart fetch.
    pub chart_span: Option<ChartSpan>,
    /// Long span for the first-trade lookup; `None` disables it.
    pub first_trade_span: Option<ChartSpan>,
    /// Timeout for each chart, first-trade and risk call.
    pub side_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            required_fields: vec![
                FilterField::MarketCapUsd,
                FilterField::LiquidityUsd,
                FilterField::Top10Ratio,
                FilterField::MaxHolderRatio,
            ],
            chart_span: Some(ChartSpan::Recent {
                minutes: 60,
                resolution: "1m".to_string(),
            }),
            first_trade_span: Some(ChartSpan::History {
                days: 30,
                resolution: "1H".to_string(),
            }),
            side_timeout: Duration::from_secs(15),
        }
    }
}

/// How one source answered within a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Answer {
    Contributed,
    NoData,
    Unreachable,
    Skipped,
}

struct Waterfall {
    market: MarketData,
    contributors: Vec<String>,
    answers: Vec<Answer>,
}

/// Drives the source waterfall and the concurrent side fetches.
pub struct AggregationOrchestrator {
    sources: Vec<DynSource>,
    chart: Option<DynChartSource>,
    risks: Vec<DynRiskSource>,
    config: OrchestratorConfig,
    clock: Arc<dyn Clock>,
}

impl AggregationOrchestrator {
    /// Sources are tried in the given order.
    pub fn new(sources: Vec<DynSource>, config: OrchestratorConfig) -> Self {
        Self {
            sources,
            chart: None,
            risks: Vec::new(),
            config,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_chart(mut self, chart: DynChartSource) -> Self {
        self.chart = Some(chart);
        self
    }

    pub fn with_risk(mut self, risk: DynRiskSource) -> Self {
        self.risks.push(risk);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Names of the primary sources in priority order.
    pub fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name().to_string()).collect()
    }

    /// Risk scores come from the risk sources, never from the waterfall.
    fn has_required(&self, market: &MarketData, extra: &[FilterField]) -> bool {
        self.config
            .required_fields
            .iter()
            .chain(extra.iter().filter(|f| !matches!(f, FilterField::RiskScore(_))))
            .all(|f| market.has_field(f))
    }

    /// Resolve consolidated metrics for one address.
    pub async fn resolve_metrics(&self, chain: Chain, address: &str) -> Result<TokenMetrics, FetchFailure> {
        self.resolve_for(chain, address, &[]).await
    }

    /// Like `resolve_metrics`, but the waterfall also continues until every
    /// field in `constrained` is populated or the sources run out.
    pub async fn resolve_for(
        &self,
        chain: Chain,
        address: &str,
        constrained: &[FilterField],
    ) -> Result<TokenMetrics, FetchFailure> {
        let started = Instant::now();
        let (waterfall, chart, first_trade, risk_scores) = tokio::join!(
            self.run_waterfall(chain, address, constrained),
            self.fetch_chart(chain, address),
            self.fetch_first_trade(chain, address),
            self.fetch_risks(chain, address),
        );

        if waterfall.contributors.is_empty() {
            let failure = classify_failure(&waterfall.answers, address);
            Metrics::resolve_outcome(failure.outcome());
            warn!(%chain, %address, error = %failure, "Resolution failed");
            return Err(failure);
        }

        let mut metrics = TokenMetrics::new(chain, address, self.clock.now());
        metrics.market = waterfall.market;
        if metrics.market.first_trade_at.is_none() {
            metrics.market.first_trade_at = first_trade;
        }
        metrics.chart = chart;
        metrics.risk_scores = risk_scores;
        metrics.sources = waterfall.contributors;

        let outcome = if self.has_required(&metrics.market, constrained) {
            "complete"
        } else {
            "partial"
        };
        Metrics::resolve_outcome(outcome);
        info!(
            %chain,
            %address,
            outcome,
            sources = ?metrics.sources,
            has_chart = metrics.chart.is_some(),
            risk_scores = metrics.risk_scores.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Resolution finished"
        );
        Ok(metrics)
    }

    async fn run_waterfall(&self, chain: Chain, address: &str, constrained: &[FilterField]) -> Waterfall {
        let mut market = MarketData::default();
        let mut contributors = Vec::new();
        let mut answers = Vec::with_capacity(self.sources.len());
        let base = FetchRequest::new(chain, address);

        for source in &self.sources {
            if !contributors.is_empty() && self.has_required(&market, constrained) {
                break;
            }
            if !source.supports(chain) {
                debug!(source = source.name(), %chain, "Source does not serve chain, skipping");
                answers.push(Answer::Skipped);
                continue;
            }

            let result = source
                .retry_policy()
                .run(source.name(), |attempt| {
                    let request = base.with_attempt(attempt);
                    async move { source.fetch(&request).await }
                })
                .await;

            match result {
                Ok(data) => {
                    let filled = market.fill_missing(data);
                    debug!(source = source.name(), %address, filled, "Source merged");
                    if filled > 0 {
                        contributors.push(source.name().to_string());
                        answers.push(Answer::Contributed);
                    } else {
                        answers.push(Answer::NoData);
                    }
                }
                Err(SourceError::NotFound(reason)) => {
                    debug!(source = source.name(), %address, %reason, "Source has no data");
                    answers.push(Answer::NoData);
                }
                Err(SourceError::Unsupported(reason)) => {
                    debug!(source = source.name(), %address, %reason, "Source unsupported");
                    answers.push(Answer::Skipped);
                }
                Err(e) => {
                    warn!(source = source.name(), %address, error = %e, "Source failed, falling back");
                    answers.push(Answer::Unreachable);
                }
            }
        }

        Waterfall {
            market,
            contributors,
            answers,
        }
    }

    async fn fetch_chart(&self, chain: Chain, address: &str) -> Option<ChartSeries> {
        let span = self.config.chart_span.as_ref()?;
        let series = self.fetch_span("chart", chain, address, span).await?;
        (!series.is_empty()).then_some(series)
    }

    async fn fetch_first_trade(&self, chain: Chain, address: &str) -> Option<DateTime<Utc>> {
        let span = self.config.first_trade_span.as_ref()?;
        self.fetch_span("first_trade", chain, address, span)
            .await?
            .first_time()
    }

    async fn fetch_span(&self, kind: &str, chain: Chain, address: &str, span: &ChartSpan) -> Option<ChartSeries> {
        let chart = self.chart.as_ref()?;
        if !chart.supports(chain) {
            return None;
        }
        let result = tokio::time::timeout(self.config.side_timeout, chart.fetch_series(chain, address, span)).await;
        match result {
            Ok(Ok(series)) => {
                Metrics::side_fetch(kind, chart.name(), "ok");
                Some(series)
            }
            Ok(Err(e)) => {
                Metrics::side_fetch(kind, chart.name(), e.outcome());
                debug!(kind, source = chart.name(), %address, error = %e, "Chart fetch failed");
                None
            }
            Err(_) => {
                Metrics::side_fetch(kind, chart.name(), "timeout");
                debug!(kind, source = chart.name(), %address, "Chart fetch timed out");
                None
            }
        }
    }

    async fn fetch_risks(&self, chain: Chain, address: &str) -> BTreeMap<String, f64> {
        let calls = self
            .risks
            .iter()
            .filter(|r| r.supports(chain))
            .map(|risk| async move {
                let result = tokio::time::timeout(self.config.side_timeout, risk.fetch_scores(chain, address)).await;
                match result {
                    Ok(Ok(scores)) => {
                        Metrics::side_fetch("risk", risk.name(), "ok");
                        scores
                    }
                    Ok(Err(e)) => {
                        Metrics::side_fetch("risk", risk.name(), e.outcome());
                        debug!(source = risk.name(), %address, error = %e, "Risk fetch failed");
                        Vec::new()
                    }
                    Err(_) => {
                        Metrics::side_fetch("risk", risk.name(), "timeout");
                        debug!(source = risk.name(), %address, "Risk fetch timed out");
                        Vec::new()
                    }
                }
            });
        join_all(calls)
            .await
            .into_iter()
            .flatten()
            .map(|score| (score.name, score.value))
            .collect()
    }
}

/// `NoDataFound` only when no source was unreachable and at least one
/// answered without data.
fn classify_failure(answers: &[Answer], address: &str) -> FetchFailure {
    let unreachable = answers.contains(&Answer::Unreachable);
    let no_data = answers.contains(&Answer::NoData);
    if no_data && !unreachable {
        FetchFailure::NoDataFound(address.to_string())
    } else {
        FetchFailure::AllSourcesUnavailable(address.to_string())
    }
}

impl MetricsResolver for AggregationOrchestrator {
    fn resolve<'a>(
        &'a self,
        chain: Chain,
        address: &'a str,
        constrained: &'a [FilterField],
    ) -> BoxFuture<'a, Result<TokenMetrics, FetchFailure>> {
        Box::pin(self.resolve_for(chain, address, constrained))
    }
}
