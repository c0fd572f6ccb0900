//! In-memory sources for tests.

use crate::error::{FetchFailure, SourceError, SourceResult};
use crate::retry::RetryPolicy;
use crate::source::{BoxFuture, ChartSource, ChartSpan, FetchRequest, MetricsResolver, RiskSource, SourceFetcher};
use cawatch_core::{Chain, ChartSeries, FilterField, MarketData, RiskScore, TokenMetrics};
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Scripted primary source.
///
/// Returns queued responses in order, then the fallback response.
pub struct StaticSource {
    name: String,
    chains: Option<Vec<Chain>>,
    policy: RetryPolicy,
    queued: Mutex<VecDeque<SourceResult<MarketData>>>,
    fallback: SourceResult<MarketData>,
    delay: Option<Duration>,
    calls: Mutex<Vec<FetchRequest>>,
}

impl StaticSource {
    /// Source that always returns `data`.
    pub fn new(name: impl Into<String>, data: MarketData) -> Self {
        Self::with_fallback(name, Ok(data))
    }

    /// Source that always fails with `error`.
    pub fn failing(name: impl Into<String>, error: SourceError) -> Self {
        Self::with_fallback(name, Err(error))
    }

    fn with_fallback(name: impl Into<String>, fallback: SourceResult<MarketData>) -> Self {
        Self {
            name: name.into(),
            chains: None,
            policy: RetryPolicy {
                max_attempts: 1,
                attempt_timeout: Duration::from_secs(5),
                backoff_base: Duration::from_millis(10),
                backoff_max: Duration::from_millis(40),
            },
            queued: Mutex::new(VecDeque::new()),
            fallback,
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue a response returned before the fallback.
    pub fn then(self, response: SourceResult<MarketData>) -> Self {
        self.queued.lock().push_back(response);
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn only_chains(mut self, chains: Vec<Chain>) -> Self {
        self.chains = Some(chains);
        self
    }

    /// Recorded requests.
    pub fn calls(&self) -> Vec<FetchRequest> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

impl SourceFetcher for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, chain: Chain) -> bool {
        self.chains.as_ref().map_or(true, |c| c.contains(&chain))
    }

    fn retry_policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn fetch<'a>(&'a self, request: &'a FetchRequest) -> BoxFuture<'a, SourceResult<MarketData>> {
        Box::pin(async move {
            self.calls.lock().push(request.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let queued = self.queued.lock().pop_front();
            queued.unwrap_or_else(|| self.fallback.clone())
        })
    }
}

/// Chart source returning fixed results per span kind.
pub struct StaticChartSource {
    recent: SourceResult<ChartSeries>,
    history: SourceResult<ChartSeries>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl StaticChartSource {
    pub fn new(recent: SourceResult<ChartSeries>, history: SourceResult<ChartSeries>) -> Self {
        Self {
            recent,
            history,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ChartSource for StaticChartSource {
    fn name(&self) -> &str {
        "static_chart"
    }

    fn supports(&self, _chain: Chain) -> bool {
        true
    }

    fn fetch_series<'a>(
        &'a self,
        _chain: Chain,
        _address: &'a str,
        span: &'a ChartSpan,
    ) -> BoxFuture<'a, SourceResult<ChartSeries>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match span {
                ChartSpan::Recent { .. } => self.recent.clone(),
                ChartSpan::History { .. } => self.history.clone(),
            }
        })
    }
}

/// Risk source returning a fixed result.
pub struct StaticRiskSource {
    name: String,
    result: SourceResult<Vec<RiskScore>>,
    delay: Option<Duration>,
}

impl StaticRiskSource {
    pub fn new(name: impl Into<String>, result: SourceResult<Vec<RiskScore>>) -> Self {
        Self {
            name: name.into(),
            result,
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl RiskSource for StaticRiskSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, _chain: Chain) -> bool {
        true
    }

    fn fetch_scores<'a>(&'a self, _chain: Chain, _address: &'a str) -> BoxFuture<'a, SourceResult<Vec<RiskScore>>> {
        Box::pin(async move {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.result.clone()
        })
    }
}

/// Resolver keyed by address, for pipeline tests.
///
/// Unknown addresses resolve to `FetchFailure::NoDataFound`.
#[derive(Default)]
pub struct StaticResolver {
    responses: Mutex<HashMap<String, Result<MarketData, FetchFailure>>>,
    delay: Mutex<Option<Duration>>,
    calls: Mutex<Vec<(Chain, String)>>,
    constrained: Mutex<Vec<Vec<FilterField>>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, address: impl Into<String>, response: Result<MarketData, FetchFailure>) {
        self.responses.lock().insert(address.into(), response);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn calls(&self) -> Vec<(Chain, String)> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Constrained fields passed with each call.
    pub fn constrained_calls(&self) -> Vec<Vec<FilterField>> {
        self.constrained.lock().clone()
    }
}

impl MetricsResolver for StaticResolver {
    fn resolve<'a>(
        &'a self,
        chain: Chain,
        address: &'a str,
        constrained: &'a [FilterField],
    ) -> BoxFuture<'a, Result<TokenMetrics, FetchFailure>> {
        Box::pin(async move {
            self.calls.lock().push((chain, address.to_string()));
            self.constrained.lock().push(constrained.to_vec());
            let delay = *self.delay.lock();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let response = self
                .responses
                .lock()
                .get(address)
                .cloned()
                .unwrap_or_else(|| Err(FetchFailure::NoDataFound(address.to_string())));
            response.map(|market| {
                let mut metrics = TokenMetrics::new(chain, address, Utc::now());
                metrics.market = market;
                metrics.sources.push("static".to_string());
                metrics
            })
        })
    }
}
