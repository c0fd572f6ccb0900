//! Birdeye OHLCV chart source (Solana).

use crate::error::{SourceError, SourceResult};
use crate::http;
use crate::parse;
use crate::source::{BoxFuture, ChartSource, ChartSpan};
use cawatch_core::{Chain, ChartSeries, OhlcvBar};
use chrono::Utc;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

pub const BIRDEYE_SOURCE: &str = "birdeye";
pub const DEFAULT_BIRDEYE_BASE_URL: &str = "https://public-api.birdeye.so";

pub struct BirdeyeChartSource {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl BirdeyeChartSource {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        request_timeout: Duration,
    ) -> SourceResult<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| SourceError::HttpClient(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    async fn fetch_ohlcv(&self, chain: Chain, address: &str, span: &ChartSpan) -> SourceResult<ChartSeries> {
        if !self.supports(chain) {
            return Err(SourceError::Unsupported(format!("birdeye does not serve {chain}")));
        }
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| SourceError::Unsupported("birdeye api key not configured".to_string()))?;

        let time_to = Utc::now().timestamp();
        let time_from = time_to - span.seconds();
        let url = format!("{}/defi/ohlcv", self.base_url.trim_end_matches('/'));
        let request = self
            .client
            .get(&url)
            .header("accept", "application/json")
            .header("x-chain", "solana")
            .header("X-API-KEY", api_key)
            .query(&[
                ("address", address.to_string()),
                ("type", span.resolution().to_string()),
                ("time_from", time_from.to_string()),
                ("time_to", time_to.to_string()),
            ]);
        let body = http::send_json(request).await?;
        let series = parse_ohlcv(&body, span.resolution())?;
        debug!(
            source = BIRDEYE_SOURCE,
            %address,
            bars = series.bars.len(),
            "Birdeye OHLCV fetched"
        );
        Ok(series)
    }
}

impl ChartSource for BirdeyeChartSource {
    fn name(&self) -> &str {
        BIRDEYE_SOURCE
    }

    fn supports(&self, chain: Chain) -> bool {
        chain == Chain::Solana
    }

    fn fetch_series<'a>(
        &'a self,
        chain: Chain,
        address: &'a str,
        span: &'a ChartSpan,
    ) -> BoxFuture<'a, SourceResult<ChartSeries>> {
        Box::pin(self.fetch_ohlcv(chain, address, span))
    }
}

fn bar_field<'a>(item: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    parse::first(keys.iter().map(|k| item.get(*k)))
}

fn parse_bar(item: &Value) -> Option<OhlcvBar> {
    Some(OhlcvBar {
        time: bar_field(item, &["unixTime", "t", "time", "timestamp"]).and_then(parse::timestamp)?,
        open: bar_field(item, &["o", "open"]).and_then(parse::num)?,
        high: bar_field(item, &["h", "high"]).and_then(parse::num)?,
        low: bar_field(item, &["l", "low"]).and_then(parse::num)?,
        close: bar_field(item, &["c", "close"]).and_then(parse::num)?,
        volume: bar_field(item, &["v", "volume"]).and_then(parse::num).unwrap_or(0.0),
    })
}

/// Parse an OHLCV response, skipping malformed bars.
pub fn parse_ohlcv(body: &Value, resolution: &str) -> SourceResult<ChartSeries> {
    if body.get("success").and_then(Value::as_bool) != Some(true) {
        let msg = body.get("message").and_then(Value::as_str).unwrap_or("unknown error");
        return Err(SourceError::Unavailable(format!("birdeye success=false: {msg}")));
    }
    let data = body.get("data");
    let items = data
        .and_then(Value::as_array)
        .or_else(|| {
            let d = data?;
            parse::first([d.get("items"), d.get("data"), d.get("ohlcv_list")])?.as_array()
        })
        .filter(|items| !items.is_empty())
        .ok_or_else(|| SourceError::NotFound("birdeye returned no items".to_string()))?;

    let bars: Vec<OhlcvBar> = items.iter().filter_map(parse_bar).collect();
    if bars.is_empty() {
        return Err(SourceError::NotFound("birdeye returned no valid bars".to_string()));
    }
    Ok(ChartSeries::new(resolution, bars))
}
