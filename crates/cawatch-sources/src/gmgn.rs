//! gmgn.ai token info and holder distribution.
//!
//! Two sources share one fingerprint pool, so a block seen by either cools
//! the identity for both.

use crate::error::{SourceError, SourceResult};
use crate::fingerprint::FingerprintPool;
use crate::parse;
use crate::retry::RetryPolicy;
use crate::source::{BoxFuture, FetchRequest, SourceFetcher};
use cawatch_core::{Chain, MarketData};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

pub const GMGN_SOURCE: &str = "gmgn";
pub const GMGN_HOLDERS_SOURCE: &str = "gmgn_holders";
pub const DEFAULT_GMGN_BASE_URL: &str = "https://gmgn.ai";

/// Headers gmgn expects from its own web front end.
pub fn gmgn_browser_headers(base_url: &str, extra: &[(String, String)]) -> Vec<(String, String)> {
    let mut headers = vec![
        ("origin".to_string(), base_url.trim_end_matches('/').to_string()),
        ("sec-fetch-dest".to_string(), "empty".to_string()),
        ("sec-fetch-mode".to_string(), "cors".to_string()),
        ("sec-fetch-site".to_string(), "same-origin".to_string()),
    ];
    headers.extend(extra.iter().cloned());
    headers
}

fn token_page(base_url: &str, chain: Chain, address: &str) -> String {
    format!("{}/{}/token/{}", base_url.trim_end_matches('/'), chain.gmgn_code(), address)
}

/// Basic token info: price, market cap, liquidity, holders, top-10, swaps.
pub struct GmgnSource {
    pool: Arc<FingerprintPool>,
    base_url: String,
    policy: RetryPolicy,
}

impl GmgnSource {
    pub fn new(pool: Arc<FingerprintPool>, base_url: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            pool,
            base_url: base_url.into(),
            policy,
        }
    }

    async fn fetch_basic(&self, request: &FetchRequest) -> SourceResult<MarketData> {
        let url = format!("{}/api/v1/mutil_window_token_info", self.base_url.trim_end_matches('/'));
        let payload = json!({
            "chain": request.chain.gmgn_code(),
            "addresses": [request.address],
        });
        let referer = format!("{}/?chain={}", self.base_url.trim_end_matches('/'), request.chain.gmgn_code());
        let body = self
            .pool
            .execute(|client| client.post(&url).header("referer", referer).json(&payload))
            .await?;
        let data = parse_basic(&body)?;
        debug!(
            source = GMGN_SOURCE,
            address = %request.address,
            symbol = ?data.symbol,
            market_cap = ?data.market_cap_usd,
            "gmgn basic info parsed"
        );
        Ok(data)
    }
}

impl SourceFetcher for GmgnSource {
    fn name(&self) -> &str {
        GMGN_SOURCE
    }

    fn supports(&self, _chain: Chain) -> bool {
        true
    }

    fn retry_policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn fetch<'a>(&'a self, request: &'a FetchRequest) -> BoxFuture<'a, SourceResult<MarketData>> {
        Box::pin(self.fetch_basic(request))
    }
}

/// Parse a `mutil_window_token_info` response.
pub fn parse_basic(body: &Value) -> SourceResult<MarketData> {
    let code = body.get("code").and_then(Value::as_i64).unwrap_or(-1);
    if code != 0 {
        let msg = body.get("msg").and_then(Value::as_str).unwrap_or("unknown");
        return Err(SourceError::Unavailable(format!("gmgn code {code}: {msg}")));
    }
    let basic = body
        .get("data")
        .and_then(Value::as_array)
        .and_then(|list| list.first())
        .ok_or_else(|| SourceError::NotFound("gmgn returned no token".to_string()))?;

    let price_obj = basic.get("price").filter(|p| p.is_object());
    let pool = basic.get("pool").filter(|p| p.is_object());

    let price_usd = match price_obj {
        Some(p) => p.get("price").and_then(parse::positive),
        None => basic.get("price").and_then(parse::positive),
    };

    let total_supply = basic.get("total_supply").and_then(parse::positive);
    let market_cap_usd = basic
        .get("market_cap")
        .and_then(parse::positive)
        .or_else(|| Some(price_usd? * total_supply?));

    let pool_created_at = [
        basic.get("open_timestamp"),
        basic.get("launch_time"),
        pool.and_then(|p| p.get("open_timestamp")),
        price_obj.and_then(|p| p.get("open_timestamp")),
    ]
    .into_iter()
    .flatten()
    .find_map(parse::timestamp);

    let pair_address = pool.and_then(|p| {
        parse::first([p.get("pair_address"), p.get("address"), p.get("pairAddress")]).and_then(parse::text)
    });

    Ok(MarketData {
        symbol: basic.get("symbol").and_then(parse::text),
        name: basic.get("name").and_then(parse::text),
        price_usd,
        price_change_5m: price_obj.and_then(|p| p.get("price_5m")).and_then(parse::num),
        market_cap_usd,
        liquidity_usd: pool.and_then(|p| p.get("liquidity")).and_then(parse::num),
        holder_count: basic.get("holder_count").and_then(parse::count),
        top10_ratio: parse::path(basic, &["dev", "top_10_holder_rate"]).and_then(parse::ratio),
        max_holder_ratio: None,
        trades_5m: price_obj.and_then(|p| p.get("swaps_5m")).and_then(parse::count),
        first_trade_at: None,
        pool_created_at,
        pair_address,
    })
}

/// Holder distribution: exact top-10 and largest-holder shares.
pub struct GmgnHoldersSource {
    pool: Arc<FingerprintPool>,
    base_url: String,
    policy: RetryPolicy,
}

impl GmgnHoldersSource {
    /// Holders requested per call.
    const LIMIT: u32 = 20;

    pub fn new(pool: Arc<FingerprintPool>, base_url: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            pool,
            base_url: base_url.into(),
            policy,
        }
    }

    async fn fetch_holders(&self, request: &FetchRequest) -> SourceResult<MarketData> {
        let url = format!(
            "{}/vas/api/v1/token_holders/{}/{}",
            self.base_url.trim_end_matches('/'),
            request.chain.gmgn_code(),
            request.address
        );
        let referer = token_page(&self.base_url, request.chain, &request.address);
        let limit = Self::LIMIT.to_string();
        let body = self
            .pool
            .execute(|client| {
                client
                    .get(&url)
                    .header("referer", referer)
                    .query(&[
                        ("orderby", "amount_percentage"),
                        ("direction", "desc"),
                        ("limit", limit.as_str()),
                    ])
            })
            .await?;
        parse_holders(&body)
    }
}

impl SourceFetcher for GmgnHoldersSource {
    fn name(&self) -> &str {
        GMGN_HOLDERS_SOURCE
    }

    fn supports(&self, _chain: Chain) -> bool {
        true
    }

    fn retry_policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn fetch<'a>(&'a self, request: &'a FetchRequest) -> BoxFuture<'a, SourceResult<MarketData>> {
        Box::pin(self.fetch_holders(request))
    }
}

/// Parse a `token_holders` response.
pub fn parse_holders(body: &Value) -> SourceResult<MarketData> {
    let list = [
        parse::path(body, &["data", "list"]),
        body.get("data").filter(|d| d.is_array()),
        body.get("list"),
    ]
    .into_iter()
    .flatten()
    .find_map(Value::as_array)
    .filter(|l| !l.is_empty())
    .ok_or_else(|| SourceError::NotFound("gmgn returned no holders".to_string()))?;

    let mut shares: Vec<f64> = list
        .iter()
        .filter_map(|h| h.get("amount_percentage").and_then(parse::ratio))
        .collect();
    if shares.is_empty() {
        return Err(SourceError::Decode("holders without amount_percentage".to_string()));
    }
    shares.sort_by(|a, b| b.total_cmp(a));

    Ok(MarketData {
        top10_ratio: Some(shares.iter().take(10).sum()),
        max_holder_ratio: shares.first().copied(),
        ..Default::default()
    })
}
