//! DexScreener token pairs.

use crate::error::{SourceError, SourceResult};
use crate::http;
use crate::parse;
use crate::retry::RetryPolicy;
use crate::source::{BoxFuture, FetchRequest, SourceFetcher};
use cawatch_core::{Chain, MarketData};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

pub const DEXSCREENER_SOURCE: &str = "dexscreener";
pub const DEFAULT_DEXSCREENER_BASE_URL: &str = "https://api.dexscreener.com";

/// Pair-based market data. Public API, no identity rotation.
pub struct DexScreenerSource {
    client: Client,
    base_url: String,
    policy: RetryPolicy,
}

impl DexScreenerSource {
    pub fn new(base_url: impl Into<String>, policy: RetryPolicy) -> SourceResult<Self> {
        let client = Client::builder()
            .timeout(policy.attempt_timeout + Duration::from_secs(1))
            .build()
            .map_err(|e| SourceError::HttpClient(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            policy,
        })
    }

    async fn fetch_pairs(&self, request: &FetchRequest) -> SourceResult<MarketData> {
        let url = format!(
            "{}/latest/dex/tokens/{}",
            self.base_url.trim_end_matches('/'),
            request.address
        );
        let body = http::send_json(self.client.get(&url)).await?;
        parse_pairs(&body, request.chain)
    }
}

impl SourceFetcher for DexScreenerSource {
    fn name(&self) -> &str {
        DEXSCREENER_SOURCE
    }

    fn supports(&self, _chain: Chain) -> bool {
        true
    }

    fn retry_policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn fetch<'a>(&'a self, request: &'a FetchRequest) -> BoxFuture<'a, SourceResult<MarketData>> {
        Box::pin(self.fetch_pairs(request))
    }
}

fn pair_liquidity(pair: &Value) -> f64 {
    parse::path(pair, &["liquidity", "usd"])
        .and_then(parse::num)
        .unwrap_or(0.0)
}

/// Pick the deepest pair on `chain` (any chain if none match) and read it.
pub fn parse_pairs(body: &Value, chain: Chain) -> SourceResult<MarketData> {
    let pairs = body
        .get("pairs")
        .and_then(Value::as_array)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| SourceError::NotFound("dexscreener returned no pairs".to_string()))?;

    let on_chain: Vec<&Value> = pairs
        .iter()
        .filter(|p| p.get("chainId").and_then(Value::as_str) == Some(chain.dexscreener_id()))
        .collect();
    let candidates: Vec<&Value> = if on_chain.is_empty() {
        pairs.iter().collect()
    } else {
        on_chain
    };
    let pair = candidates
        .into_iter()
        .max_by(|a, b| pair_liquidity(a).total_cmp(&pair_liquidity(b)))
        .ok_or_else(|| SourceError::NotFound("dexscreener returned no pairs".to_string()))?;

    let trades_5m = match (
        parse::path(pair, &["txns", "m5", "buys"]).and_then(parse::count),
        parse::path(pair, &["txns", "m5", "sells"]).and_then(parse::count),
    ) {
        (None, None) => None,
        (buys, sells) => Some(buys.unwrap_or(0) + sells.unwrap_or(0)),
    };

    Ok(MarketData {
        symbol: parse::path(pair, &["baseToken", "symbol"]).and_then(parse::text),
        name: parse::path(pair, &["baseToken", "name"]).and_then(parse::text),
        price_usd: pair.get("priceUsd").and_then(parse::positive),
        price_change_5m: parse::path(pair, &["priceChange", "m5"]).and_then(parse::num),
        market_cap_usd: pair
            .get("fdv")
            .and_then(parse::positive)
            .or_else(|| pair.get("marketCap").and_then(parse::positive)),
        liquidity_usd: parse::path(pair, &["liquidity", "usd"]).and_then(parse::num),
        holder_count: None,
        top10_ratio: None,
        max_holder_ratio: None,
        trades_5m,
        first_trade_at: None,
        pool_created_at: pair.get("pairCreatedAt").and_then(parse::timestamp),
        pair_address: pair.get("pairAddress").and_then(parse::text),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body() -> Value {
        json!({"pairs": [
            {
                "chainId": "solana",
                "pairAddress": "shallow",
                "liquidity": {"usd": 1000.0},
                "fdv": 50_000
            },
            {
                "chainId": "solana",
                "pairAddress": "deep",
                "baseToken": {"symbol": "DOG", "name": "Dog"},
                "priceUsd": "0.01",
                "priceChange": {"m5": -3.2},
                "liquidity": {"usd": 90_000.0},
                "marketCap": 1_000_000,
                "txns": {"m5": {"buys": 10, "sells": 4}},
                "pairCreatedAt": 1_700_000_000_000u64
            },
            {
                "chainId": "bsc",
                "pairAddress": "other-chain",
                "liquidity": {"usd": 5_000_000.0}
            }
        ]})
    }

    #[test]
    fn test_picks_deepest_pair_on_chain() {
        let data = parse_pairs(&body(), Chain::Solana).unwrap();
        assert_eq!(data.pair_address.as_deref(), Some("deep"));
        assert_eq!(data.market_cap_usd, Some(1_000_000.0));
        assert_eq!(data.liquidity_usd, Some(90_000.0));
        assert_eq!(data.trades_5m, Some(14));
        assert_eq!(data.symbol.as_deref(), Some("DOG"));
        assert_eq!(data.price_change_5m, Some(-3.2));
        assert_eq!(data.pool_created_at.map(|t| t.timestamp()), Some(1_700_000_000));
        assert_eq!(data.holder_count, None);
    }

    #[test]
    fn test_falls_back_to_any_chain() {
        let data = parse_pairs(&body(), Chain::Base).unwrap();
        assert_eq!(data.pair_address.as_deref(), Some("other-chain"));
        assert_eq!(data.trades_5m, None);
    }

    #[test]
    fn test_fdv_preferred_over_market_cap() {
        let body = json!({"pairs": [{"chainId": "bsc", "fdv": 10, "marketCap": 20}]});
        assert_eq!(parse_pairs(&body, Chain::Bsc).unwrap().market_cap_usd, Some(10.0));
    }

    #[test]
    fn test_no_pairs_is_not_found() {
        for body in [json!({"pairs": []}), json!({"pairs": null}), json!({})] {
            assert!(matches!(
                parse_pairs(&body, Chain::Solana),
                Err(SourceError::NotFound(_))
            ));
        }
    }
}
