//! Risk scoring sources.
//!
//! - RugCheck report summary (Solana)
//! - GoPlus token security (EVM chains)

use crate::error::{SourceError, SourceResult};
use crate::http;
use crate::parse;
use crate::source::{BoxFuture, RiskSource};
use cawatch_core::{Chain, RiskScore};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

pub const RUGCHECK_SOURCE: &str = "rugcheck";
pub const GOPLUS_SOURCE: &str = "goplus";
pub const DEFAULT_RUGCHECK_BASE_URL: &str = "https://api.rugcheck.xyz";
pub const DEFAULT_GOPLUS_BASE_URL: &str = "https://api.gopluslabs.io";

fn build_client(timeout: Duration) -> SourceResult<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| SourceError::HttpClient(format!("Failed to create HTTP client: {e}")))
}

pub struct RugCheckSource {
    client: Client,
    base_url: String,
}

impl RugCheckSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> SourceResult<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.into(),
        })
    }

    async fn fetch_report(&self, chain: Chain, address: &str) -> SourceResult<Vec<RiskScore>> {
        if !self.supports(chain) {
            return Err(SourceError::Unsupported(format!("rugcheck does not serve {chain}")));
        }
        let url = format!(
            "{}/v1/tokens/{}/report/summary",
            self.base_url.trim_end_matches('/'),
            address
        );
        let body = http::send_json(self.client.get(&url)).await?;
        parse_rugcheck(&body)
    }
}

impl RiskSource for RugCheckSource {
    fn name(&self) -> &str {
        RUGCHECK_SOURCE
    }

    fn supports(&self, chain: Chain) -> bool {
        chain == Chain::Solana
    }

    fn fetch_scores<'a>(&'a self, chain: Chain, address: &'a str) -> BoxFuture<'a, SourceResult<Vec<RiskScore>>> {
        Box::pin(self.fetch_report(chain, address))
    }
}

pub fn parse_rugcheck(body: &Value) -> SourceResult<Vec<RiskScore>> {
    let mut scores = Vec::new();
    if let Some(score) = body.get("score").and_then(parse::num) {
        scores.push(RiskScore::new("rugcheck_score", score));
    }
    if let Some(score) = body.get("score_normalised").and_then(parse::num) {
        scores.push(RiskScore::new("rugcheck_score_normalised", score));
    }
    if scores.is_empty() {
        return Err(SourceError::NotFound("rugcheck report has no score".to_string()));
    }
    Ok(scores)
}

pub struct GoPlusSource {
    client: Client,
    base_url: String,
}

impl GoPlusSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> SourceResult<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.into(),
        })
    }

    async fn fetch_security(&self, chain: Chain, address: &str) -> SourceResult<Vec<RiskScore>> {
        let chain_id = chain
            .evm_chain_id()
            .ok_or_else(|| SourceError::Unsupported(format!("goplus does not serve {chain}")))?;
        let url = format!(
            "{}/api/v1/token_security/{}",
            self.base_url.trim_end_matches('/'),
            chain_id
        );
        let request = self
            .client
            .get(&url)
            .query(&[("contract_addresses", address)]);
        let body = http::send_json(request).await?;
        parse_goplus(&body, address)
    }
}

impl RiskSource for GoPlusSource {
    fn name(&self) -> &str {
        GOPLUS_SOURCE
    }

    fn supports(&self, chain: Chain) -> bool {
        chain.is_evm()
    }

    fn fetch_scores<'a>(&'a self, chain: Chain, address: &'a str) -> BoxFuture<'a, SourceResult<Vec<RiskScore>>> {
        Box::pin(self.fetch_security(chain, address))
    }
}

/// Taxes are fractions (0.1 = 10%); honeypot is 0/1.
pub fn parse_goplus(body: &Value, address: &str) -> SourceResult<Vec<RiskScore>> {
    let code = body.get("code").and_then(Value::as_i64).unwrap_or(0);
    if code != 1 {
        let msg = body.get("message").and_then(Value::as_str).unwrap_or("unknown");
        return Err(SourceError::Unavailable(format!("goplus code {code}: {msg}")));
    }
    let result = body.get("result").and_then(Value::as_object);
    let entry = result
        .and_then(|r| {
            r.get(&address.to_ascii_lowercase())
                .or_else(|| r.get(address))
                .or_else(|| r.values().next())
        })
        .ok_or_else(|| SourceError::NotFound("goplus has no entry".to_string()))?;

    let mut scores = Vec::new();
    for (key, name) in [
        ("buy_tax", "goplus_buy_tax"),
        ("sell_tax", "goplus_sell_tax"),
        ("is_honeypot", "goplus_honeypot"),
    ] {
        if let Some(value) = entry.get(key).and_then(parse::num) {
            scores.push(RiskScore::new(name, value));
        }
    }
    if scores.is_empty() {
        return Err(SourceError::NotFound("goplus entry has no scores".to_string()));
    }
    Ok(scores)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_rugcheck() {
        let scores = parse_rugcheck(&json!({"score": 1201, "score_normalised": 12, "risks": []})).unwrap();
        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0], RiskScore::new("rugcheck_score", 1201.0));
        assert!(parse_rugcheck(&json!({"risks": []})).is_err());
    }

    #[test]
    fn test_parse_goplus() {
        let addr = "0x55d398326f99059fF775485246999027B3197955";
        let body = json!({
            "code": 1,
            "message": "OK",
            "result": {
                (addr.to_ascii_lowercase()): {"buy_tax": "0", "sell_tax": "0.05", "is_honeypot": "0"}
            }
        });
        let scores = parse_goplus(&body, addr).unwrap();
        assert_eq!(scores.len(), 3);
        assert!(scores.contains(&RiskScore::new("goplus_sell_tax", 0.05)));
        assert!(scores.contains(&RiskScore::new("goplus_honeypot", 0.0)));
    }

    #[test]
    fn test_parse_goplus_errors() {
        assert!(matches!(
            parse_goplus(&json!({"code": 4029, "message": "limit"}), "0xabc"),
            Err(SourceError::Unavailable(_))
        ));
        assert!(matches!(
            parse_goplus(&json!({"code": 1, "result": {}}), "0xabc"),
            Err(SourceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_chain_support() {
        let rug = RugCheckSource::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
        assert!(rug.supports(Chain::Solana));
        assert!(matches!(
            rug.fetch_scores(Chain::Bsc, "0xabc").await,
            Err(SourceError::Unsupported(_))
        ));
        let goplus = GoPlusSource::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
        assert!(!goplus.supports(Chain::Solana));
        assert!(matches!(
            goplus.fetch_scores(Chain::Solana, "abc").await,
            Err(SourceError::Unsupported(_))
        ));
    }
}
