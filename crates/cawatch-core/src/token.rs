//! Token data records.
//!
//! `MarketData` is what a single upstream source returns: every field optional.
//! `TokenMetrics` is the consolidated record handed to the filter engine and
//! the dispatcher. Missing values stay `None`; they are never zero-filled.

use crate::{Chain, FilterField};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Partial market data from one source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketData {
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub price_usd: Option<f64>,
    /// Price change over 5 minutes, in percent.
    pub price_change_5m: Option<f64>,
    pub market_cap_usd: Option<f64>,
    pub liquidity_usd: Option<f64>,
    pub holder_count: Option<u64>,
    /// Share of supply held by the top 10 holders, in [0, 1].
    pub top10_ratio: Option<f64>,
    /// Share of supply held by the largest single holder, in [0, 1].
    pub max_holder_ratio: Option<f64>,
    pub trades_5m: Option<u64>,
    pub first_trade_at: Option<DateTime<Utc>>,
    pub pool_created_at: Option<DateTime<Utc>>,
    pub pair_address: Option<String>,
}

macro_rules! fill {
    ($dst:ident, $src:ident, $filled:ident, $($field:ident),+ $(,)?) => {
        $(
            if $dst.$field.is_none() && $src.$field.is_some() {
                $dst.$field = $src.$field;
                $filled += 1;
            }
        )+
    };
}

impl MarketData {
    /// Copy every field that is still empty here from `other`.
    ///
    /// Fields already populated are kept (earlier sources have priority).
    /// Returns the number of fields filled.
    pub fn fill_missing(&mut self, other: MarketData) -> usize {
        let mut filled = 0;
        fill!(
            self,
            other,
            filled,
            symbol,
            name,
            price_usd,
            price_change_5m,
            market_cap_usd,
            liquidity_usd,
            holder_count,
            top10_ratio,
            max_holder_ratio,
            trades_5m,
            first_trade_at,
            pool_created_at,
            pair_address,
        );
        filled
    }

    /// Whether the numeric value behind a filter field is present.
    pub fn has_field(&self, field: &FilterField) -> bool {
        match field {
            FilterField::MarketCapUsd => self.market_cap_usd.is_some(),
            FilterField::LiquidityUsd => self.liquidity_usd.is_some(),
            FilterField::OpenMinutes => {
                self.first_trade_at.is_some() || self.pool_created_at.is_some()
            }
            FilterField::Top10Ratio => self.top10_ratio.is_some(),
            FilterField::HolderCount => self.holder_count.is_some(),
            FilterField::MaxHolderRatio => self.max_holder_ratio.is_some(),
            FilterField::Trades5m => self.trades_5m.is_some(),
            FilterField::RiskScore(_) => false,
        }
    }

    /// Earliest known activity: first trade, else pool creation.
    pub fn launched_at(&self) -> Option<DateTime<Utc>> {
        self.first_trade_at.or(self.pool_created_at)
    }
}

/// One OHLCV bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OhlcvBar {
    pub time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Time-ordered OHLCV series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSeries {
    /// Bar resolution label, e.g. `1m`.
    pub resolution: String,
    pub bars: Vec<OhlcvBar>,
}

impl ChartSeries {
    /// Build a series, sorting bars by time.
    pub fn new(resolution: impl Into<String>, mut bars: Vec<OhlcvBar>) -> Self {
        bars.sort_by_key(|b| b.time);
        Self {
            resolution: resolution.into(),
            bars,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn first_time(&self) -> Option<DateTime<Utc>> {
        self.bars.first().map(|b| b.time)
    }

    pub fn first_open(&self) -> Option<f64> {
        self.bars.first().map(|b| b.open)
    }

    pub fn last_close(&self) -> Option<f64> {
        self.bars.last().map(|b| b.close)
    }

    pub fn high(&self) -> Option<f64> {
        self.bars.iter().map(|b| b.high).reduce(f64::max)
    }

    pub fn low(&self) -> Option<f64> {
        self.bars.iter().map(|b| b.low).reduce(f64::min)
    }
}

/// A single named risk score from a scoring source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskScore {
    pub name: String,
    pub value: f64,
}

impl RiskScore {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Consolidated metrics for one (chain, address).
///
/// Built once per resolution and not mutated after it reaches the filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenMetrics {
    pub chain: Chain,
    pub address: String,
    pub market: MarketData,
    pub risk_scores: BTreeMap<String, f64>,
    pub chart: Option<ChartSeries>,
    /// Sources that contributed at least one field, in priority order.
    pub sources: Vec<String>,
    pub fetched_at: DateTime<Utc>,
}

impl TokenMetrics {
    pub fn new(chain: Chain, address: impl Into<String>, fetched_at: DateTime<Utc>) -> Self {
        Self {
            chain,
            address: address.into(),
            market: MarketData::default(),
            risk_scores: BTreeMap::new(),
            chart: None,
            sources: Vec::new(),
            fetched_at,
        }
    }

    /// Minutes since first trade, falling back to pool creation.
    ///
    /// First-trade time takes precedence whenever both are known.
    pub fn open_minutes(&self, now: DateTime<Utc>) -> Option<f64> {
        let launched = self.market.launched_at()?;
        let secs = (now - launched).num_seconds();
        Some(secs.max(0) as f64 / 60.0)
    }

    /// Numeric value of a filter field, or `None` if not known.
    pub fn value_of(&self, field: &FilterField, now: DateTime<Utc>) -> Option<f64> {
        let m = &self.market;
        match field {
            FilterField::MarketCapUsd => m.market_cap_usd,
            FilterField::LiquidityUsd => m.liquidity_usd,
            FilterField::OpenMinutes => self.open_minutes(now),
            FilterField::Top10Ratio => m.top10_ratio,
            FilterField::HolderCount => m.holder_count.map(|v| v as f64),
            FilterField::MaxHolderRatio => m.max_holder_ratio,
            FilterField::Trades5m => m.trades_5m.map(|v| v as f64),
            FilterField::RiskScore(name) => self.risk_scores.get(name).copied(),
        }
    }

    /// Display label: symbol, else name, else a shortened address.
    pub fn label(&self) -> String {
        if let Some(symbol) = self.market.symbol.as_deref().filter(|s| !s.is_empty()) {
            return symbol.to_string();
        }
        if let Some(name) = self.market.name.as_deref().filter(|s| !s.is_empty()) {
            return name.to_string();
        }
        let head: String = self.address.chars().take(6).collect();
        format!("{head}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, h, m, 0).unwrap()
    }

    #[test]
    fn test_fill_missing_first_non_null_wins() {
        let mut a = MarketData {
            market_cap_usd: Some(100.0),
            ..Default::default()
        };
        let b = MarketData {
            market_cap_usd: Some(999.0),
            liquidity_usd: Some(50.0),
            ..Default::default()
        };
        let filled = a.fill_missing(b);
        assert_eq!(filled, 1);
        assert_eq!(a.market_cap_usd, Some(100.0));
        assert_eq!(a.liquidity_usd, Some(50.0));
        assert_eq!(a.holder_count, None);
    }

    #[test]
    fn test_open_minutes_prefers_first_trade() {
        let mut metrics = TokenMetrics::new(Chain::Solana, "addr", at(12, 0));
        metrics.market.pool_created_at = Some(at(10, 0));
        assert_eq!(metrics.open_minutes(at(12, 0)), Some(120.0));

        metrics.market.first_trade_at = Some(at(11, 30));
        assert_eq!(metrics.open_minutes(at(12, 0)), Some(30.0));
    }

    #[test]
    fn test_open_minutes_absent() {
        let metrics = TokenMetrics::new(Chain::Solana, "addr", at(12, 0));
        assert_eq!(metrics.value_of(&FilterField::OpenMinutes, at(12, 0)), None);
    }

    #[test]
    fn test_open_minutes_clamped_for_future_timestamp() {
        let mut metrics = TokenMetrics::new(Chain::Solana, "addr", at(12, 0));
        metrics.market.pool_created_at = Some(at(12, 0) + Duration::minutes(5));
        assert_eq!(metrics.open_minutes(at(12, 0)), Some(0.0));
    }

    #[test]
    fn test_value_of_risk_score() {
        let mut metrics = TokenMetrics::new(Chain::Bsc, "0xabc", at(12, 0));
        metrics.risk_scores.insert("goplus_sell_tax".into(), 0.05);
        let field = FilterField::RiskScore("goplus_sell_tax".into());
        assert_eq!(metrics.value_of(&field, at(12, 0)), Some(0.05));
        let missing = FilterField::RiskScore("rugcheck_score".into());
        assert_eq!(metrics.value_of(&missing, at(12, 0)), None);
    }

    #[test]
    fn test_chart_series_sorted_and_summary() {
        let bar = |m: u32, o: f64, h: f64, l: f64, c: f64| OhlcvBar {
            time: at(10, m),
            open: o,
            high: h,
            low: l,
            close: c,
            volume: 1.0,
        };
        let series = ChartSeries::new("1m", vec![bar(2, 3.0, 4.0, 2.5, 3.5), bar(1, 1.0, 3.2, 0.9, 3.0)]);
        assert_eq!(series.first_time(), Some(at(10, 1)));
        assert_eq!(series.first_open(), Some(1.0));
        assert_eq!(series.last_close(), Some(3.5));
        assert_eq!(series.high(), Some(4.0));
        assert_eq!(series.low(), Some(0.9));
    }

    #[test]
    fn test_label_fallbacks() {
        let mut metrics = TokenMetrics::new(Chain::Solana, "So11111111111111111111111111111111111111112", at(0, 0));
        assert_eq!(metrics.label(), "So1111…");
        metrics.market.name = Some("Wrapped SOL".into());
        assert_eq!(metrics.label(), "Wrapped SOL");
        metrics.market.symbol = Some("SOL".into());
        assert_eq!(metrics.label(), "SOL");
    }
}
