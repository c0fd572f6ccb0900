//! Per-task filter configuration.
//!
//! A `FilterConfig` maps a field to an optional `[min, max]` range. A field
//! without an entry is not checked; a range with neither bound is ignored.

use crate::{CoreError, CoreResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

const RISK_PREFIX: &str = "risk:";

/// A filterable metrics field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FilterField {
    MarketCapUsd,
    LiquidityUsd,
    /// Minutes since first trade (or pool creation).
    OpenMinutes,
    /// Top-10 holder share in [0, 1].
    Top10Ratio,
    HolderCount,
    /// Largest single holder share in [0, 1].
    MaxHolderRatio,
    Trades5m,
    /// Named risk score, written `risk:<name>`.
    RiskScore(String),
}

impl FilterField {
    /// All fixed (non risk-score) fields.
    pub const FIXED: [FilterField; 7] = [
        Self::MarketCapUsd,
        Self::LiquidityUsd,
        Self::OpenMinutes,
        Self::Top10Ratio,
        Self::HolderCount,
        Self::MaxHolderRatio,
        Self::Trades5m,
    ];

    /// Whether values of this field are ratios in [0, 1].
    pub fn is_ratio(&self) -> bool {
        matches!(self, Self::Top10Ratio | Self::MaxHolderRatio)
    }
}

impl fmt::Display for FilterField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MarketCapUsd => write!(f, "market_cap_usd"),
            Self::LiquidityUsd => write!(f, "liquidity_usd"),
            Self::OpenMinutes => write!(f, "open_minutes"),
            Self::Top10Ratio => write!(f, "top10_ratio"),
            Self::HolderCount => write!(f, "holder_count"),
            Self::MaxHolderRatio => write!(f, "max_holder_ratio"),
            Self::Trades5m => write!(f, "trades_5m"),
            Self::RiskScore(name) => write!(f, "{RISK_PREFIX}{name}"),
        }
    }
}

impl FromStr for FilterField {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(name) = s.strip_prefix(RISK_PREFIX) {
            if name.is_empty() {
                return Err(CoreError::UnknownFilterField(s.to_string()));
            }
            return Ok(Self::RiskScore(name.to_string()));
        }
        Self::FIXED
            .iter()
            .find(|f| f.to_string() == s)
            .cloned()
            .ok_or_else(|| CoreError::UnknownFilterField(s.to_string()))
    }
}

impl Serialize for FilterField {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FilterField {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Inclusive range; a missing bound is unconstrained on that side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl FilterRange {
    pub fn new(min: Option<f64>, max: Option<f64>) -> Self {
        Self { min, max }
    }

    pub fn between(min: f64, max: f64) -> Self {
        Self::new(Some(min), Some(max))
    }

    pub fn at_least(min: f64) -> Self {
        Self::new(Some(min), None)
    }

    pub fn at_most(max: f64) -> Self {
        Self::new(None, Some(max))
    }

    /// At least one bound is set.
    pub fn is_set(&self) -> bool {
        self.min.is_some() || self.max.is_some()
    }

    fn check(&self, field: &FilterField) -> CoreResult<()> {
        let invalid = |reason: String| CoreError::InvalidFilterConfig {
            field: field.to_string(),
            reason,
        };
        for bound in [self.min, self.max].into_iter().flatten() {
            if !bound.is_finite() {
                return Err(invalid(format!("bound {bound} is not finite")));
            }
        }
        if let (Some(min), Some(max)) = (self.min, self.max) {
            if min > max {
                return Err(invalid(format!("min {min} > max {max}")));
            }
        }
        Ok(())
    }
}

/// Field → range mapping for one task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterConfig {
    ranges: BTreeMap<FilterField, FilterRange>,
}

impl FilterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, field: FilterField, range: FilterRange) -> Self {
        self.ranges.insert(field, range);
        self
    }

    pub fn set(&mut self, field: FilterField, range: FilterRange) {
        self.ranges.insert(field, range);
    }

    pub fn remove(&mut self, field: &FilterField) -> Option<FilterRange> {
        self.ranges.remove(field)
    }

    pub fn get(&self, field: &FilterField) -> Option<&FilterRange> {
        self.ranges.get(field)
    }

    /// Entries with at least one bound set.
    pub fn constrained(&self) -> impl Iterator<Item = (&FilterField, &FilterRange)> {
        self.ranges.iter().filter(|(_, r)| r.is_set())
    }

    pub fn is_empty(&self) -> bool {
        self.constrained().next().is_none()
    }

    /// Reject ranges with `min > max` or non-finite bounds.
    pub fn validate(&self) -> CoreResult<()> {
        for (field, range) in &self.ranges {
            range.check(field)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_round_trip_names() {
        for field in FilterField::FIXED {
            let parsed: FilterField = field.to_string().parse().unwrap();
            assert_eq!(parsed, field);
        }
        let risk: FilterField = "risk:rugcheck_score".parse().unwrap();
        assert_eq!(risk, FilterField::RiskScore("rugcheck_score".into()));
        assert!("risk:".parse::<FilterField>().is_err());
        assert!("volume_24h".parse::<FilterField>().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_range() {
        let cfg = FilterConfig::new().with(FilterField::MarketCapUsd, FilterRange::between(10.0, 5.0));
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, CoreError::InvalidFilterConfig { ref field, .. } if field == "market_cap_usd"));
    }

    #[test]
    fn test_validate_rejects_nan() {
        let cfg = FilterConfig::new().with(FilterField::Top10Ratio, FilterRange::at_most(f64::NAN));
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_equal_bounds_and_open_sides() {
        let cfg = FilterConfig::new()
            .with(FilterField::HolderCount, FilterRange::between(100.0, 100.0))
            .with(FilterField::Trades5m, FilterRange::at_least(3.0))
            .with(FilterField::LiquidityUsd, FilterRange::default());
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.constrained().count(), 2);
    }

    #[test]
    fn test_empty_when_no_bounds() {
        let cfg = FilterConfig::new().with(FilterField::MarketCapUsd, FilterRange::default());
        assert!(cfg.is_empty());
    }

    #[test]
    fn test_toml_shape() {
        let text = r#"
            market_cap_usd = { min = 5000.0, max = 1000000.0 }
            top10_ratio = { max = 0.3 }
            "risk:goplus_sell_tax" = { max = 0.1 }
        "#;
        let cfg: FilterConfig = toml::from_str(text).unwrap();
        assert_eq!(
            cfg.get(&FilterField::MarketCapUsd),
            Some(&FilterRange::between(5000.0, 1_000_000.0))
        );
        assert_eq!(cfg.get(&FilterField::Top10Ratio), Some(&FilterRange::at_most(0.3)));
        assert!(cfg
            .get(&FilterField::RiskScore("goplus_sell_tax".into()))
            .is_some());
    }
}
