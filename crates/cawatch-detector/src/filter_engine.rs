//! Filter evaluation.
//!
//! Every constrained field is checked. A missing value fails its field: the
//! absence of evidence is never treated as a pass.

use crate::outcome::{FailureReason, FieldFailure, FilterOutcome};
use crate::DetectorResult;
use cawatch_core::{FilterConfig, TokenMetrics};
use chrono::{DateTime, Utc};
use tracing::trace;

/// Stateless filter evaluator.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterEngine;

impl FilterEngine {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate against the current time.
    pub fn evaluate(
        &self,
        metrics: &TokenMetrics,
        config: &FilterConfig,
    ) -> DetectorResult<FilterOutcome> {
        self.evaluate_at(metrics, config, Utc::now())
    }

    /// Evaluate with an explicit `now` for time-derived fields.
    ///
    /// An invalid configuration is rejected, never evaluated.
    pub fn evaluate_at(
        &self,
        metrics: &TokenMetrics,
        config: &FilterConfig,
        now: DateTime<Utc>,
    ) -> DetectorResult<FilterOutcome> {
        config.validate()?;

        let mut failures = Vec::new();
        for (field, range) in config.constrained() {
            let reason = match metrics.value_of(field, now) {
                None => Some(FailureReason::Missing),
                Some(value) => match (range.min, range.max) {
                    (Some(min), _) if value < min || value.is_nan() => {
                        Some(FailureReason::BelowMin { value, min })
                    }
                    (_, Some(max)) if value > max || value.is_nan() => {
                        Some(FailureReason::AboveMax { value, max })
                    }
                    _ => None,
                },
            };
            if let Some(reason) = reason {
                trace!(address = %metrics.address, %field, %reason, "Filter field failed");
                failures.push(FieldFailure {
                    field: field.clone(),
                    reason,
                });
            }
        }
        Ok(FilterOutcome::from_failures(failures))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DetectorError;
    use cawatch_core::{Chain, FilterField, FilterRange};
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 2, 0, 0).unwrap()
    }

    fn metrics() -> TokenMetrics {
        let mut m = TokenMetrics::new(Chain::Solana, "7GCihgDB8fe6KNjn2MYtkzZcRjQy3t9GHdC8uHYmW2hr", now());
        m.market.market_cap_usd = Some(200_000.0);
        m.market.liquidity_usd = Some(30_000.0);
        m.market.holder_count = Some(420);
        m.market.top10_ratio = Some(0.25);
        m.market.trades_5m = Some(80);
        m.market.pool_created_at = Some(now() - Duration::minutes(45));
        m
    }

    #[test]
    fn test_empty_config_always_passes() {
        let engine = FilterEngine::new();
        let outcome = engine.evaluate_at(&metrics(), &FilterConfig::new(), now()).unwrap();
        assert!(outcome.passed);

        let bare = TokenMetrics::new(Chain::Bsc, "0xabc", now());
        let cfg = FilterConfig::new().with(FilterField::MarketCapUsd, FilterRange::default());
        assert!(engine.evaluate_at(&bare, &cfg, now()).unwrap().passed);
    }

    #[test]
    fn test_missing_field_fails_regardless_of_bounds() {
        let engine = FilterEngine::new();
        for range in [
            FilterRange::at_least(0.0),
            FilterRange::at_most(1.0),
            FilterRange::between(f64::MIN, f64::MAX),
        ] {
            let cfg = FilterConfig::new().with(FilterField::MaxHolderRatio, range);
            let outcome = engine.evaluate_at(&metrics(), &cfg, now()).unwrap();
            assert!(!outcome.passed);
            assert!(outcome.failed_fields().contains("max_holder_ratio"));
            assert_eq!(outcome.failures[0].reason, FailureReason::Missing);
        }
    }

    #[test]
    fn test_inclusive_bounds() {
        let cfg = FilterConfig::new()
            .with(FilterField::MarketCapUsd, FilterRange::between(200_000.0, 200_000.0))
            .with(FilterField::HolderCount, FilterRange::at_least(420.0));
        assert!(FilterEngine::new().evaluate_at(&metrics(), &cfg, now()).unwrap().passed);
    }

    #[test]
    fn test_reports_every_failing_field() {
        let cfg = FilterConfig::new()
            .with(FilterField::MarketCapUsd, FilterRange::between(5_000.0, 100_000.0))
            .with(FilterField::Top10Ratio, FilterRange::at_most(0.2))
            .with(FilterField::Trades5m, FilterRange::at_least(10.0));
        let outcome = FilterEngine::new().evaluate_at(&metrics(), &cfg, now()).unwrap();
        assert!(!outcome.passed);
        let failed = outcome.failed_fields();
        assert_eq!(failed.len(), 2);
        assert!(failed.contains("market_cap_usd"));
        assert!(failed.contains("top10_ratio"));
    }

    #[test]
    fn test_open_minutes_uses_first_trade_first() {
        let cfg = FilterConfig::new().with(FilterField::OpenMinutes, FilterRange::at_most(30.0));
        let mut m = metrics();
        // pool created 45 minutes ago fails
        assert!(!FilterEngine::new().evaluate_at(&m, &cfg, now()).unwrap().passed);
        // first trade 10 minutes ago wins over pool creation
        m.market.first_trade_at = Some(now() - Duration::minutes(10));
        assert!(FilterEngine::new().evaluate_at(&m, &cfg, now()).unwrap().passed);
    }

    #[test]
    fn test_risk_score_field() {
        let field = FilterField::RiskScore("goplus_sell_tax".into());
        let cfg = FilterConfig::new().with(field, FilterRange::at_most(0.1));
        let mut m = metrics();
        assert!(!FilterEngine::new().evaluate_at(&m, &cfg, now()).unwrap().passed);
        m.risk_scores.insert("goplus_sell_tax".into(), 0.05);
        assert!(FilterEngine::new().evaluate_at(&m, &cfg, now()).unwrap().passed);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let cfg = FilterConfig::new().with(FilterField::LiquidityUsd, FilterRange::between(10.0, 1.0));
        let err = FilterEngine::new().evaluate_at(&metrics(), &cfg, now()).unwrap_err();
        assert!(matches!(err, DetectorError::InvalidFilterConfig(_)));
    }
}
