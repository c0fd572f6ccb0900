//! Notification caption rendering (Telegram HTML).
//!
//! Numbers use K/M/B short form; percentages are truncated, not rounded, to
//! two decimals. Missing values render as `-`.

use cawatch_core::{Chain, ChartSeries, TargetKind, TokenMetrics};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::fmt::Write;

const MISSING: &str = "-";

/// Truncate toward zero at two decimals.
pub fn truncate2(value: f64) -> Option<Decimal> {
    Decimal::from_f64(value).map(|d| d.trunc_with_scale(2).normalize())
}

/// `1234567.0` -> `1.23M`.
pub fn short_number(value: f64) -> String {
    let abs = value.abs();
    let (scaled, suffix) = if abs >= 1e9 {
        (value / 1e9, "B")
    } else if abs >= 1e6 {
        (value / 1e6, "M")
    } else if abs >= 1e3 {
        (value / 1e3, "K")
    } else {
        (value, "")
    };
    match truncate2(scaled) {
        Some(d) => format!("{d}{suffix}"),
        None => MISSING.to_string(),
    }
}

/// Ratio in [0, 1] as a percentage, `0.14987` -> `14.98%`.
pub fn percent(ratio: f64) -> String {
    match truncate2(ratio * 100.0) {
        Some(d) => format!("{d}%"),
        None => MISSING.to_string(),
    }
}

/// Price with four significant digits.
pub fn price(value: f64) -> String {
    Decimal::from_f64(value)
        .and_then(|d| d.round_sf(4))
        .map(|d| d.normalize().to_string())
        .unwrap_or_else(|| MISSING.to_string())
}

/// `193` minutes -> `3h 13m`.
pub fn age(minutes: f64) -> String {
    let total = minutes.max(0.0) as u64;
    let (days, hours, mins) = (total / 1440, (total % 1440) / 60, total % 60);
    if days > 0 {
        format!("{days}d {hours}h")
    } else if hours > 0 {
        format!("{hours}h {mins}m")
    } else {
        format!("{mins}m")
    }
}

pub fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// GMGN token page.
pub fn token_link(chain: Chain, address: &str) -> String {
    format!("https://gmgn.ai/{}/token/{}", chain.gmgn_code(), address)
}

fn usd(value: Option<f64>) -> String {
    value.map_or_else(|| MISSING.to_string(), |v| format!("${}", short_number(v)))
}

fn ratio(value: Option<f64>) -> String {
    value.map_or_else(|| MISSING.to_string(), percent)
}

fn count(value: Option<u64>) -> String {
    value.map_or_else(|| MISSING.to_string(), |v| v.to_string())
}

/// Chart summary line, `None` for an empty series.
pub fn chart_summary(chart: &ChartSeries) -> Option<String> {
    let (open, close) = (chart.first_open()?, chart.last_close()?);
    let (high, low) = (chart.high()?, chart.low()?);
    Some(format!(
        "Chart {}: open {} close {} high {} low {} ({} bars)",
        chart.resolution,
        price(open),
        price(close),
        price(high),
        price(low),
        chart.bars.len()
    ))
}

/// Render the caption for one target kind.
///
/// Broadcast targets get a chart summary line when a series exists.
pub fn render(metrics: &TokenMetrics, chart: Option<&ChartSeries>, kind: TargetKind, now: DateTime<Utc>) -> String {
    let market = &metrics.market;
    let mut out = String::new();

    let symbol = escape_html(&metrics.label());
    match market.name.as_deref().filter(|n| !n.is_empty()) {
        Some(name) => {
            let _ = writeln!(out, "<b>{symbol}</b> ({}) | {}", escape_html(name), metrics.chain);
        }
        None => {
            let _ = writeln!(out, "<b>{symbol}</b> | {}", metrics.chain);
        }
    }
    let _ = writeln!(
        out,
        "MC: {} | Liq: {}",
        usd(market.market_cap_usd),
        usd(market.liquidity_usd)
    );
    let age_text = metrics
        .open_minutes(now)
        .map_or_else(|| MISSING.to_string(), age);
    let _ = writeln!(out, "Age: {age_text}");
    let _ = writeln!(out, "<code>{}</code>", escape_html(&metrics.address));
    let _ = writeln!(
        out,
        "Holders: {} | Top10: {} | Max: {}",
        count(market.holder_count),
        ratio(market.top10_ratio),
        ratio(market.max_holder_ratio)
    );
    let _ = writeln!(out, "5m trades: {}", count(market.trades_5m));
    for (name, value) in &metrics.risk_scores {
        let shown = truncate2(*value).map_or_else(|| MISSING.to_string(), |d| d.to_string());
        let _ = writeln!(out, "{}: {shown}", escape_html(name));
    }
    if kind == TargetKind::Broadcast {
        if let Some(line) = chart.and_then(chart_summary) {
            let _ = writeln!(out, "{line}");
        }
    }
    let _ = write!(
        out,
        "<a href=\"{}\">GMGN</a>",
        token_link(metrics.chain, &metrics.address)
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use cawatch_core::{MarketData, OhlcvBar};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 2, 0, 0).unwrap()
    }

    fn metrics() -> TokenMetrics {
        let mut m = TokenMetrics::new(Chain::Solana, "7GCihgDB8fe6KNjn2MYtkzZcRjQy3t9GHdC8uHYmW2hr", now());
        m.market = MarketData {
            symbol: Some("CAT".into()),
            name: Some("Cat <Coin>".into()),
            market_cap_usd: Some(200_000.0),
            liquidity_usd: Some(45_678.9),
            holder_count: Some(512),
            top10_ratio: Some(0.14987),
            trades_5m: Some(87),
            pool_created_at: Some(now() - chrono::Duration::minutes(193)),
            ..Default::default()
        };
        m.risk_scores.insert("rugcheck_score".into(), 42.129);
        m
    }

    fn chart() -> ChartSeries {
        let bar = |m: u32, o: f64, c: f64| OhlcvBar {
            time: Utc.with_ymd_and_hms(2026, 3, 1, 1, m, 0).unwrap(),
            open: o,
            high: o.max(c) * 1.1,
            low: o.min(c) * 0.9,
            close: c,
            volume: 10.0,
        };
        ChartSeries::new("1m", vec![bar(0, 0.0002, 0.00021), bar(1, 0.00021, 0.00025)])
    }

    #[test]
    fn test_truncation_not_rounding() {
        assert_eq!(truncate2(1.239), Some(dec!(1.23)));
        assert_eq!(truncate2(-1.239), Some(dec!(-1.23)));
        assert_eq!(percent(0.14987), "14.98%");
        assert_eq!(percent(0.999999), "99.99%");
    }

    #[test]
    fn test_short_numbers() {
        assert_eq!(short_number(999.999), "999.99");
        assert_eq!(short_number(200_000.0), "200K");
        assert_eq!(short_number(1_239_000.0), "1.23M");
        assert_eq!(short_number(2_500_000_000.0), "2.5B");
        assert_eq!(short_number(f64::NAN), "-");
    }

    #[test]
    fn test_age() {
        assert_eq!(age(45.9), "45m");
        assert_eq!(age(193.0), "3h 13m");
        assert_eq!(age(3000.0), "2d 2h");
    }

    #[test]
    fn test_render_direct_message() {
        let text = render(&metrics(), Some(&chart()), TargetKind::DirectMessage, now());
        assert!(text.starts_with("<b>CAT</b> (Cat &lt;Coin&gt;) | solana"));
        assert!(text.contains("MC: $200K | Liq: $45.67K"));
        assert!(text.contains("Age: 3h 13m"));
        assert!(text.contains("<code>7GCihgDB8fe6KNjn2MYtkzZcRjQy3t9GHdC8uHYmW2hr</code>"));
        assert!(text.contains("Holders: 512 | Top10: 14.98% | Max: -"));
        assert!(text.contains("rugcheck_score: 42.12"));
        assert!(text.contains("https://gmgn.ai/sol/token/7GCihgDB8fe6KNjn2MYtkzZcRjQy3t9GHdC8uHYmW2hr"));
        assert!(!text.contains("Chart"));
    }

    #[test]
    fn test_render_broadcast_includes_chart_summary() {
        let text = render(&metrics(), Some(&chart()), TargetKind::Broadcast, now());
        assert!(text.contains("Chart 1m: open 0.0002 close 0.00025"));
        assert!(text.contains("(2 bars)"));

        let without = render(&metrics(), None, TargetKind::Broadcast, now());
        assert!(!without.contains("Chart"));
    }
}
