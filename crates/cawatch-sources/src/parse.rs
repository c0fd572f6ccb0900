//! Lenient JSON field readers for provider responses.
//!
//! Upstreams mix numbers and numeric strings, seconds and milliseconds,
//! fractions and percentages. Unparseable values read as `None`, never zero.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

/// Walk nested object keys; `None` on a missing key or JSON null.
pub fn path<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    let mut cur = value;
    for key in keys {
        cur = cur.get(key)?;
    }
    (!cur.is_null()).then_some(cur)
}

/// First candidate that is present and not null.
pub fn first<'a>(candidates: impl IntoIterator<Item = Option<&'a Value>>) -> Option<&'a Value> {
    candidates.into_iter().flatten().find(|v| !v.is_null())
}

/// Finite number from a JSON number or numeric string.
pub fn num(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Non-negative integer count.
pub fn count(value: &Value) -> Option<u64> {
    let n = num(value)?;
    (n >= 0.0).then(|| n.round() as u64)
}

/// Positive number; zero and negatives read as absent.
pub fn positive(value: &Value) -> Option<f64> {
    num(value).filter(|n| *n > 0.0)
}

/// Share in [0, 1]; values above 1 are taken as percentages.
pub fn ratio(value: &Value) -> Option<f64> {
    let n = num(value)?;
    if n < 0.0 {
        return None;
    }
    Some(if n > 1.0 { n / 100.0 } else { n })
}

/// Non-empty string.
pub fn text(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Unix timestamp in seconds or milliseconds (values above 1e12 are ms).
pub fn timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let n = num(value)?;
    if n <= 0.0 {
        return None;
    }
    let millis = if n > 1e12 { n } else { n * 1000.0 };
    Utc.timestamp_millis_opt(millis as i64).single()
}
