//! Daily activity windows.
//!
//! Windows are written as `HH:MM` pairs and always interpreted in a fixed
//! UTC+8 offset, regardless of host locale. Membership is half-open
//! `[start, end)` at minute granularity; `start > end` wraps past midnight and
//! `start == end` covers the whole day.

use crate::{CoreError, CoreResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Offset applied to every window.
pub const WINDOW_UTC_OFFSET_SECS: i32 = 8 * 3600;

const MINUTES_PER_DAY: u32 = 24 * 60;

/// Scheduler view of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WindowState {
    /// Task is disabled, window ignored.
    Disabled,
    /// Enabled but outside its window.
    WindowClosed,
    /// Enabled and inside its window (or has no window).
    WindowOpen,
}

impl WindowState {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::WindowOpen)
    }

    /// Gauge encoding: 0 disabled, 1 closed, 2 open.
    pub fn as_gauge(&self) -> i64 {
        match self {
            Self::Disabled => 0,
            Self::WindowClosed => 1,
            Self::WindowOpen => 2,
        }
    }
}

impl std::fmt::Display for WindowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disabled => write!(f, "Disabled"),
            Self::WindowClosed => write!(f, "WindowClosed"),
            Self::WindowOpen => write!(f, "WindowOpen"),
        }
    }
}

/// Recurring daily window in UTC+8.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: String,
    pub end: String,
}

impl TimeWindow {
    /// Create a window, validating both ends.
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> CoreResult<Self> {
        let window = Self {
            start: start.into(),
            end: end.into(),
        };
        window.validate()?;
        Ok(window)
    }

    pub fn validate(&self) -> CoreResult<()> {
        parse_hhmm(&self.start)?;
        parse_hhmm(&self.end)?;
        Ok(())
    }

    /// Whether the window wraps past midnight.
    pub fn crosses_midnight(&self) -> CoreResult<bool> {
        Ok(parse_hhmm(&self.start)? > parse_hhmm(&self.end)?)
    }

    /// Membership test for an instant.
    ///
    /// A malformed window is an error; callers treat it as closed.
    pub fn is_open_at(&self, now: DateTime<Utc>) -> CoreResult<bool> {
        let start = parse_hhmm(&self.start)?;
        let end = parse_hhmm(&self.end)?;
        let minute = local_minute_of_day(now);
        Ok(if start == end {
            true
        } else if start < end {
            start <= minute && minute < end
        } else {
            minute >= start || minute < end
        })
    }
}

/// Minute of day in the fixed window offset.
pub fn local_minute_of_day(now: DateTime<Utc>) -> u32 {
    let secs = (now.timestamp() + i64::from(WINDOW_UTC_OFFSET_SECS)).rem_euclid(86_400);
    (secs / 60) as u32
}

fn parse_hhmm(s: &str) -> CoreResult<u32> {
    let invalid = || CoreError::InvalidTimeWindow(format!("expected HH:MM, got {s:?}"));
    let (h, m) = s.trim().split_once(':').ok_or_else(invalid)?;
    if h.is_empty() || h.len() > 2 || m.len() != 2 {
        return Err(invalid());
    }
    let h: u32 = h.parse().map_err(|_| invalid())?;
    let m: u32 = m.parse().map_err(|_| invalid())?;
    if h > 23 || m > 59 {
        return Err(invalid());
    }
    let minute = h * 60 + m;
    debug_assert!(minute < MINUTES_PER_DAY);
    Ok(minute)
}
