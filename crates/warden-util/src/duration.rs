//! Human-entered duration parsing and formatting
//!
//! Accepts expressions such as `3d`, `12h30m`, `1 day 6 hours`, `1.5h` or
//! `2 weeks, 3 days`. Every token is a number followed by a unit; anything
//! left over after tokenising makes the whole expression invalid, so typos
//! are rejected rather than silently ignored.

use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;

const MS_PER_SECOND: u64 = 1_000;
const MS_PER_MINUTE: u64 = 60 * MS_PER_SECOND;
const MS_PER_HOUR: u64 = 60 * MS_PER_MINUTE;
const MS_PER_DAY: u64 = 24 * MS_PER_HOUR;
const MS_PER_WEEK: u64 = 7 * MS_PER_DAY;
const MS_PER_MONTH: u64 = 30 * MS_PER_DAY;
const MS_PER_YEAR: u64 = 365 * MS_PER_DAY;

/// Longest offset a sanction may be imposed for.
pub const MAX_SANCTION_OFFSET: Duration = Duration::from_millis(1000 * MS_PER_YEAR);

static WHOLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*\d+(?:\.\d+)?\s*[a-z]+(?:(?:\s*,\s*|\s+and\s+|\s*)\d+(?:\.\d+)?\s*[a-z]+)*\s*$",
    )
    .expect("duration grammar regex is valid")
});

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*([a-z]+)").expect("duration token regex is valid")
});

/// Why a duration expression was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationError {
    #[error("duration is empty")]
    Empty,

    #[error("negative duration '{0}'")]
    Negative(String),

    #[error("unrecognised duration '{0}'")]
    Unrecognised(String),

    #[error("unknown duration unit '{0}'")]
    UnknownUnit(String),

    #[error("duration must be greater than zero")]
    NotPositive,

    #[error("duration '{0}' is too large")]
    TooLarge(String),
}

fn unit_millis(unit: &str) -> Option<u64> {
    let ms = match unit.to_ascii_lowercase().as_str() {
        "ms" | "msec" | "msecs" | "millisecond" | "milliseconds" => 1,
        "s" | "sec" | "secs" | "second" | "seconds" => MS_PER_SECOND,
        "m" | "min" | "mins" | "minute" | "minutes" => MS_PER_MINUTE,
        "h" | "hr" | "hrs" | "hour" | "hours" => MS_PER_HOUR,
        "d" | "day" | "days" => MS_PER_DAY,
        "w" | "wk" | "wks" | "week" | "weeks" => MS_PER_WEEK,
        "mo" | "mth" | "month" | "months" => MS_PER_MONTH,
        "y" | "yr" | "yrs" | "year" | "years" => MS_PER_YEAR,
        _ => return None,
    };
    Some(ms)
}

/// Parse a duration expression into a strictly positive, finite offset.
pub fn parse_duration(text: &str) -> Result<Duration, DurationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(DurationError::Empty);
    }
    if trimmed.starts_with('-') {
        return Err(DurationError::Negative(trimmed.to_string()));
    }
    if !WHOLE_RE.is_match(trimmed) {
        return Err(DurationError::Unrecognised(trimmed.to_string()));
    }

    let mut total_ms = 0f64;
    for cap in TOKEN_RE.captures_iter(trimmed) {
        let value: f64 = cap[1]
            .parse()
            .map_err(|_| DurationError::Unrecognised(trimmed.to_string()))?;
        let unit = unit_millis(&cap[2]).ok_or_else(|| DurationError::UnknownUnit(cap[2].to_string()))?;
        total_ms += value * unit as f64;
    }

    if !total_ms.is_finite() || total_ms > MAX_SANCTION_OFFSET.as_millis() as f64 {
        return Err(DurationError::TooLarge(trimmed.to_string()));
    }

    let total_ms = total_ms.round() as u64;
    if total_ms == 0 {
        return Err(DurationError::NotPositive);
    }

    Ok(Duration::from_millis(total_ms))
}

/// Absolute expiry for an offset applied at `now`.
pub fn expiry_after(now: DateTime<Utc>, offset: Duration) -> Result<DateTime<Utc>, DurationError> {
    chrono::Duration::from_std(offset)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .ok_or_else(|| DurationError::TooLarge(format_duration(offset)))
}

/// Format an offset for humans, largest units first: `"1 day 2 hours 30 minutes"`.
///
/// Zero formats as `"0 seconds"`. Sub-second remainders are dropped unless
/// the whole span is shorter than a second.
pub fn format_duration(d: Duration) -> String {
    const UNITS: [(u64, &str); 7] = [
        (MS_PER_YEAR, "year"),
        (MS_PER_MONTH, "month"),
        (MS_PER_WEEK, "week"),
        (MS_PER_DAY, "day"),
        (MS_PER_HOUR, "hour"),
        (MS_PER_MINUTE, "minute"),
        (MS_PER_SECOND, "second"),
    ];

    let total_ms = d.as_millis().min(u64::MAX as u128) as u64;
    if total_ms == 0 {
        return "0 seconds".to_string();
    }
    if total_ms < MS_PER_SECOND {
        return plural(total_ms, "millisecond");
    }

    let mut remaining = total_ms;
    let mut parts = Vec::new();
    for (unit_ms, name) in UNITS {
        let count = remaining / unit_ms;
        if count > 0 {
            parts.push(plural(count, name));
            remaining %= unit_ms;
        }
    }

    parts.join(" ")
}

fn plural(count: u64, unit: &str) -> String {
    if count == 1 {
        format!("1 {}", unit)
    } else {
        format!("{} {}s", count, unit)
    }
}
