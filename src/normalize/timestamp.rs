//! Timestamp normalization
//!
//! Two branches, in this order:
//! - digit-only text is Unix epoch **seconds** (never a bare year)
//! - anything else goes through [`parse_date`]

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimestampError {
    #[error("empty timestamp")]
    Empty,

    #[error("epoch value out of range: {0}")]
    OutOfRange(String),

    #[error("unrecognized date format: {0}")]
    Unrecognized(String),
}

/// Date-time layouts with an explicit offset
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f %z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y/%m/%d %H:%M:%S%.f%:z",
];

/// Date-time layouts without an offset, read as UTC
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M",
    "%m/%d/%Y %H:%M:%S%.f",
    "%m/%d/%Y %H:%M",
    "%d-%b-%Y %H:%M:%S",
    "%b %d %Y %H:%M:%S",
];

/// Date-only layouts, midnight UTC
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d-%b-%Y", "%b %d %Y"];

/// Normalize one timestamp cell into a UTC instant.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, TimestampError> {
    let s = raw.trim();
    if s.is_empty() {
        return Err(TimestampError::Empty);
    }

    if s.bytes().all(|b| b.is_ascii_digit()) {
        return from_epoch_seconds(s);
    }

    parse_date(s).ok_or_else(|| TimestampError::Unrecognized(s.to_string()))
}

/// Same as [`parse_timestamp`], for JSON payloads where the value may be a number.
pub fn parse_timestamp_value(value: &Value) -> Result<DateTime<Utc>, TimestampError> {
    match value {
        Value::String(s) => parse_timestamp(s),
        Value::Number(n) if n.is_u64() => parse_timestamp(&n.to_string()),
        Value::Null => Err(TimestampError::Empty),
        other => Err(TimestampError::Unrecognized(other.to_string())),
    }
}

fn from_epoch_seconds(digits: &str) -> Result<DateTime<Utc>, TimestampError> {
    let out_of_range = || TimestampError::OutOfRange(digits.to_string());

    let secs: i64 = digits.parse().map_err(|_| out_of_range())?;
    let millis = secs.checked_mul(1000).ok_or_else(out_of_range)?;

    DateTime::from_timestamp_millis(millis).ok_or_else(out_of_range)
}

/// Generic date-string parsing. Not epoch-aware: digit-only input is rejected.
///
/// Accepts RFC 3339, RFC 2822, the common `YYYY-MM-DD HH:MM:SS` family with or
/// without an offset, US `MM/DD/YYYY` layouts and plain dates. Values without
/// an offset are taken as UTC.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() || s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }

    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    // "2024-01-01 10:00:00Z", "2024-01-01 10:00:00 UTC"
    let naive = s
        .strip_suffix(" UTC")
        .or_else(|| s.strip_suffix(" GMT"))
        .or_else(|| s.strip_suffix('Z'))
        .or_else(|| s.strip_suffix('z'))
        .unwrap_or(s)
        .trim_end();

    for fmt in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(naive, fmt) {
            return Some(dt.and_utc());
        }
    }

    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(naive, fmt) {
            return d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        }
    }

    None
}
