//! `windows` cell parsing
//!
//! The cell lists the discrete timestamps making up an incident. Export tools
//! write it as a Python-style list literal, a bare comma list, a single value,
//! or (from JSON callers) a native array. Bad tokens are dropped, never fatal.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::timestamp::parse_date;

/// Quoted token inside a list literal: `'...'` or `"..."`
static QUOTED_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"'([^']*)'|"([^"]*)""#).expect("quoted token regex is valid")
});

/// Textual layout of a `windows` cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowShape {
    Empty,
    /// `['2024-01-01T00:00:00Z', '2024-01-02T00:00:00Z']`
    Bracketed,
    /// `2024-01-01T00:00:00Z, 2024-01-02T00:00:00Z`
    CommaList,
    /// `2024-01-01T00:00:00Z`
    Single,
}

pub fn detect_shape(raw: &str) -> WindowShape {
    let s = raw.trim();
    if s.is_empty() {
        WindowShape::Empty
    } else if s.starts_with('[') && s.ends_with(']') {
        WindowShape::Bracketed
    } else if s.contains(',') {
        WindowShape::CommaList
    } else {
        WindowShape::Single
    }
}

/// Parse a `windows` value from a JSON payload.
///
/// Numbers inside a native array are epoch milliseconds.
pub fn parse_windows(value: &Value) -> Vec<DateTime<Utc>> {
    match value {
        Value::Null => Vec::new(),
        Value::String(s) => parse_windows_str(s),
        Value::Array(items) => {
            let parsed = items.iter().filter_map(|item| match item {
                Value::String(s) => parse_token(s),
                Value::Number(n) => {
                    let dt = n.as_i64().and_then(DateTime::from_timestamp_millis);
                    if dt.is_none() {
                        tracing::warn!("Dropping unparseable window entry: {}", n);
                    }
                    dt
                }
                other => {
                    tracing::warn!("Dropping unparseable window entry: {}", other);
                    None
                }
            });
            dedup(parsed)
        }
        other => parse_windows_str(&other.to_string()),
    }
}

/// Parse a `windows` cell as read from CSV.
pub fn parse_windows_str(raw: &str) -> Vec<DateTime<Utc>> {
    let s = raw.trim();

    let tokens: Vec<String> = match detect_shape(s) {
        WindowShape::Empty => return Vec::new(),
        WindowShape::Bracketed => bracketed_tokens(&s[1..s.len() - 1]),
        WindowShape::CommaList => s.split(',').map(|t| t.trim().to_string()).collect(),
        WindowShape::Single => vec![s.to_string()],
    };

    dedup(tokens.iter().filter_map(|t| parse_token(t)))
}

fn bracketed_tokens(inner: &str) -> Vec<String> {
    let quoted: Vec<String> = QUOTED_TOKEN
        .captures_iter(inner)
        .filter_map(|c| c.get(1).or_else(|| c.get(2)))
        .map(|m| m.as_str().trim().to_string())
        .collect();

    if !quoted.is_empty() {
        return quoted;
    }

    // [2024-01-01T00:00:00Z, 2024-01-02T00:00:00Z]
    inner
        .split(',')
        .map(|t| t.trim().trim_matches(|c| c == '\'' || c == '"').trim().to_string())
        .collect()
}

fn parse_token(token: &str) -> Option<DateTime<Utc>> {
    let t = token.trim();
    if t.is_empty() {
        return None;
    }
    let parsed = parse_date(t);
    if parsed.is_none() {
        tracing::warn!("Dropping unparseable window entry: {:?}", t);
    }
    parsed
}

fn dedup(items: impl Iterator<Item = DateTime<Utc>>) -> Vec<DateTime<Utc>> {
    let mut seen = HashSet::new();
    items.filter(|dt| seen.insert(*dt)).collect()
}
