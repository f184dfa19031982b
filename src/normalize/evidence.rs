//! Evidence normalization
//!
//! Evidence cells are the worst-behaved column in the exports: JSON that went
//! through one or more rounds of CSV re-quoting, sometimes encoded as a JSON
//! string inside JSON, sometimes truncated. Normalization never fails: string
//! input runs through an ordered list of recovery strategies, then pattern
//! extraction, then a raw snapshot of the payload.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::models::Evidence;
use super::raw_events::parse_raw_events;
use super::{collapse_doubled_quotes, strip_outer_quotes};

/// Characters kept from an unrecoverable payload
pub const RAW_SNAPSHOT_CHARS: usize = 500;

/// Marker stored under `parse_error` when nothing could be recovered
pub const UNRECOVERABLE_MARKER: &str = "unrecoverable evidence payload";

/// Maximum JSON-in-JSON layers unwrapped by [`unwrap_nested`]
const MAX_NESTING: usize = 3;

#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("parsed value is not an object or array")]
    NotStructured,

    #[error("more than {MAX_NESTING} layers of encoded JSON")]
    TooDeep,
}

type Strategy = fn(&str) -> Result<Value, StrategyError>;

/// Recovery strategies, tried in order until one succeeds.
pub const STRATEGIES: &[(&str, Strategy)] = &[
    ("direct", parse_direct),
    ("collapse_doubled_quotes", parse_collapsed),
    ("strip_outer_quotes", parse_unescaped),
    ("api_export_fixups", parse_api_fixups),
    ("unwrap_nested", unwrap_nested),
    ("aggressive_cleanup", parse_aggressive),
];

/// How the evidence was obtained
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recovery {
    /// Input was already an object or array
    Structured,
    /// Parsed by the named entry of [`STRATEGIES`]
    Strategy(&'static str),
    /// Pattern extraction found at least one known field
    Extracted,
    /// Nothing recovered; raw snapshot stored
    Raw,
}

// ============================================================================
// ENTRY POINTS
// ============================================================================

/// Normalize an evidence value into its canonical shape.
pub fn normalize_evidence(value: &Value) -> Evidence {
    normalize_with_recovery(value).0
}

/// Normalize an evidence cell as read from CSV.
pub fn normalize_evidence_str(raw: &str) -> Evidence {
    normalize_str_with_recovery(raw).0
}

pub fn normalize_with_recovery(value: &Value) -> (Evidence, Recovery) {
    match value {
        Value::String(s) => normalize_str_with_recovery(s),
        Value::Null => (Evidence::default(), Recovery::Structured),
        other => (from_structured(other.clone()), Recovery::Structured),
    }
}

pub fn normalize_str_with_recovery(raw: &str) -> (Evidence, Recovery) {
    if raw.trim().is_empty() {
        return (Evidence::default(), Recovery::Structured);
    }

    if let Some((name, value)) = run_strategies(raw) {
        tracing::debug!("Evidence recovered by strategy '{}'", name);
        return (from_structured(value), Recovery::Strategy(name));
    }

    if let Some(fields) = extract_patterns(raw) {
        tracing::debug!("Evidence recovered by pattern extraction");
        return (from_structured(Value::Object(fields)), Recovery::Extracted);
    }

    tracing::warn!("Evidence payload unrecoverable, storing raw snapshot");
    (raw_snapshot(raw), Recovery::Raw)
}

/// Try each strategy in order, returning the first success.
pub fn run_strategies(raw: &str) -> Option<(&'static str, Value)> {
    STRATEGIES.iter().find_map(|(name, strategy)| match strategy(raw) {
        Ok(value) => Some((*name, value)),
        Err(e) => {
            tracing::trace!("Evidence strategy '{}' failed: {}", name, e);
            None
        }
    })
}

// ============================================================================
// STRATEGIES
// ============================================================================

fn parse_structured(s: &str) -> Result<Value, StrategyError> {
    match serde_json::from_str::<Value>(s.trim())? {
        v @ (Value::Object(_) | Value::Array(_)) => Ok(v),
        _ => Err(StrategyError::NotStructured),
    }
}

fn parse_direct(raw: &str) -> Result<Value, StrategyError> {
    parse_structured(raw)
}

fn parse_collapsed(raw: &str) -> Result<Value, StrategyError> {
    parse_structured(&collapse_doubled_quotes(raw))
}

fn parse_unescaped(raw: &str) -> Result<Value, StrategyError> {
    let unescaped = strip_outer_quotes(raw)
        .replace("\\\"", "\"")
        .replace("\\\\", "\\");
    parse_structured(&collapse_doubled_quotes(&unescaped))
}

static QUOTED_VALUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#":\s*""([^"]*)"""#).expect("quoted value regex is valid")
});

/// Targeted repairs for Graph-style API exports, where only some quotes were
/// doubled and legitimate empty strings (`""`) must survive.
fn parse_api_fixups(raw: &str) -> Result<Value, StrategyError> {
    // values first, so `:""#microsoft.graph.user""` is repaired as a whole
    let fixed = QUOTED_VALUE.replace_all(raw, ":\"$1\"");
    let fixed = fixed
        .replace("\"\"@", "\"@")
        .replace("\"\"#", "\"#")
        .replace("\"\":", "\":")
        .replace("{\"\"", "{\"")
        .replace(",\"\"", ",\"");
    parse_structured(strip_outer_quotes(&fixed))
}

fn unwrap_nested(raw: &str) -> Result<Value, StrategyError> {
    let mut current = raw.trim().to_string();
    for _ in 0..MAX_NESTING {
        match serde_json::from_str::<Value>(&current)? {
            Value::String(inner) => current = inner.trim().to_string(),
            v @ (Value::Object(_) | Value::Array(_)) => return Ok(v),
            _ => return Err(StrategyError::NotStructured),
        }
    }
    parse_structured(&current).map_err(|_| StrategyError::TooDeep)
}

fn parse_aggressive(raw: &str) -> Result<Value, StrategyError> {
    let mut s = raw.trim();
    while let Some(rest) = s.strip_prefix("\"\"") {
        s = rest;
    }
    while let Some(rest) = s.strip_suffix("\"\"") {
        s = rest;
    }
    let cleaned = s
        .trim_matches('"')
        .replace("\\n", "\n")
        .replace("\\r", "\r")
        .replace("\\t", "\t")
        .replace("\\\"", "\"");
    parse_structured(&collapse_doubled_quotes(&cleaned))
}

// ============================================================================
// PATTERN EXTRACTION
// ============================================================================

static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}").expect("email regex is valid")
});

static BRACE_OBJECT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{[^{}]*\}").expect("brace object regex is valid")
});

/// (field name in the payload, array name in the recovered evidence)
const NAMED_FIELDS: &[(&str, &str)] = &[
    ("userPrincipalName", "userPrincipalNames"),
    ("displayName", "displayNames"),
    ("fileName", "fileNames"),
    ("createdDateTime", "createdDateTimes"),
    ("subject", "subjects"),
];

static FIELD_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    NAMED_FIELDS
        .iter()
        .map(|(field, target)| {
            let pattern = format!(r#"{}\\*"*\s*:\s*\\*"*([^"\\,}}\]]+)"#, field);
            (*target, Regex::new(&pattern).expect("field regex is valid"))
        })
        .collect()
});

/// Scan an unparseable payload for well-known fields.
///
/// Returns `None` when no named field or email was found.
pub fn extract_patterns(raw: &str) -> Option<Map<String, Value>> {
    let mut fields = Map::new();

    let emails = distinct(EMAIL.find_iter(raw).map(|m| m.as_str().to_string()));
    if !emails.is_empty() {
        fields.insert("emails".to_string(), Value::from(emails));
    }

    for (target, re) in FIELD_PATTERNS.iter() {
        let values = distinct(
            re.captures_iter(raw)
                .filter_map(|c| c.get(1))
                .map(|m| m.as_str().trim().to_string())
                .filter(|v| !v.is_empty()),
        );
        if !values.is_empty() {
            fields.insert(target.to_string(), Value::from(values));
        }
    }

    if fields.is_empty() {
        return None;
    }

    fields.insert("count".to_string(), Value::from(BRACE_OBJECT.find_iter(raw).count()));
    fields.insert("parse_status".to_string(), Value::from("extracted"));
    Some(fields)
}

fn distinct(items: impl Iterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

fn raw_snapshot(raw: &str) -> Evidence {
    let mut evidence = Evidence::default();
    let snapshot: String = raw.chars().take(RAW_SNAPSHOT_CHARS).collect();
    evidence.extra.insert("raw".to_string(), Value::from(snapshot));
    evidence.extra.insert("parse_error".to_string(), Value::from(UNRECOVERABLE_MARKER));
    evidence
}

// ============================================================================
// MERGE & COERCION
// ============================================================================

fn from_structured(value: Value) -> Evidence {
    match value {
        Value::Array(items) => {
            let list = parse_raw_events(&Value::Array(items));
            Evidence {
                count: list.len() as u64,
                list_raw_events: list,
                ..Evidence::default()
            }
        }
        Value::Object(map) => from_object(map),
        other => from_structured(Value::Array(vec![other])),
    }
}

fn from_object(mut map: Map<String, Value>) -> Evidence {
    let site = match map.remove("site") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
    };

    let count = map.remove("count").map(|v| coerce_count(&v)).unwrap_or(0);

    let events = match map.remove("list_raw_events") {
        Some(v) => Some(v),
        None => map.remove("listRawEvents"),
    };
    let list_raw_events = events.map(|v| parse_raw_events(&v)).unwrap_or_default();

    Evidence {
        site,
        count,
        list_raw_events,
        extra: map,
    }
}

fn coerce_count(value: &Value) -> u64 {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().and_then(whole_count)).unwrap_or(0),
        Value::String(s) => {
            let t = s.trim();
            t.parse::<u64>()
                .ok()
                .or_else(|| t.parse::<f64>().ok().and_then(whole_count))
                .unwrap_or(0)
        }
        Value::Bool(b) => u64::from(*b),
        _ => 0,
    }
}

fn whole_count(f: f64) -> Option<u64> {
    (f.is_finite() && f >= 0.0).then(|| f as u64)
}

#[cfg(test)]
mod tests;
