//! `list_raw_events` recovery
//!
//! The nested event list inside evidence frequently arrives as a string that
//! went through one or more rounds of CSV quoting. The result is always a
//! sequence: pieces that cannot be parsed are kept as raw strings.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::collapse_doubled_quotes;

/// Unquoted object key: `{id: 1, name: "x"}`
static BARE_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([{,]\s*)([A-Za-z_][A-Za-z0-9_\-]*)\s*:"#).expect("bare key regex is valid")
});

/// Adjacent object literals: `}{`, `} {`
static ADJACENT_OBJECTS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\}\s*\{").expect("adjacent object regex is valid")
});

/// Normalize a `list_raw_events` value from an already-parsed evidence object.
pub fn parse_raw_events(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => without_empty(items.clone()),
        Value::String(s) => parse_raw_events_str(s),
        Value::Null => Vec::new(),
        other => without_empty(vec![other.clone()]),
    }
}

/// Normalize a `list_raw_events` value that is still text.
pub fn parse_raw_events_str(raw: &str) -> Vec<Value> {
    let s = raw.trim();
    if s.is_empty() {
        return Vec::new();
    }

    if s.starts_with('[') && s.ends_with(']') {
        if let Some(items) = parse_array(s) {
            return without_empty(items);
        }
        if let Some(items) = parse_array(&collapse_doubled_quotes(s)) {
            return without_empty(items);
        }
    }

    let cleaned = strip_wrapping(s);
    if cleaned.is_empty() {
        return Vec::new();
    }

    if cleaned.starts_with('{') {
        let merged = format!("[{}]", ADJACENT_OBJECTS.replace_all(cleaned, "},{"));
        if let Some(items) = parse_array(&merged) {
            return without_empty(items);
        }
        let collapsed = collapse_doubled_quotes(cleaned);
        let merged = format!("[{}]", ADJACENT_OBJECTS.replace_all(&collapsed, "},{"));
        if let Some(items) = parse_array(&merged) {
            return without_empty(items);
        }
    }

    if cleaned.contains('{') {
        let items = split_objects(cleaned)
            .into_iter()
            .map(|piece| {
                parse_object_literal(&piece)
                    .or_else(|| parse_object_literal(&collapse_doubled_quotes(&piece)))
                    .unwrap_or(Value::String(piece))
            })
            .collect();
        return without_empty(items);
    }

    tracing::debug!("list_raw_events kept as a single raw entry");
    without_empty(vec![Value::String(s.to_string())])
}

fn parse_array(s: &str) -> Option<Vec<Value>> {
    match serde_json::from_str::<Value>(s) {
        Ok(Value::Array(items)) => Some(items),
        _ => None,
    }
}

/// Strip wrapping quotes, then one pair of wrapping brackets.
fn strip_wrapping(s: &str) -> &str {
    let unquoted = s.trim().trim_matches('"').trim();
    let inner = if unquoted.starts_with('[') && unquoted.ends_with(']') {
        &unquoted[1..unquoted.len() - 1]
    } else {
        unquoted
    };
    inner.trim()
}

/// Split on top-level commas that precede a `{`.
fn split_objects(s: &str) -> Vec<String> {
    let chars: Vec<char> = s.chars().collect();
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut depth: i32 = 0;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            current.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => depth -= 1,
            ',' if depth <= 0 => {
                let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
                if next == Some(&'{') {
                    pieces.push(std::mem::take(&mut current).trim().to_string());
                    continue;
                }
            }
            _ => {}
        }
        current.push(c);
    }

    let last = current.trim();
    if !last.is_empty() {
        pieces.push(last.to_string());
    }
    pieces
}

/// Parse one object literal, quoting bare keys and single-quoted strings.
fn parse_object_literal(piece: &str) -> Option<Value> {
    let candidates = [
        piece.to_string(),
        BARE_KEY.replace_all(piece, "$1\"$2\":").into_owned(),
        BARE_KEY.replace_all(&piece.replace('\'', "\""), "$1\"$2\":").into_owned(),
    ];

    candidates.iter().find_map(|c| match serde_json::from_str::<Value>(c) {
        Ok(v @ Value::Object(_)) => Some(v),
        _ => None,
    })
}

fn without_empty(items: Vec<Value>) -> Vec<Value> {
    items
        .into_iter()
        .filter(|v| match v {
            Value::Null => false,
            Value::String(s) => !s.trim().is_empty(),
            _ => true,
        })
        .collect()
}
