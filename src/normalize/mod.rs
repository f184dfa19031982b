//! Cell normalizers
//!
//! Converts the loosely formatted cells found in alert/incident exports into
//! canonical values. Every normalizer here is pure; logging is limited to
//! `debug!`/`warn!` diagnostics.
//!
//! | Cell               | Normalizer                    | Failure mode          |
//! |--------------------|-------------------------------|-----------------------|
//! | timestamps         | [`timestamp::parse_timestamp`]| error (row skipped)   |
//! | `windows`          | [`windows::parse_windows`]    | bad tokens dropped    |
//! | `evidence`         | [`evidence::normalize_evidence`] | never fails        |
//! | `list_raw_events`  | [`raw_events::parse_raw_events`] | never fails        |

pub mod timestamp;
pub mod windows;
pub mod evidence;
pub mod raw_events;

pub use timestamp::{parse_date, parse_timestamp, parse_timestamp_value, TimestampError};
pub use windows::{parse_windows, parse_windows_str};
pub use evidence::{normalize_evidence, normalize_evidence_str};
pub use raw_events::{parse_raw_events, parse_raw_events_str};

/// Collapse CSV double-quote escaping (`""` -> `"`).
pub(crate) fn collapse_doubled_quotes(s: &str) -> String {
    s.replace("\"\"", "\"")
}

/// Remove a single pair of wrapping double quotes, if present.
pub(crate) fn strip_outer_quotes(s: &str) -> &str {
    let t = s.trim();
    if t.len() >= 2 && t.starts_with('"') && t.ends_with('"') {
        &t[1..t.len() - 1]
    } else {
        t
    }
}
