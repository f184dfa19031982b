//! Data models

pub mod evidence;
pub mod alert;
pub mod incident;

pub use evidence::*;
pub use alert::*;
pub use incident::*;

use chrono::{DateTime, SubsecRound, Utc};

/// Truncate to microseconds, the resolution a TIMESTAMPTZ column keeps.
pub fn stored_precision(at: DateTime<Utc>) -> DateTime<Utc> {
    at.trunc_subsecs(6)
}
