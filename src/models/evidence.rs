//! Evidence payload attached to alerts

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Canonical evidence shape.
///
/// `site`, `count` and `list_raw_events` are always present once serialized;
/// provider-specific fields are kept verbatim in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    #[serde(default)]
    pub site: String,

    #[serde(default)]
    pub count: u64,

    #[serde(default)]
    pub list_raw_events: Vec<Value>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Evidence {
    /// True when the payload could not be recovered and only a raw snapshot was kept
    pub fn is_degraded(&self) -> bool {
        self.extra.contains_key("parse_error")
    }
}
