//! Control channel messages from the foreground app.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A recognized control message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ControlMessage {
    /// Activate the waiting worker now instead of when all tabs close.
    #[serde(rename = "SKIP_WAITING")]
    SkipWaiting,
}

impl ControlMessage {
    /// Parse a posted message. Unrecognized shapes yield `None`.
    pub fn parse(data: &Value) -> Option<Self> {
        Self::deserialize(data).ok()
    }

    /// Parse a message posted as a JSON string.
    pub fn parse_str(data: &str) -> Option<Self> {
        serde_json::from_str(data).ok()
    }
}
