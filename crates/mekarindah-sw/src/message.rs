//! Control messages posted to the worker by client pages.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::debug;

/// A control message from a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// Activate the waiting worker now instead of after its tabs close.
    SkipWaiting,
    /// Delete the current cache.
    ClearCache,
}

impl ClientMessage {
    /// Parse message data; anything unrecognised yields `None`.
    pub fn parse(data: &JsonValue) -> Option<Self> {
        match serde_json::from_value(data.clone()) {
            Ok(message) => Some(message),
            Err(e) => {
                debug!(error = %e, "Ignoring unrecognised message");
                None
            }
        }
    }

    /// The message as the JSON a page would post.
    pub fn to_json(self) -> JsonValue {
        match self {
            ClientMessage::SkipWaiting => serde_json::json!({ "type": "SKIP_WAITING" }),
            ClientMessage::ClearCache => serde_json::json!({ "type": "CLEAR_CACHE" }),
        }
    }
}
