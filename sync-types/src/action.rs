//! The opaque action payload.

use serde::{Deserialize, Serialize};

/// An application-defined state change.
///
/// The server never interprets an action beyond its `kind` discriminator;
/// the rest of the payload is routed, authorized and stored as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    /// Type discriminator, e.g. `"user/rename"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Remaining payload fields, opaque to the server.
    #[serde(flatten)]
    pub payload: serde_json::Value,
}

impl Action {
    /// Create an action with an empty payload.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            payload: serde_json::Value::Object(serde_json::Map::new()),
        }
    }

    /// Create an action with the given payload fields.
    pub fn with_payload(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }
}
