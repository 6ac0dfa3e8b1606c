//! JSON events exchanged by the `wirehook` server and client.
//!
//! Each event is serialized as a single compact JSON object, so it always
//! fits in one frame.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::PROTOCOL_VERSION;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum WireEvent {
    /// Greeting sent once a connection has been set up.
    #[serde(rename_all = "camelCase")]
    Connected {
        channel_id: String,
        server_version: String,
        connected_at: DateTime<Utc>,
    },
    /// A line relayed from another peer, or from the server operator.
    Message { from: String, text: String },
    /// Last event before the server closes the connection.
    Goodbye { reason: String },
}

impl WireEvent {
    pub fn connected(channel_id: impl Into<String>) -> Self {
        Self::Connected {
            channel_id: channel_id.into(),
            server_version: PROTOCOL_VERSION.into(),
            connected_at: Utc::now(),
        }
    }

    pub fn message(from: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Message {
            from: from.into(),
            text: text.into(),
        }
    }

    pub fn goodbye(reason: impl Into<String>) -> Self {
        Self::Goodbye {
            reason: reason.into(),
        }
    }

    /// Event name as it appears in the `event` field.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::Message { .. } => "message",
            Self::Goodbye { .. } => "goodbye",
        }
    }

    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}
