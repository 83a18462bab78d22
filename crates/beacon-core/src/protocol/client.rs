//! Client-to-server messages
//!
//! The subscribe/unsubscribe tags embed the channel name
//! (`subscribe_jobs`), so decoding is a hand-written dispatch over the tag
//! rather than a derived enum. Unrecognized tags land in
//! [`ClientMessage::Unknown`] for the caller to log and drop.

use super::{Channel, ProtocolError};
use serde_json::{json, Value};
use std::fmt;

/// Messages a client may send to the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// Bearer credential, answering `auth_required`
    Auth { token: String },

    /// Subscribe to a channel (0→1 transition on the client side)
    Subscribe(Channel),

    /// Unsubscribe from a channel (1→0 transition on the client side)
    Unsubscribe(Channel),

    /// Client-originated heartbeat probe
    Ping,

    /// Answer to a server `ping`
    Pong,

    /// A syntactically valid frame whose tag the server does not know
    Unknown(String),
}

impl ClientMessage {
    /// Deserialize from JSON string
    pub fn from_json(json: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(json)?;
        let tag = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingType)?;

        Ok(match tag {
            "auth" => Self::Auth {
                token: value
                    .get("token")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            },
            "ping" => Self::Ping,
            "pong" => Self::Pong,
            _ => {
                if let Some(name) = tag.strip_prefix("subscribe_") {
                    match Channel::parse(name) {
                        Some(channel) => Self::Subscribe(channel),
                        None => Self::Unknown(tag.to_string()),
                    }
                } else if let Some(name) = tag.strip_prefix("unsubscribe_") {
                    match Channel::parse(name) {
                        Some(channel) => Self::Unsubscribe(channel),
                        None => Self::Unknown(tag.to_string()),
                    }
                } else {
                    Self::Unknown(tag.to_string())
                }
            }
        })
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let value = match self {
            Self::Auth { token } => json!({ "type": "auth", "token": token }),
            Self::Subscribe(channel) => json!({ "type": channel.subscribe_tag() }),
            Self::Unsubscribe(channel) => json!({ "type": channel.unsubscribe_tag() }),
            Self::Ping => json!({ "type": "ping" }),
            Self::Pong => json!({ "type": "pong" }),
            Self::Unknown(tag) => json!({ "type": tag }),
        };
        serde_json::to_string(&value)
    }

    /// The wire tag of this message
    #[must_use]
    pub fn tag(&self) -> String {
        match self {
            Self::Auth { .. } => "auth".to_string(),
            Self::Subscribe(channel) => channel.subscribe_tag(),
            Self::Unsubscribe(channel) => channel.unsubscribe_tag(),
            Self::Ping => "ping".to_string(),
            Self::Pong => "pong".to_string(),
            Self::Unknown(tag) => tag.clone(),
        }
    }
}

impl fmt::Display for ClientMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClientMessage({})", self.tag())
    }
}
