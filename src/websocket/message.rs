use serde::{Deserialize, Deserializer, Serialize};

use crate::store::MessageRecord;

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Bind this connection to an identity
    #[serde(alias = "join")]
    Identify(#[serde(deserialize_with = "identity_from_scalar")] String),
    Ping,
}

/// Identities may arrive as strings or bare numbers
#[derive(Deserialize)]
#[serde(untagged)]
enum ScalarIdentity {
    Text(String),
    Number(serde_json::Number),
}

fn identity_from_scalar<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match ScalarIdentity::deserialize(deserializer)? {
        ScalarIdentity::Text(text) => text,
        ScalarIdentity::Number(number) => number.to_string(),
    })
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Full online snapshot
    #[serde(rename = "presence_update")]
    PresenceUpdate {
        #[serde(rename = "payload")]
        online: Vec<String>,
    },
    #[serde(rename = "message_received")]
    MessageReceived { message: MessageRecord },
    #[serde(rename = "seen_notice")]
    SeenNotice { seen_by: String },
    #[serde(rename = "pong")]
    Pong,
    #[serde(rename = "error")]
    Error { code: String, message: String },
}

impl ServerMessage {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn presence(online: Vec<String>) -> Self {
        Self::PresenceUpdate { online }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::PresenceUpdate { .. } => "presence_update",
            Self::MessageReceived { .. } => "message_received",
            Self::SeenNotice { .. } => "seen_notice",
            Self::Pong => "pong",
            Self::Error { .. } => "error",
        }
    }
}

/// What the writer task puts on the wire for one connection
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    /// JSON text frame
    Event(ServerMessage),
    /// Transport-level ping; the client's pong refreshes activity
    Ping,
}

impl OutboundMessage {
    pub fn to_json(&self) -> Option<Result<String, serde_json::Error>> {
        match self {
            Self::Event(message) => Some(serde_json::to_string(message)),
            Self::Ping => None,
        }
    }
}
