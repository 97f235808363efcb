use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Transport-assigned identifier of one live WebSocket connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form is enough to correlate log lines
        let s = self.0.simple().to_string();
        f.write_str(&s[..8])
    }
}

/// Authenticated identity handed to the gateway by the credential layer.
/// The gateway trusts it as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: Uuid,
    pub username: String,
}

/// Payload of a chat message. Exactly one kind per message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MessageBody {
    Text(String),
    /// Reference to an uploaded audio clip
    Audio(String),
    /// Reference to an uploaded image
    Image(String),
}

impl MessageBody {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Audio(_) => "audio",
            Self::Image(_) => "image",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Self::Text(v) | Self::Audio(v) | Self::Image(v) => v,
        }
    }

    pub fn from_parts(kind: &str, value: String) -> Option<Self> {
        match kind {
            "text" => Some(Self::Text(value)),
            "audio" => Some(Self::Audio(value)),
            "image" => Some(Self::Image(value)),
            _ => None,
        }
    }
}

/// Copy of the quoted message taken at send time. Not a reference:
/// it outlives the original.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplySnapshot {
    pub author: String,
    pub text: String,
}

/// A persisted chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub author: String,
    pub avatar_ref: Option<String>,
    pub body: MessageBody,
    pub reply_to: Option<ReplySnapshot>,
    pub seen: bool,
    pub created_at: DateTime<Utc>,
}

/// A validated message waiting to be persisted. The store assigns
/// `id`, `created_at` and `seen`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub author: String,
    pub avatar_ref: Option<String>,
    pub body: MessageBody,
    pub reply_to: Option<ReplySnapshot>,
}

/// Client-submitted message payload, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MessageDraft {
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub avatar_ref: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub audio_ref: Option<String>,
    #[serde(default)]
    pub image_ref: Option<String>,
    #[serde(default)]
    pub reply_to: Option<ReplySnapshot>,
}

impl MessageDraft {
    pub fn text(author: &str, text: &str) -> Self {
        Self {
            author: Some(author.to_string()),
            text: Some(text.to_string()),
            ..Self::default()
        }
    }
}

/// Roster entry for an announced session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub display_name: String,
    pub avatar_ref: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Seen,
}
