use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Message, MessageDraft, MessageStatus, Participant};

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Recent messages, oldest first. Sent once, to the joining connection only
    ChatHistory(Vec<Message>),

    /// Full roster of announced participants. Replaces any previous roster
    UpdateUserList(Vec<Participant>),

    /// A message was persisted
    ChatMessage(Message),

    MessageStatusUpdated {
        message_id: Uuid,
        status: MessageStatus,
    },

    TypingStart { display_name: String },

    TypingStop { display_name: String },

    /// All messages were deleted
    ChatCleared,

    /// Ephemeral notice, never persisted
    Alert { sender: String, text: String },

    /// A command from this connection was rejected
    Error { code: ErrorCode, message: String },
}

impl ServerEvent {
    /// Wire name of the event, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ChatHistory(_) => "chat_history",
            Self::UpdateUserList(_) => "update_user_list",
            Self::ChatMessage(_) => "chat_message",
            Self::MessageStatusUpdated { .. } => "message_status_updated",
            Self::TypingStart { .. } => "typing_start",
            Self::TypingStop { .. } => "typing_stop",
            Self::ChatCleared => "chat_cleared",
            Self::Alert { .. } => "alert",
            Self::Error { .. } => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Validation,
    Persistence,
    Forbidden,
    BadCommand,
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Announce display name and avatar for this connection
    UserConnected {
        display_name: String,
        #[serde(default)]
        avatar_ref: Option<String>,
    },

    ChatMessage(MessageDraft),

    MessageSeen { message_id: Uuid },

    TypingStart,

    TypingStop,

    ClearChat,

    SendAlert {
        #[serde(default)]
        sender: Option<String>,
        text: String,
    },
}

impl ClientCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::UserConnected { .. } => "user_connected",
            Self::ChatMessage(_) => "chat_message",
            Self::MessageSeen { .. } => "message_seen",
            Self::TypingStart => "typing_start",
            Self::TypingStop => "typing_stop",
            Self::ClearChat => "clear_chat",
            Self::SendAlert { .. } => "send_alert",
        }
    }
}
