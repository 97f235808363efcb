use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Identity;

// -- JWT Claims --

/// JWT claims shared by huddle-api (REST middleware) and the WebSocket
/// upgrade in huddle-server. Tokens are issued by the external credential
/// service; huddle only verifies them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

impl Claims {
    pub fn identity(&self) -> Identity {
        Identity {
            user_id: self.sub,
            username: self.username.clone(),
        }
    }
}

// -- Media --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Audio,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    /// Stable URL path to reference from `image_ref` / `audio_ref`
    pub reference: String,
    pub kind: MediaKind,
    pub size: u64,
}
