use huddle_db::StoreError;
use huddle_types::events::{ErrorCode, ServerEvent};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing field: {0}")]
    MissingField(&'static str),
    #[error("a message carries exactly one of text, audio_ref or image_ref")]
    ConflictingBody,
    #[error("{field} exceeds {max} characters")]
    TooLong { field: &'static str, max: usize },
}

/// Failure of a single inbound command. Always reported to the
/// originating connection only.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("persistence failed: {0}")]
    Persistence(#[from] StoreError),
    #[error("not permitted: {0}")]
    Forbidden(&'static str),
}

impl GatewayError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation(_) => ErrorCode::Validation,
            Self::Persistence(_) => ErrorCode::Persistence,
            Self::Forbidden(_) => ErrorCode::Forbidden,
        }
    }

    pub fn to_event(&self) -> ServerEvent {
        // Store internals stay in the server log
        let message = match self {
            Self::Persistence(_) => "message store unavailable".to_string(),
            other => other.to_string(),
        };
        ServerEvent::Error {
            code: self.code(),
            message,
        }
    }
}
