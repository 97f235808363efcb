use std::sync::Arc;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use huddle_db::MessageStore;
use huddle_types::events::ServerEvent;
use huddle_types::models::{
    ConnectionId, MessageBody, MessageDraft, MessageStatus, NewMessage, ReplySnapshot,
};

use crate::config::ClearPolicy;
use crate::directory::Session;
use crate::dispatcher::Outbound;
use crate::error::{GatewayError, ValidationError};

/// Longest text body accepted, in characters.
pub const MAX_TEXT_CHARS: usize = 4000;

/// Reply snapshots keep at most this many characters of the quoted text.
pub const REPLY_SNAPSHOT_CHARS: usize = 280;

/// Persists messages and turns message-level commands into broadcasts.
pub struct MessageRouter {
    store: Arc<dyn MessageStore>,
    clear_policy: ClearPolicy,
}

impl MessageRouter {
    pub fn new(store: Arc<dyn MessageStore>, clear_policy: ClearPolicy) -> Self {
        Self {
            store,
            clear_policy,
        }
    }

    /// Validate and persist a draft, then broadcast the stored record to
    /// everyone, sender included. Nothing is broadcast if the store fails.
    pub async fn on_message(
        &self,
        conn: ConnectionId,
        session: Option<&Session>,
        draft: MessageDraft,
    ) -> Result<Vec<Outbound>, GatewayError> {
        let new_message = validate_draft(draft, session)?;

        let message = self.store.insert(new_message).await.map_err(|e| {
            error!("Failed to store message from {}: {}", conn, e);
            e
        })?;

        debug!("{} stored message {} by {}", conn, message.id, message.author);
        Ok(vec![Outbound::all(ServerEvent::ChatMessage(message))])
    }

    /// Mark a message seen. Unknown or already-seen ids produce nothing.
    pub async fn on_seen(
        &self,
        conn: ConnectionId,
        message_id: Uuid,
    ) -> Result<Vec<Outbound>, GatewayError> {
        match self.store.find_by_id(message_id).await? {
            None => {
                debug!("{} marked unknown message {} seen", conn, message_id);
                return Ok(vec![]);
            }
            Some(message) if message.seen => return Ok(vec![]),
            Some(_) => {}
        }

        // mark_seen only reports true for the call that flipped the flag
        if !self.store.mark_seen(message_id).await? {
            return Ok(vec![]);
        }

        Ok(vec![Outbound::all(ServerEvent::MessageStatusUpdated {
            message_id,
            status: MessageStatus::Seen,
        })])
    }

    /// Delete every message, then tell everyone. Gated by the clear policy.
    pub async fn on_clear(
        &self,
        conn: ConnectionId,
        session: Option<&Session>,
    ) -> Result<Vec<Outbound>, GatewayError> {
        let name = session.and_then(|s| {
            s.identity
                .as_ref()
                .map(|i| i.username.as_str())
                .or_else(|| s.display_name())
        });

        if !self.clear_policy.allows(name) {
            warn!(
                "{} ({}) tried to clear the chat, denied by policy '{}'",
                conn,
                name.unwrap_or("anonymous"),
                self.clear_policy
            );
            return Err(GatewayError::Forbidden("clearing the chat"));
        }

        let deleted = self.store.delete_all().await.map_err(|e| {
            error!("Failed to clear messages for {}: {}", conn, e);
            e
        })?;

        info!(
            "{} ({}) cleared the chat, {} messages deleted",
            conn,
            name.unwrap_or("anonymous"),
            deleted
        );
        Ok(vec![Outbound::all(ServerEvent::ChatCleared)])
    }

    /// Ephemeral alert to everyone. Not persisted.
    pub fn on_alert(
        &self,
        session: Option<&Session>,
        sender: Option<String>,
        text: String,
    ) -> Result<Vec<Outbound>, GatewayError> {
        let sender = non_blank(sender)
            .or_else(|| session.and_then(|s| s.display_name()).map(str::to_string))
            .ok_or(ValidationError::MissingField("sender"))?;

        if text.trim().is_empty() {
            return Err(ValidationError::MissingField("text").into());
        }
        if text.chars().count() > MAX_TEXT_CHARS {
            return Err(ValidationError::TooLong {
                field: "text",
                max: MAX_TEXT_CHARS,
            }
            .into());
        }

        Ok(vec![Outbound::all(ServerEvent::Alert { sender, text })])
    }
}

/// Turn a client draft into a storable message. Author and avatar fall back
/// to what the session announced.
pub fn validate_draft(
    draft: MessageDraft,
    session: Option<&Session>,
) -> Result<NewMessage, ValidationError> {
    let announced = session.and_then(|s| s.participant.as_ref());

    let author = non_blank(draft.author)
        .or_else(|| announced.map(|p| p.display_name.clone()))
        .ok_or(ValidationError::MissingField("author"))?;

    let avatar_ref = non_blank(draft.avatar_ref).or_else(|| announced.and_then(|p| p.avatar_ref.clone()));

    let mut bodies = [
        non_blank(draft.text).map(MessageBody::Text),
        non_blank(draft.audio_ref).map(MessageBody::Audio),
        non_blank(draft.image_ref).map(MessageBody::Image),
    ]
    .into_iter()
    .flatten();

    let body = bodies.next().ok_or(ValidationError::MissingField("body"))?;
    if bodies.next().is_some() {
        return Err(ValidationError::ConflictingBody);
    }

    if let MessageBody::Text(text) = &body {
        if text.chars().count() > MAX_TEXT_CHARS {
            return Err(ValidationError::TooLong {
                field: "text",
                max: MAX_TEXT_CHARS,
            });
        }
    }

    let reply_to = draft.reply_to.map(|reply| ReplySnapshot {
        author: reply.author,
        text: reply.text.chars().take(REPLY_SNAPSHOT_CHARS).collect(),
    });

    Ok(NewMessage {
        author,
        avatar_ref,
        body,
        reply_to,
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use huddle_db::MemoryStore;
    use huddle_types::models::{Identity, Message, Participant};

    use crate::dispatcher::Target;
    use crate::testing::DownStore;

    fn announced(name: &str) -> Session {
        Session {
            participant: Some(Participant {
                display_name: name.to_string(),
                avatar_ref: Some(format!("/media/{}.png", name)),
            }),
            ..Session::default()
        }
    }

    fn router(policy: ClearPolicy) -> (MessageRouter, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (MessageRouter::new(store.clone(), policy), store)
    }

    fn broadcast_message(out: &[Outbound]) -> &Message {
        match out {
            [Outbound {
                target: Target::All,
                event: ServerEvent::ChatMessage(m),
            }] => m,
            other => panic!("unexpected outbound {:?}", other),
        }
    }

    #[test]
    fn draft_falls_back_to_session() {
        let session = announced("alice");
        let draft = MessageDraft {
            text: Some("hello".into()),
            ..MessageDraft::default()
        };
        let msg = validate_draft(draft, Some(&session)).unwrap();
        assert_eq!(msg.author, "alice");
        assert_eq!(msg.avatar_ref.as_deref(), Some("/media/alice.png"));
        assert_eq!(msg.body, MessageBody::Text("hello".into()));
    }

    #[test]
    fn draft_requires_author_and_single_body() {
        let no_author = MessageDraft {
            text: Some("hello".into()),
            ..MessageDraft::default()
        };
        assert_eq!(
            validate_draft(no_author, None),
            Err(ValidationError::MissingField("author"))
        );

        let empty = MessageDraft::text("alice", "   ");
        assert_eq!(
            validate_draft(empty, None),
            Err(ValidationError::MissingField("body"))
        );

        let both = MessageDraft {
            image_ref: Some("/media/x.png".into()),
            ..MessageDraft::text("alice", "caption")
        };
        assert_eq!(validate_draft(both, None), Err(ValidationError::ConflictingBody));

        let long = MessageDraft::text("alice", &"x".repeat(MAX_TEXT_CHARS + 1));
        assert!(matches!(
            validate_draft(long, None),
            Err(ValidationError::TooLong { .. })
        ));
    }

    #[test]
    fn reply_snapshot_is_truncated() {
        let draft = MessageDraft {
            reply_to: Some(ReplySnapshot {
                author: "A".into(),
                text: "y".repeat(REPLY_SNAPSHOT_CHARS + 20),
            }),
            ..MessageDraft::text("bob", "re")
        };
        let msg = validate_draft(draft, None).unwrap();
        assert_eq!(msg.reply_to.unwrap().text.chars().count(), REPLY_SNAPSHOT_CHARS);
    }

    #[tokio::test]
    async fn message_is_persisted_then_broadcast_to_all() {
        let (router, store) = router(ClearPolicy::Anyone);
        let conn = ConnectionId::new();

        let out = router
            .on_message(conn, None, MessageDraft::text("alice", "hello"))
            .await
            .unwrap();
        let msg = broadcast_message(&out);
        assert!(!msg.seen);
        assert_eq!(store.find_by_id(msg.id).await.unwrap().as_ref(), Some(msg));
    }

    #[tokio::test]
    async fn invalid_draft_is_not_persisted() {
        let (router, store) = router(ClearPolicy::Anyone);
        let err = router
            .on_message(ConnectionId::new(), None, MessageDraft::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
        assert!(store.find_recent(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn seen_is_idempotent() {
        let (router, _store) = router(ClearPolicy::Anyone);
        let conn = ConnectionId::new();
        let out = router
            .on_message(conn, None, MessageDraft::text("alice", "hello"))
            .await
            .unwrap();
        let id = broadcast_message(&out).id;

        let first = router.on_seen(conn, id).await.unwrap();
        assert_eq!(
            first,
            vec![Outbound::all(ServerEvent::MessageStatusUpdated {
                message_id: id,
                status: MessageStatus::Seen,
            })]
        );
        assert!(router.on_seen(conn, id).await.unwrap().is_empty());
        assert!(router.on_seen(conn, Uuid::new_v4()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn clear_respects_policy() {
        let (router, store) = router("only:admin".parse().unwrap());
        let conn = ConnectionId::new();
        router
            .on_message(conn, None, MessageDraft::text("alice", "hello"))
            .await
            .unwrap();

        // Display name alone does not match when an identity is present
        let impostor = Session {
            identity: Some(Identity {
                user_id: Uuid::new_v4(),
                username: "mallory".into(),
            }),
            ..announced("admin")
        };
        let err = router.on_clear(conn, Some(&impostor)).await.unwrap_err();
        assert!(matches!(err, GatewayError::Forbidden(_)));
        assert_eq!(store.find_recent(10).await.unwrap().len(), 1);

        let admin = Session {
            identity: Some(Identity {
                user_id: Uuid::new_v4(),
                username: "admin".into(),
            }),
            ..Session::default()
        };
        let out = router.on_clear(conn, Some(&admin)).await.unwrap();
        assert_eq!(out, vec![Outbound::all(ServerEvent::ChatCleared)]);
        assert!(store.find_recent(10).await.unwrap().is_empty());
    }

    #[test]
    fn alert_uses_announced_sender() {
        let (router, _) = router(ClearPolicy::Anyone);
        let session = announced("alice");
        let out = router
            .on_alert(Some(&session), None, "fire drill".into())
            .unwrap();
        assert_eq!(
            out,
            vec![Outbound::all(ServerEvent::Alert {
                sender: "alice".into(),
                text: "fire drill".into(),
            })]
        );

        assert!(router.on_alert(None, None, "who?".into()).is_err());
        assert!(router.on_alert(Some(&session), None, " ".into()).is_err());
    }

    #[tokio::test]
    async fn store_failure_is_a_persistence_error() {
        let router = MessageRouter::new(Arc::new(DownStore), ClearPolicy::Anyone);
        let err = router
            .on_message(ConnectionId::new(), None, MessageDraft::text("alice", "hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Persistence(_)));

        let err = router.on_clear(ConnectionId::new(), None).await.unwrap_err();
        assert!(matches!(err, GatewayError::Persistence(_)));
    }
}
