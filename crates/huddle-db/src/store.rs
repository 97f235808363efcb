//! The message store interface consumed by the gateway, plus its two
//! backends.
//!
//! The gateway only relies on read-your-writes for the inserting flow: a
//! message returned by `insert` is visible to `find_by_id` right away.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, error};
use uuid::Uuid;

use huddle_types::models::{Message, MessageBody, NewMessage, ReplySnapshot};

use crate::Database;
use crate::models::MessageRow;

/// Fixed-width so that lexical order matches chronological order in SQLite.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] anyhow::Error),
    #[error("store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("corrupt message {id}: {reason}")]
    Corrupt { id: String, reason: String },
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a message. The store assigns `id`, `created_at` and
    /// `seen = false`, and returns the stored record.
    async fn insert(&self, message: NewMessage) -> Result<Message, StoreError>;

    /// The newest `limit` messages, oldest first.
    async fn find_recent(&self, limit: usize) -> Result<Vec<Message>, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Message>, StoreError>;

    /// Returns true if this call flipped the flag.
    async fn mark_seen(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Returns the number of deleted messages.
    async fn delete_all(&self) -> Result<u64, StoreError>;
}

// -- SQLite --

/// `MessageStore` over the SQLite `Database`. Every call runs on the
/// blocking pool.
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Database>,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self { db: Arc::new(db) }
    }
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn insert(&self, message: NewMessage) -> Result<Message, StoreError> {
        let id = Uuid::new_v4();
        let row = to_row(id, &message, Utc::now());

        let db = self.db.clone();
        let stored_at = tokio::task::spawn_blocking(move || db.insert_message(&row)).await??;

        let created_at = parse_timestamp(&id.to_string(), &stored_at)?;
        debug!("Stored message {} ({})", id, message.body.kind());

        Ok(Message {
            id,
            author: message.author,
            avatar_ref: message.avatar_ref,
            body: message.body,
            reply_to: message.reply_to,
            seen: false,
            created_at,
        })
    }

    async fn find_recent(&self, limit: usize) -> Result<Vec<Message>, StoreError> {
        let db = self.db.clone();
        let limit = u32::try_from(limit).unwrap_or(u32::MAX);
        let rows = tokio::task::spawn_blocking(move || db.recent_messages(limit)).await??;
        rows.into_iter().map(from_row).collect()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Message>, StoreError> {
        let db = self.db.clone();
        let row = tokio::task::spawn_blocking(move || db.get_message(&id.to_string())).await??;
        row.map(from_row).transpose()
    }

    async fn mark_seen(&self, id: Uuid) -> Result<bool, StoreError> {
        let db = self.db.clone();
        let flipped = tokio::task::spawn_blocking(move || db.mark_seen(&id.to_string())).await??;
        Ok(flipped)
    }

    async fn delete_all(&self) -> Result<u64, StoreError> {
        let db = self.db.clone();
        let deleted = tokio::task::spawn_blocking(move || db.delete_all_messages()).await??;
        Ok(deleted as u64)
    }
}

fn to_row(id: Uuid, message: &NewMessage, created_at: DateTime<Utc>) -> MessageRow {
    MessageRow {
        id: id.to_string(),
        author: message.author.clone(),
        avatar_ref: message.avatar_ref.clone(),
        body_kind: message.body.kind().to_string(),
        body_value: message.body.value().to_string(),
        reply_author: message.reply_to.as_ref().map(|r| r.author.clone()),
        reply_text: message.reply_to.as_ref().map(|r| r.text.clone()),
        seen: false,
        created_at: created_at.format(TIMESTAMP_FORMAT).to_string(),
    }
}

fn from_row(row: MessageRow) -> Result<Message, StoreError> {
    let id = row.id.parse::<Uuid>().map_err(|e| StoreError::Corrupt {
        id: row.id.clone(),
        reason: e.to_string(),
    })?;
    let created_at = parse_timestamp(&row.id, &row.created_at)?;
    let body = MessageBody::from_parts(&row.body_kind, row.body_value).ok_or_else(|| {
        error!("Unknown body kind '{}' on message {}", row.body_kind, row.id);
        StoreError::Corrupt {
            id: row.id.clone(),
            reason: format!("unknown body kind '{}'", row.body_kind),
        }
    })?;
    let reply_to = match (row.reply_author, row.reply_text) {
        (Some(author), Some(text)) => Some(ReplySnapshot { author, text }),
        _ => None,
    };

    Ok(Message {
        id,
        author: row.author,
        avatar_ref: row.avatar_ref,
        body,
        reply_to,
        seen: row.seen,
        created_at,
    })
}

fn parse_timestamp(id: &str, raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt {
            id: id.to_string(),
            reason: format!("bad created_at '{}': {}", raw, e),
        })
}

// -- In-memory --

/// `MessageStore` kept in process memory. Same ordering rules as the
/// SQLite backend; contents are lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    messages: Mutex<Vec<Message>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<Message>>, StoreError> {
        self.messages
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("memory store lock poisoned: {}", e)))
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn insert(&self, message: NewMessage) -> Result<Message, StoreError> {
        let mut messages = self.lock()?;

        let now = Utc::now();
        let created_at = match messages.last() {
            Some(last) if last.created_at > now => last.created_at,
            _ => now,
        };

        let stored = Message {
            id: Uuid::new_v4(),
            author: message.author,
            avatar_ref: message.avatar_ref,
            body: message.body,
            reply_to: message.reply_to,
            seen: false,
            created_at,
        };
        messages.push(stored.clone());
        Ok(stored)
    }

    async fn find_recent(&self, limit: usize) -> Result<Vec<Message>, StoreError> {
        let messages = self.lock()?;
        let start = messages.len().saturating_sub(limit);
        Ok(messages[start..].to_vec())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Message>, StoreError> {
        Ok(self.lock()?.iter().find(|m| m.id == id).cloned())
    }

    async fn mark_seen(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut messages = self.lock()?;
        match messages.iter_mut().find(|m| m.id == id) {
            Some(m) if !m.seen => {
                m.seen = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_all(&self) -> Result<u64, StoreError> {
        let mut messages = self.lock()?;
        let deleted = messages.len() as u64;
        messages.clear();
        Ok(deleted)
    }
}
