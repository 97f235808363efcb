use async_trait::async_trait;
use uuid::Uuid;

use huddle_db::{MessageStore, StoreError};
use huddle_types::models::{Message, NewMessage};

/// Store whose every call fails, to exercise degraded paths.
pub struct DownStore;

fn down() -> StoreError {
    StoreError::Unavailable("connection refused".into())
}

#[async_trait]
impl MessageStore for DownStore {
    async fn insert(&self, _: NewMessage) -> Result<Message, StoreError> {
        Err(down())
    }

    async fn find_recent(&self, _: usize) -> Result<Vec<Message>, StoreError> {
        Err(down())
    }

    async fn find_by_id(&self, _: Uuid) -> Result<Option<Message>, StoreError> {
        Err(down())
    }

    async fn mark_seen(&self, _: Uuid) -> Result<bool, StoreError> {
        Err(down())
    }

    async fn delete_all(&self) -> Result<u64, StoreError> {
        Err(down())
    }
}
