//! Backend trait for durable message storage.
//!
//! The relay core never writes here; REST handlers call the store first and
//! only hand a record to the relay once the write has returned successfully.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use super::models::{MessageRecord, NewMessage};

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The message draft is not acceptable
    #[error("{0}")]
    Validation(String),

    /// PostgreSQL operation failed
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),
}

/// Durable message storage.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Backend identifier for logs and stats
    fn backend_type(&self) -> &'static str;

    /// Validate and persist a new message from `sender` to `receiver`.
    async fn create_message(
        &self,
        sender: &str,
        receiver: &str,
        draft: NewMessage,
    ) -> Result<MessageRecord, StoreError>;

    /// All messages exchanged between `a` and `b`, oldest first.
    async fn conversation(&self, a: &str, b: &str) -> Result<Vec<MessageRecord>, StoreError>;

    /// Mark every unseen message from `sender` to `receiver` as seen.
    ///
    /// Returns the number of messages updated.
    async fn mark_seen(&self, receiver: &str, sender: &str) -> Result<u64, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<MessageRecord>, StoreError>;

    /// Returns `true` if a message was deleted.
    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Unseen message counts addressed to `receiver`, keyed by sender.
    async fn unread_counts(&self, receiver: &str) -> Result<HashMap<String, u64>, StoreError>;
}
