//! PostgreSQL-based message store.
//!
//! Table structure:
//! - `messages` - one row per message, indexed by (sender, receiver) and creation time

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::backend::{MessageStore, StoreError};
use super::models::{MessageRecord, NewMessage};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS messages (
        id          UUID PRIMARY KEY,
        sender      TEXT NOT NULL,
        receiver    TEXT NOT NULL,
        text        TEXT NOT NULL DEFAULT '',
        image       TEXT NOT NULL DEFAULT '',
        seen        BOOLEAN NOT NULL DEFAULT FALSE,
        created_at  TIMESTAMPTZ NOT NULL,
        updated_at  TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_messages_pair ON messages (sender, receiver)",
    "CREATE INDEX IF NOT EXISTS idx_messages_created_at ON messages (created_at DESC)",
];

type MessageRow = (
    Uuid,
    String,
    String,
    String,
    String,
    bool,
    DateTime<Utc>,
    DateTime<Utc>,
);

fn into_record(row: MessageRow) -> MessageRecord {
    let (id, sender, receiver, text, image, seen, created_at, updated_at) = row;
    MessageRecord {
        id,
        sender,
        receiver,
        text,
        image,
        seen,
        created_at,
        updated_at,
    }
}

/// PostgreSQL message store.
pub struct PostgresMessageStore {
    pool: PgPool,
}

impl PostgresMessageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the `messages` table and its indexes if they do not exist yet.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::info!("Message schema ready");
        Ok(())
    }
}

#[async_trait]
impl MessageStore for PostgresMessageStore {
    fn backend_type(&self) -> &'static str {
        "postgres"
    }

    async fn create_message(
        &self,
        sender: &str,
        receiver: &str,
        draft: NewMessage,
    ) -> Result<MessageRecord, StoreError> {
        let record = MessageRecord::from_draft(sender, receiver, draft.validated()?);

        sqlx::query(
            r#"
            INSERT INTO messages (id, sender, receiver, text, image, seen, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(record.id)
        .bind(&record.sender)
        .bind(&record.receiver)
        .bind(&record.text)
        .bind(&record.image)
        .bind(record.seen)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(record)
    }

    async fn conversation(&self, a: &str, b: &str) -> Result<Vec<MessageRecord>, StoreError> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            r#"
            SELECT id, sender, receiver, text, image, seen, created_at, updated_at
            FROM messages
            WHERE (sender = $1 AND receiver = $2) OR (sender = $2 AND receiver = $1)
            ORDER BY created_at ASC
            "#,
        )
        .bind(a)
        .bind(b)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(into_record).collect())
    }

    async fn mark_seen(&self, receiver: &str, sender: &str) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET seen = TRUE, updated_at = NOW()
            WHERE sender = $1 AND receiver = $2 AND seen = FALSE
            "#,
        )
        .bind(sender)
        .bind(receiver)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn get(&self, id: Uuid) -> Result<Option<MessageRecord>, StoreError> {
        let row: Option<MessageRow> = sqlx::query_as(
            r#"
            SELECT id, sender, receiver, text, image, seen, created_at, updated_at
            FROM messages
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(into_record))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM messages WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn unread_counts(&self, receiver: &str) -> Result<HashMap<String, u64>, StoreError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT sender, COUNT(*)
            FROM messages
            WHERE receiver = $1 AND seen = FALSE
            GROUP BY sender
            "#,
        )
        .bind(receiver)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(sender, count)| (sender, count.max(0) as u64))
            .collect())
    }
}
