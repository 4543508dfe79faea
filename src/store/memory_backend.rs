//! In-memory message store using DashMap.
//!
//! Messages live in process memory and are lost on restart. Suitable for
//! development and tests; production deployments use the PostgreSQL backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use super::backend::{MessageStore, StoreError};
use super::models::{MessageRecord, NewMessage};

struct StoredMessage {
    /// Insertion order; timestamps can tie
    seq: u64,
    record: MessageRecord,
}

/// In-memory message store.
pub struct MemoryMessageStore {
    messages: DashMap<Uuid, StoredMessage>,
    next_seq: AtomicU64,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self {
            messages: DashMap::new(),
            next_seq: AtomicU64::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl Default for MemoryMessageStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    fn backend_type(&self) -> &'static str {
        "memory"
    }

    async fn create_message(
        &self,
        sender: &str,
        receiver: &str,
        draft: NewMessage,
    ) -> Result<MessageRecord, StoreError> {
        let record = MessageRecord::from_draft(sender, receiver, draft.validated()?);
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);

        self.messages.insert(
            record.id,
            StoredMessage {
                seq,
                record: record.clone(),
            },
        );

        tracing::debug!(message_id = %record.id, sender = %sender, receiver = %receiver, "Message stored");
        Ok(record)
    }

    async fn conversation(&self, a: &str, b: &str) -> Result<Vec<MessageRecord>, StoreError> {
        let mut found: Vec<(u64, MessageRecord)> = self
            .messages
            .iter()
            .filter(|entry| {
                let r = &entry.value().record;
                (r.sender == a && r.receiver == b) || (r.sender == b && r.receiver == a)
            })
            .map(|entry| (entry.value().seq, entry.value().record.clone()))
            .collect();

        found.sort_by_key(|(seq, _)| *seq);
        Ok(found.into_iter().map(|(_, record)| record).collect())
    }

    async fn mark_seen(&self, receiver: &str, sender: &str) -> Result<u64, StoreError> {
        let now = Utc::now();
        let mut updated = 0u64;

        for mut entry in self.messages.iter_mut() {
            let record = &mut entry.value_mut().record;
            if record.sender == sender && record.receiver == receiver && !record.seen {
                record.seen = true;
                record.updated_at = now;
                updated += 1;
            }
        }

        Ok(updated)
    }

    async fn get(&self, id: Uuid) -> Result<Option<MessageRecord>, StoreError> {
        Ok(self.messages.get(&id).map(|entry| entry.value().record.clone()))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.messages.remove(&id).is_some())
    }

    async fn unread_counts(&self, receiver: &str) -> Result<HashMap<String, u64>, StoreError> {
        let mut counts = HashMap::new();
        for entry in self.messages.iter() {
            let record = &entry.value().record;
            if record.receiver == receiver && !record.seen {
                *counts.entry(record.sender.clone()).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }
}
