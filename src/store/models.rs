//! Persisted message records and their validation rules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::StoreError;

/// Longest text body accepted, in characters (after trimming)
pub const MAX_TEXT_CHARS: usize = 1000;

/// A message as the durable store holds it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageRecord {
    pub id: Uuid,
    pub sender: String,
    pub receiver: String,
    #[serde(default)]
    pub text: String,
    /// URL of an already uploaded image, empty when absent
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub seen: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MessageRecord {
    /// Build a fresh, unseen record from a validated draft
    pub fn from_draft(sender: &str, receiver: &str, draft: NewMessage) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            sender: sender.to_string(),
            receiver: receiver.to_string(),
            text: draft.text.unwrap_or_default(),
            image: draft.image.unwrap_or_default(),
            seen: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Request body for creating a message
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewMessage {
    pub text: Option<String>,
    pub image: Option<String>,
}

impl NewMessage {
    /// Trim the text and enforce "text or image, text within bounds"
    pub fn validated(self) -> Result<Self, StoreError> {
        let text = self
            .text
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        let image = self
            .image
            .map(|i| i.trim().to_string())
            .filter(|i| !i.is_empty());

        if text.is_none() && image.is_none() {
            return Err(StoreError::Validation(
                "Message must contain text or image".to_string(),
            ));
        }

        if let Some(ref t) = text {
            if t.chars().count() > MAX_TEXT_CHARS {
                return Err(StoreError::Validation(format!(
                    "Message cannot exceed {} characters",
                    MAX_TEXT_CHARS
                )));
            }
        }

        Ok(Self { text, image })
    }
}
