//! Durable message storage.
//!
//! The store is the single source of truth for messages. Backends:
//!
//! - `MemoryMessageStore`: DashMap-backed, lost on restart (default)
//! - `PostgresMessageStore`: `messages` table via sqlx
//!
//! Use `create_message_store()` to pick one from configuration.

mod backend;
mod factory;
mod memory_backend;
mod models;
mod postgres_backend;

pub use backend::{MessageStore, StoreError};
pub use factory::create_message_store;
pub use memory_backend::MemoryMessageStore;
pub use models::{MessageRecord, NewMessage, MAX_TEXT_CHARS};
pub use postgres_backend::PostgresMessageStore;
