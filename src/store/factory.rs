//! Message store factory

use std::sync::Arc;

use crate::config::StoreConfig;
use crate::postgres::PostgresPool;

use super::backend::MessageStore;
use super::memory_backend::MemoryMessageStore;
use super::postgres_backend::PostgresMessageStore;

/// Create a message store based on configuration.
///
/// Returns the appropriate backend implementation based on the `backend` setting:
/// - `"postgres"`: Returns a `PostgresMessageStore` if a PostgreSQL pool is provided
/// - `"memory"` (default): Returns a `MemoryMessageStore`
pub fn create_message_store(
    settings: &StoreConfig,
    postgres_pool: Option<&PostgresPool>,
) -> Arc<dyn MessageStore> {
    match settings.backend.as_str() {
        "postgres" => {
            if let Some(pool) = postgres_pool {
                tracing::info!(backend = "postgres", "Creating PostgreSQL message store");
                Arc::new(PostgresMessageStore::new(pool.pool().clone()))
            } else {
                tracing::warn!(
                    "PostgreSQL store requested but no pool provided, falling back to memory"
                );
                Arc::new(MemoryMessageStore::new())
            }
        }
        _ => {
            tracing::info!(backend = "memory", "Creating memory message store");
            Arc::new(MemoryMessageStore::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_is_default() {
        let store = create_message_store(&StoreConfig::default(), None);
        assert_eq!(store.backend_type(), "memory");
    }

    #[test]
    fn test_postgres_without_pool_falls_back() {
        let config = StoreConfig {
            backend: "postgres".to_string(),
        };
        let store = create_message_store(&config, None);
        assert_eq!(store.backend_type(), "memory");
    }
}
