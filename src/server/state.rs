use std::sync::Arc;
use std::time::Instant;

use crate::auth::JwtValidator;
use crate::config::Settings;
use crate::connection_manager::Registry;
use crate::presence::PresenceBroadcaster;
use crate::relay::MessageRelay;
use crate::store::{MemoryMessageStore, MessageStore};

/// Shared components, built once at startup and handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub jwt_validator: Arc<JwtValidator>,
    pub registry: Arc<Registry>,
    pub presence: Arc<PresenceBroadcaster>,
    pub relay: Arc<MessageRelay>,
    pub store: Arc<dyn MessageStore>,
    pub start_time: Instant,
}

impl AppState {
    /// State backed by the in-memory message store
    pub fn new(settings: Settings) -> Self {
        Self::with_store(settings, Arc::new(MemoryMessageStore::new()))
    }

    pub fn with_store(settings: Settings, store: Arc<dyn MessageStore>) -> Self {
        let push_timeout = settings.websocket.push_timeout();
        let jwt_validator = Arc::new(JwtValidator::new(&settings.jwt));
        let registry = Arc::new(Registry::new());
        let presence = Arc::new(PresenceBroadcaster::new(registry.clone(), push_timeout));
        let relay = Arc::new(MessageRelay::new(registry.clone(), push_timeout));

        Self {
            settings: Arc::new(settings),
            jwt_validator,
            registry,
            presence,
            relay,
            store,
            start_time: Instant::now(),
        }
    }
}
