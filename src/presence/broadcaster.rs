use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::connection_manager::{ConnectionHandle, Identity, PushError, Registry};
use crate::metrics::PresenceMetrics;
use crate::websocket::ServerMessage;

/// Result of one presence announcement
#[derive(Debug, Clone, Serialize)]
pub struct AnnounceResult {
    /// Position of this announcement in the serialized order
    pub sequence: u64,
    /// Online set that was announced
    pub online: Vec<Identity>,
    /// Connections that received the update
    pub delivered: usize,
    /// Connections whose push failed or timed out
    pub failed: usize,
}

/// Pushes the full online list to every live connection.
///
/// Registry mutations that may change the online set go through [`apply`],
/// which holds the broadcaster's turn while it mutates, snapshots and fans
/// out. Two announcements therefore never interleave, and each one reflects
/// every mutation applied before it. The registry's own lock is released
/// before any push.
///
/// [`apply`]: PresenceBroadcaster::apply
pub struct PresenceBroadcaster {
    registry: Arc<Registry>,
    /// connection_id -> handle, for every live connection (identified or not)
    connections: DashMap<Uuid, Arc<ConnectionHandle>>,
    /// Serializes mutate + snapshot + fan-out; counts announcements
    turn: Mutex<u64>,
    push_timeout: Duration,
}

impl PresenceBroadcaster {
    pub fn new(registry: Arc<Registry>, push_timeout: Duration) -> Self {
        Self {
            registry,
            connections: DashMap::new(),
            turn: Mutex::new(0),
            push_timeout,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Start delivering presence updates to `handle`
    pub fn subscribe(&self, handle: Arc<ConnectionHandle>) {
        self.connections.insert(handle.id, handle);
    }

    /// Stop delivering presence updates to a connection
    pub fn unsubscribe(&self, connection_id: Uuid) -> bool {
        self.connections.remove(&connection_id).is_some()
    }

    pub fn live_connections(&self) -> Vec<Arc<ConnectionHandle>> {
        self.connections.iter().map(|r| r.value().clone()).collect()
    }

    pub fn live_count(&self) -> usize {
        self.connections.len()
    }

    /// Apply a registry mutation and, if it reports that the online set
    /// changed, announce the resulting snapshot before anyone else may mutate.
    ///
    /// Returns the announcement, or `None` when nothing changed.
    pub async fn apply<F>(&self, mutation: F) -> Option<AnnounceResult>
    where
        F: FnOnce(&Registry) -> bool,
    {
        let mut turn = self.turn.lock().await;

        if !mutation(&self.registry) {
            return None;
        }

        *turn += 1;
        let online = self.registry.snapshot().into_iter().collect();
        Some(self.fan_out(*turn, online).await)
    }

    /// Push `online` to every live connection as one `presence_update` each.
    pub async fn announce(&self, online: Vec<Identity>) -> AnnounceResult {
        let mut turn = self.turn.lock().await;
        *turn += 1;
        self.fan_out(*turn, online).await
    }

    /// Send the current snapshot to a single connection without counting as a broadcast
    pub async fn sync(&self, handle: &ConnectionHandle) -> Result<(), PushError> {
        let _turn = self.turn.lock().await;
        let online: Vec<Identity> = self.registry.snapshot().into_iter().collect();
        handle
            .push(ServerMessage::presence(online), self.push_timeout)
            .await
    }

    #[tracing::instrument(name = "presence.announce", skip(self, online), fields(online_count = online.len()))]
    async fn fan_out(&self, sequence: u64, online: Vec<Identity>) -> AnnounceResult {
        let start = Instant::now();
        let recipients = self.live_connections();
        let message = ServerMessage::presence(online.clone());

        let pushes = recipients.iter().map(|handle| {
            let message = message.clone();
            async move {
                let result = handle.push(message, self.push_timeout).await;
                if let Err(ref e) = result {
                    tracing::debug!(
                        connection_id = %handle.id,
                        error = %e,
                        "Presence push failed"
                    );
                }
                result.is_ok()
            }
        });

        let results = join_all(pushes).await;
        let delivered = results.iter().filter(|ok| **ok).count();
        let failed = results.len() - delivered;

        PresenceMetrics::record_broadcast(start.elapsed().as_secs_f64(), failed as u64);

        tracing::debug!(
            sequence,
            delivered,
            failed,
            "Presence update announced"
        );

        AnnounceResult {
            sequence,
            online,
            delivered,
            failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::OutboundMessage;
    use tokio::sync::mpsc;

    fn connection() -> (Arc<ConnectionHandle>, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel(8);
        (Arc::new(ConnectionHandle::new(tx)), rx)
    }

    fn presence_lists(rx: &mut mpsc::Receiver<OutboundMessage>) -> Vec<Vec<String>> {
        let mut lists = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            if let OutboundMessage::Event(ServerMessage::PresenceUpdate { online }) = msg {
                lists.push(online);
            }
        }
        lists
    }

    fn broadcaster() -> PresenceBroadcaster {
        PresenceBroadcaster::new(Arc::new(Registry::new()), Duration::from_millis(100))
    }

    #[tokio::test]
    async fn test_apply_announces_to_every_live_connection() {
        let presence = broadcaster();
        let (c1, mut rx1) = connection();
        let (c2, mut rx2) = connection();
        presence.subscribe(c1.clone());
        presence.subscribe(c2.clone());

        let result = presence
            .apply(|registry| registry.register("alice", &c1))
            .await
            .expect("online set changed");

        assert_eq!(result.online, vec!["alice"]);
        assert_eq!(result.delivered, 2);
        assert_eq!(presence_lists(&mut rx1), vec![vec!["alice".to_string()]]);
        // Unidentified connections see presence too
        assert_eq!(presence_lists(&mut rx2), vec![vec!["alice".to_string()]]);
    }

    #[tokio::test]
    async fn test_apply_without_change_is_silent() {
        let presence = broadcaster();
        let (c1, mut rx1) = connection();
        presence.subscribe(c1.clone());

        presence.apply(|r| r.register("alice", &c1)).await;
        let second = presence.apply(|r| r.register("alice", &c1)).await;

        assert!(second.is_none());
        assert_eq!(presence_lists(&mut rx1).len(), 1);
    }

    #[tokio::test]
    async fn test_sequence_increases_per_announcement() {
        let presence = broadcaster();
        let (c1, _rx1) = connection();
        let (c2, _rx2) = connection();

        let first = presence.apply(|r| r.register("alice", &c1)).await.unwrap();
        let second = presence.apply(|r| r.register("bob", &c2)).await.unwrap();
        assert!(second.sequence > first.sequence);
        assert_eq!(second.online, vec!["alice", "bob"]);
    }

    #[tokio::test]
    async fn test_dead_connection_counts_as_failed() {
        let presence = broadcaster();
        let (c1, rx1) = connection();
        let (c2, mut rx2) = connection();
        presence.subscribe(c1.clone());
        presence.subscribe(c2.clone());
        drop(rx1);

        let result = presence.announce(vec!["bob".to_string()]).await;
        assert_eq!(result.delivered, 1);
        assert_eq!(result.failed, 1);
        assert_eq!(presence_lists(&mut rx2), vec![vec!["bob".to_string()]]);
    }

    #[tokio::test]
    async fn test_sync_targets_one_connection() {
        let presence = broadcaster();
        let (c1, mut rx1) = connection();
        let (c2, mut rx2) = connection();
        presence.subscribe(c1.clone());
        presence.subscribe(c2.clone());
        presence.registry().register("alice", &c1);

        presence.sync(&c2).await.unwrap();

        assert!(presence_lists(&mut rx1).is_empty());
        assert_eq!(presence_lists(&mut rx2), vec![vec!["alice".to_string()]]);
    }

    #[tokio::test]
    async fn test_unsubscribe() {
        let presence = broadcaster();
        let (c1, mut rx1) = connection();
        presence.subscribe(c1.clone());
        assert_eq!(presence.live_count(), 1);

        assert!(presence.unsubscribe(c1.id));
        assert!(!presence.unsubscribe(c1.id));

        presence.announce(vec![]).await;
        assert!(presence_lists(&mut rx1).is_empty());
    }
}
