//! Best-effort push of durably stored records to a recipient's live connection.
//!
//! Callers hand records over only after the store has committed them. A miss
//! in the registry is the normal offline case; the recipient will read the
//! record from the store later.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use crate::connection_manager::{Identity, PushError, Registry};
use crate::metrics::RelayMetrics;
use crate::store::MessageRecord;
use crate::websocket::ServerMessage;

/// What is being relayed
#[derive(Debug, Clone)]
pub enum RelayPayload {
    /// A newly created message
    Message(MessageRecord),
    /// `seen_by` has read everything the receiver sent them
    Seen { seen_by: Identity },
}

impl RelayPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::Seen { .. } => "seen",
        }
    }

    fn into_event(self) -> ServerMessage {
        match self {
            Self::Message(message) => ServerMessage::MessageReceived { message },
            Self::Seen { seen_by } => ServerMessage::SeenNotice { seen_by },
        }
    }
}

/// A relayable record: who it is from, who should get it, and what it carries
#[derive(Debug, Clone)]
pub struct RelayRecord {
    pub sender: Identity,
    pub receiver: Identity,
    pub payload: RelayPayload,
}

impl RelayRecord {
    pub fn message(record: MessageRecord) -> Self {
        Self {
            sender: record.sender.clone(),
            receiver: record.receiver.clone(),
            payload: RelayPayload::Message(record),
        }
    }

    /// Seen-receipt from `reader` back to the party whose messages were read
    pub fn seen(reader: impl Into<Identity>, original_sender: impl Into<Identity>) -> Self {
        let reader = reader.into();
        Self {
            sender: reader.clone(),
            receiver: original_sender.into(),
            payload: RelayPayload::Seen { seen_by: reader },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Pushed onto the recipient's current connection
    Pushed { connection_id: Uuid },
    /// Recipient not online; nothing to do
    Offline,
    /// Recipient was online but the push did not go through
    Failed(PushError),
}

impl DeliveryOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pushed { .. } => "pushed",
            Self::Offline => "offline",
            Self::Failed(_) => "failed",
        }
    }

    pub fn is_pushed(&self) -> bool {
        matches!(self, Self::Pushed { .. })
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RelayStats {
    pub pushed: u64,
    pub offline: u64,
    pub failed: u64,
}

pub struct MessageRelay {
    registry: Arc<Registry>,
    push_timeout: Duration,
    pushed: AtomicU64,
    offline: AtomicU64,
    failed: AtomicU64,
}

impl MessageRelay {
    pub fn new(registry: Arc<Registry>, push_timeout: Duration) -> Self {
        Self {
            registry,
            push_timeout,
            pushed: AtomicU64::new(0),
            offline: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Push `record` to the receiver's live connection, if there is one.
    ///
    /// At most one push per call, no retry. The registry lock is released
    /// before the push. A failed push is left to the connection's own
    /// disconnect path.
    #[tracing::instrument(
        name = "relay.deliver",
        skip(self, record),
        fields(
            kind = record.payload.kind(),
            sender = %record.sender,
            receiver = %record.receiver
        )
    )]
    pub async fn deliver(&self, record: RelayRecord) -> DeliveryOutcome {
        let kind = record.payload.kind();

        let outcome = match self.registry.lookup(&record.receiver) {
            None => {
                self.offline.fetch_add(1, Ordering::Relaxed);
                DeliveryOutcome::Offline
            }
            Some(handle) => {
                match handle
                    .push(record.payload.into_event(), self.push_timeout)
                    .await
                {
                    Ok(()) => {
                        self.pushed.fetch_add(1, Ordering::Relaxed);
                        DeliveryOutcome::Pushed {
                            connection_id: handle.id,
                        }
                    }
                    Err(e) => {
                        tracing::warn!(
                            connection_id = %handle.id,
                            error = %e,
                            "Relay push failed"
                        );
                        self.failed.fetch_add(1, Ordering::Relaxed);
                        DeliveryOutcome::Failed(e)
                    }
                }
            }
        };

        RelayMetrics::record(kind, outcome.as_str());
        tracing::debug!(outcome = outcome.as_str(), "Relay finished");
        outcome
    }

    pub fn stats(&self) -> RelayStats {
        RelayStats {
            pushed: self.pushed.load(Ordering::Relaxed),
            offline: self.offline.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection_manager::ConnectionHandle;
    use crate::store::NewMessage;
    use crate::websocket::OutboundMessage;
    use tokio::sync::mpsc;

    fn connection() -> (Arc<ConnectionHandle>, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel(8);
        (Arc::new(ConnectionHandle::new(tx)), rx)
    }

    fn hi(sender: &str, receiver: &str) -> MessageRecord {
        let draft = NewMessage {
            text: Some("hi".to_string()),
            image: None,
        };
        MessageRecord::from_draft(sender, receiver, draft.validated().unwrap())
    }

    #[tokio::test]
    async fn test_offline_recipient_is_not_an_error() {
        let registry = Arc::new(Registry::new());
        let relay = MessageRelay::new(registry, Duration::from_millis(50));

        let outcome = relay.deliver(RelayRecord::message(hi("alice", "bob"))).await;
        assert_eq!(outcome, DeliveryOutcome::Offline);
        assert_eq!(relay.stats().offline, 1);
    }

    #[tokio::test]
    async fn test_online_recipient_gets_exactly_one_push() {
        let registry = Arc::new(Registry::new());
        let (alice, mut alice_rx) = connection();
        let (bob, mut bob_rx) = connection();
        registry.register("alice", &alice);
        registry.register("bob", &bob);

        let relay = MessageRelay::new(registry, Duration::from_millis(50));
        let record = hi("alice", "bob");
        let outcome = relay.deliver(RelayRecord::message(record.clone())).await;

        assert_eq!(outcome, DeliveryOutcome::Pushed { connection_id: bob.id });
        match bob_rx.try_recv() {
            Ok(OutboundMessage::Event(ServerMessage::MessageReceived { message })) => {
                assert_eq!(message.id, record.id);
                assert_eq!(message.text, "hi");
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert!(bob_rx.try_recv().is_err());
        assert!(alice_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_seen_notice_goes_to_original_sender() {
        let registry = Arc::new(Registry::new());
        let (alice, mut alice_rx) = connection();
        registry.register("alice", &alice);

        let relay = MessageRelay::new(registry, Duration::from_millis(50));
        let record = RelayRecord::seen("bob", "alice");
        assert_eq!(record.sender, "bob");
        assert_eq!(record.receiver, "alice");

        assert!(relay.deliver(record).await.is_pushed());
        match alice_rx.try_recv() {
            Ok(OutboundMessage::Event(ServerMessage::SeenNotice { seen_by })) => {
                assert_eq!(seen_by, "bob");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_push_goes_to_current_handle_after_reconnect() {
        let registry = Arc::new(Registry::new());
        let (old, mut old_rx) = connection();
        let (new, mut new_rx) = connection();
        registry.register("bob", &old);
        registry.register("bob", &new);

        let relay = MessageRelay::new(registry, Duration::from_millis(50));
        relay.deliver(RelayRecord::message(hi("alice", "bob"))).await;

        assert!(old_rx.try_recv().is_err());
        assert!(new_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_closed_connection_reports_failure_without_retry() {
        let registry = Arc::new(Registry::new());
        let (bob, bob_rx) = connection();
        registry.register("bob", &bob);
        drop(bob_rx);

        let relay = MessageRelay::new(registry.clone(), Duration::from_millis(50));
        let outcome = relay.deliver(RelayRecord::message(hi("alice", "bob"))).await;

        assert_eq!(outcome, DeliveryOutcome::Failed(PushError::Closed));
        // Callers keep the outcome around after logging it
        let kept = outcome.clone();
        assert_eq!(kept.as_str(), "failed");
        assert_eq!(kept, outcome);
        assert_eq!(relay.stats().failed, 1);
        // The relay leaves cleanup to the connection's disconnect path
        assert!(registry.is_online("bob"));
    }
}
