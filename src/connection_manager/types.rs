//! Connection handle and related types

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Notify};
use uuid::Uuid;

use crate::websocket::{OutboundMessage, ServerMessage};

/// Opaque name of an authenticated party.
pub type Identity = String;

/// Why a push to a connection did not land in its outbound buffer
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PushError {
    #[error("connection closed")]
    Closed,
    #[error("push timed out after {0:?}")]
    TimedOut(Duration),
}

/// Handle for a single WebSocket connection
pub struct ConnectionHandle {
    pub id: Uuid,
    pub sender: mpsc::Sender<OutboundMessage>,
    pub connected_at: DateTime<Utc>,
    /// Last activity timestamp (Unix seconds)
    last_activity: AtomicI64,
    close_requested: Notify,
}

impl ConnectionHandle {
    pub fn new(sender: mpsc::Sender<OutboundMessage>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            sender,
            connected_at: now,
            last_activity: AtomicI64::new(now.timestamp()),
            close_requested: Notify::new(),
        }
    }

    pub fn update_activity(&self) {
        self.last_activity
            .store(Utc::now().timestamp(), Ordering::Relaxed);
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.last_activity.load(Ordering::Relaxed), 0)
            .unwrap_or_else(Utc::now)
    }

    #[cfg(test)]
    pub(crate) fn backdate_activity(&self, secs: i64) {
        self.last_activity
            .store(Utc::now().timestamp() - secs, Ordering::Relaxed);
    }

    pub fn is_idle_for(&self, timeout_secs: u64) -> bool {
        let idle = Utc::now().signed_duration_since(self.last_activity());
        idle > chrono::Duration::seconds(timeout_secs as i64)
    }

    /// Send with an upper bound on how long a full buffer may hold us up
    pub async fn push(&self, message: ServerMessage, limit: Duration) -> Result<(), PushError> {
        self.push_outbound(OutboundMessage::Event(message), limit).await
    }

    pub async fn push_outbound(
        &self,
        message: OutboundMessage,
        limit: Duration,
    ) -> Result<(), PushError> {
        match tokio::time::timeout(limit, self.sender.send(message)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(PushError::Closed),
            Err(_) => Err(PushError::TimedOut(limit)),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Ask the owning connection task to run its disconnect transition
    pub fn request_close(&self) {
        self.close_requested.notify_one();
    }

    /// Resolves once `request_close` has been called
    pub async fn close_requested(&self) {
        self.close_requested.notified().await;
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("connected_at", &self.connected_at)
            .finish()
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ConnectionHandle {}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_push_to_dropped_receiver_is_closed() {
        let (tx, rx) = mpsc::channel(1);
        let handle = ConnectionHandle::new(tx);
        drop(rx);

        let result = handle.push(ServerMessage::Pong, Duration::from_millis(50)).await;
        assert_eq!(result, Err(PushError::Closed));
        assert!(handle.is_closed());
    }

    #[tokio::test]
    async fn test_push_to_full_buffer_times_out() {
        let (tx, _rx) = mpsc::channel(1);
        let handle = ConnectionHandle::new(tx);

        handle.push(ServerMessage::Pong, Duration::from_millis(50)).await.unwrap();
        let result = handle.push(ServerMessage::Pong, Duration::from_millis(20)).await;
        assert!(matches!(result, Err(PushError::TimedOut(_))));
    }

    #[tokio::test]
    async fn test_close_request_is_remembered() {
        let (tx, _rx) = mpsc::channel(1);
        let handle = ConnectionHandle::new(tx);

        // Requested before anyone waits; the permit must still be delivered
        handle.request_close();
        tokio::time::timeout(Duration::from_millis(100), handle.close_requested())
            .await
            .expect("close request should be observed");
    }

    #[test]
    fn test_idle_detection() {
        let (tx, _rx) = mpsc::channel(1);
        let handle = ConnectionHandle::new(tx);
        assert!(!handle.is_idle_for(60));

        handle.backdate_activity(120);
        assert!(handle.is_idle_for(60));

        handle.update_activity();
        assert!(!handle.is_idle_for(60));
    }
}
