use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::sync::broadcast;

use crate::config::WebSocketConfig;
use crate::connection_manager::ConnectionHandle;
use crate::metrics::{ConnectionMetrics, HeartbeatMetrics};
use crate::presence::PresenceBroadcaster;
use crate::websocket::OutboundMessage;

/// Maximum concurrent ping sends to avoid overwhelming the system
const MAX_CONCURRENT_HEARTBEATS: usize = 1000;

/// Background task that pings live connections and evicts idle ones.
///
/// Eviction only signals the connection; its own task runs the disconnect
/// transition, so registry cleanup goes through the usual path.
pub struct HeartbeatTask {
    config: WebSocketConfig,
    presence: Arc<PresenceBroadcaster>,
    shutdown: broadcast::Receiver<()>,
}

impl HeartbeatTask {
    pub fn new(
        config: WebSocketConfig,
        presence: Arc<PresenceBroadcaster>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            config,
            presence,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        let heartbeat_interval = Duration::from_secs(self.config.heartbeat_interval.max(1));
        let cleanup_interval = Duration::from_secs(self.config.cleanup_interval.max(1));

        let mut heartbeat_timer = tokio::time::interval(heartbeat_interval);
        let mut cleanup_timer = tokio::time::interval(cleanup_interval);

        // Skip immediate first tick
        heartbeat_timer.tick().await;
        cleanup_timer.tick().await;

        tracing::info!(
            heartbeat_interval_secs = self.config.heartbeat_interval,
            cleanup_interval_secs = self.config.cleanup_interval,
            idle_timeout_secs = self.config.idle_timeout,
            "Heartbeat task started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Heartbeat task received shutdown signal");
                    break;
                }
                _ = heartbeat_timer.tick() => {
                    self.send_pings().await;
                }
                _ = cleanup_timer.tick() => {
                    if self.config.eviction_enabled() {
                        self.evict_idle();
                    }
                }
            }
        }

        tracing::info!("Heartbeat task stopped");
    }

    async fn send_pings(&self) {
        let connections = self.presence.live_connections();
        let total = connections.len();

        ConnectionMetrics::set_gauges(total, self.presence.registry().len());

        if total == 0 {
            return;
        }

        let start = Instant::now();
        let limit = self.config.push_timeout();
        let mut failed = 0usize;

        for batch in connections.chunks(MAX_CONCURRENT_HEARTBEATS) {
            let results = join_all(batch.iter().map(|handle| ping(handle, limit))).await;
            failed += results.into_iter().filter(|ok| !ok).count();
        }

        let elapsed_ms = start.elapsed().as_millis() as u64;
        HeartbeatMetrics::record_duration_ms(elapsed_ms);

        tracing::debug!(
            total,
            failed,
            elapsed_ms,
            "Heartbeat round completed"
        );

        if elapsed_ms > (self.config.heartbeat_interval * 1000 / 2) {
            tracing::warn!(
                elapsed_ms,
                heartbeat_interval_ms = self.config.heartbeat_interval * 1000,
                connections = total,
                "Heartbeat round took more than 50% of interval"
            );
        }
    }

    /// Ask every connection idle past the timeout to close. Returns how many were asked.
    fn evict_idle(&self) -> usize {
        let timeout_secs = self.config.idle_timeout;
        let mut evicted = 0;

        for handle in self.presence.live_connections() {
            if handle.is_idle_for(timeout_secs) {
                tracing::info!(
                    connection_id = %handle.id,
                    last_activity = %handle.last_activity(),
                    "Evicting idle connection"
                );
                handle.request_close();
                evicted += 1;
            }
        }

        if evicted > 0 {
            HeartbeatMetrics::record_evictions(evicted as u64);
            tracing::info!(evicted, timeout_secs, "Idle connections signalled to close");
        }

        evicted
    }
}

async fn ping(handle: &Arc<ConnectionHandle>, limit: Duration) -> bool {
    match handle.push_outbound(OutboundMessage::Ping, limit).await {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!(
                connection_id = %handle.id,
                error = %e,
                "Ping failed, connection may be dead"
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection_manager::Registry;
    use tokio::sync::mpsc;

    fn presence() -> Arc<PresenceBroadcaster> {
        Arc::new(PresenceBroadcaster::new(
            Arc::new(Registry::new()),
            Duration::from_millis(100),
        ))
    }

    #[tokio::test]
    async fn test_heartbeat_task_shutdown() {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = HeartbeatTask::new(WebSocketConfig::default(), presence(), shutdown_rx);

        let handle = tokio::spawn(async move {
            task.run().await;
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("Task should complete")
            .expect("Task should not panic");
    }

    #[tokio::test]
    async fn test_heartbeat_pings_connections() {
        let config = WebSocketConfig {
            heartbeat_interval: 1,
            cleanup_interval: 60,
            ..Default::default()
        };
        let presence = presence();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let (tx, mut rx) = mpsc::channel::<OutboundMessage>(10);
        presence.subscribe(Arc::new(ConnectionHandle::new(tx)));

        let task = HeartbeatTask::new(config, presence, shutdown_rx);
        let task_handle = tokio::spawn(async move {
            task.run().await;
        });

        let msg = tokio::time::timeout(Duration::from_secs(3), rx.recv())
            .await
            .expect("Should receive ping")
            .expect("Channel should not be closed");
        assert!(matches!(msg, OutboundMessage::Ping));

        shutdown_tx.send(()).unwrap();
        let _ = task_handle.await;
    }

    #[tokio::test]
    async fn test_evict_idle_signals_only_stale_connections() {
        let config = WebSocketConfig {
            idle_timeout: 30,
            ..Default::default()
        };
        let presence = presence();
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let (tx1, _rx1) = mpsc::channel::<OutboundMessage>(1);
        let (tx2, _rx2) = mpsc::channel::<OutboundMessage>(1);
        let stale = Arc::new(ConnectionHandle::new(tx1));
        let fresh = Arc::new(ConnectionHandle::new(tx2));
        stale.backdate_activity(120);
        presence.subscribe(stale.clone());
        presence.subscribe(fresh.clone());

        let task = HeartbeatTask::new(config, presence.clone(), shutdown_rx);
        assert_eq!(task.evict_idle(), 1);

        tokio::time::timeout(Duration::from_millis(100), stale.close_requested())
            .await
            .expect("stale connection should be asked to close");
        assert!(
            tokio::time::timeout(Duration::from_millis(50), fresh.close_requested())
                .await
                .is_err()
        );

        // Eviction leaves the presence bookkeeping to the connection task
        assert_eq!(presence.live_count(), 2);
    }
}
