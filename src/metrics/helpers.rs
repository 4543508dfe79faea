//! Metrics helper structs for convenient metric recording

use prometheus::{Encoder, TextEncoder};

use super::{
    CONNECTIONS_TOTAL, HEARTBEAT_DURATION_MS, IDLE_EVICTIONS_TOTAL, PRESENCE_BROADCASTS_TOTAL,
    PRESENCE_BROADCAST_LATENCY, PRESENCE_PUSH_FAILURES_TOTAL, RELAY_OUTCOMES_TOTAL,
    USERS_ONLINE, WS_CONNECTIONS_CLOSED, WS_CONNECTIONS_OPENED, WS_CONNECTION_DURATION,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording connection lifecycle metrics
pub struct ConnectionMetrics;

impl ConnectionMetrics {
    pub fn record_opened() {
        WS_CONNECTIONS_OPENED.inc();
    }

    pub fn record_closed(duration_secs: f64) {
        WS_CONNECTIONS_CLOSED.inc();
        WS_CONNECTION_DURATION.observe(duration_secs);
    }

    /// Refresh gauges from current counts
    pub fn set_gauges(live_connections: usize, online_users: usize) {
        CONNECTIONS_TOTAL.set(live_connections as i64);
        USERS_ONLINE.set(online_users as i64);
    }
}

/// Helper struct for recording presence metrics
pub struct PresenceMetrics;

impl PresenceMetrics {
    pub fn record_broadcast(elapsed_secs: f64, failed: u64) {
        PRESENCE_BROADCASTS_TOTAL.inc();
        PRESENCE_BROADCAST_LATENCY.observe(elapsed_secs);
        if failed > 0 {
            PRESENCE_PUSH_FAILURES_TOTAL.inc_by(failed);
        }
    }
}

/// Helper struct for recording relay outcomes
pub struct RelayMetrics;

impl RelayMetrics {
    pub fn record(kind: &str, outcome: &str) {
        RELAY_OUTCOMES_TOTAL.with_label_values(&[kind, outcome]).inc();
    }
}

/// Helper struct for recording heartbeat metrics
pub struct HeartbeatMetrics;

impl HeartbeatMetrics {
    pub fn record_duration_ms(ms: u64) {
        HEARTBEAT_DURATION_MS.observe(ms as f64);
    }

    pub fn record_evictions(count: u64) {
        IDLE_EVICTIONS_TOTAL.inc_by(count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_contains_recorded_metrics() {
        RelayMetrics::record("message", "offline");
        PresenceMetrics::record_broadcast(0.001, 0);

        let output = encode_metrics().unwrap();
        assert!(output.contains("chat_relay_relay_outcomes_total"));
        assert!(output.contains("chat_relay_presence_broadcasts_total"));
    }
}
