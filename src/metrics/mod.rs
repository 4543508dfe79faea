//! Prometheus metrics for the relay service.
//!
//! - Connection metrics (live connections, online users, lifetimes)
//! - Presence metrics (broadcasts, per-connection push failures)
//! - Relay metrics (pushed / offline / failed by payload kind)
//! - Heartbeat metrics (sweep duration, idle evictions)

mod helpers;

pub use helpers::{
    encode_metrics, ConnectionMetrics, HeartbeatMetrics, PresenceMetrics, RelayMetrics,
};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "chat_relay";

lazy_static! {
    // ============================================================================
    // Connection Metrics
    // ============================================================================

    /// Number of live WebSocket connections (identified or not)
    pub static ref CONNECTIONS_TOTAL: IntGauge = register_int_gauge!(
        format!("{}_connections_total", METRIC_PREFIX),
        "Number of live WebSocket connections"
    ).unwrap();

    /// Number of identities currently online
    pub static ref USERS_ONLINE: IntGauge = register_int_gauge!(
        format!("{}_users_online", METRIC_PREFIX),
        "Number of identities currently online"
    ).unwrap();

    pub static ref WS_CONNECTIONS_OPENED: IntCounter = register_int_counter!(
        format!("{}_ws_connections_opened_total", METRIC_PREFIX),
        "Total WebSocket connections opened"
    ).unwrap();

    pub static ref WS_CONNECTIONS_CLOSED: IntCounter = register_int_counter!(
        format!("{}_ws_connections_closed_total", METRIC_PREFIX),
        "Total WebSocket connections closed"
    ).unwrap();

    pub static ref WS_CONNECTION_DURATION: Histogram = register_histogram!(
        format!("{}_ws_connection_duration_seconds", METRIC_PREFIX),
        "WebSocket connection lifetime in seconds",
        vec![1.0, 10.0, 60.0, 300.0, 900.0, 3600.0, 14400.0]
    ).unwrap();

    // ============================================================================
    // Presence Metrics
    // ============================================================================

    /// Presence broadcasts fired (one per net change of the online set)
    pub static ref PRESENCE_BROADCASTS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_presence_broadcasts_total", METRIC_PREFIX),
        "Total presence broadcasts"
    ).unwrap();

    /// Presence pushes that did not reach a connection
    pub static ref PRESENCE_PUSH_FAILURES_TOTAL: IntCounter = register_int_counter!(
        format!("{}_presence_push_failures_total", METRIC_PREFIX),
        "Total presence pushes that failed or timed out"
    ).unwrap();

    pub static ref PRESENCE_BROADCAST_LATENCY: Histogram = register_histogram!(
        format!("{}_presence_broadcast_latency_seconds", METRIC_PREFIX),
        "Time to fan a presence update out to every connection",
        vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]
    ).unwrap();

    // ============================================================================
    // Relay Metrics
    // ============================================================================

    /// Relay outcomes by payload kind ("message" / "seen") and outcome
    pub static ref RELAY_OUTCOMES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_relay_outcomes_total", METRIC_PREFIX),
        "Relay outcomes by payload kind",
        &["kind", "outcome"]
    ).unwrap();

    // ============================================================================
    // Heartbeat Metrics
    // ============================================================================

    pub static ref HEARTBEAT_DURATION_MS: Histogram = register_histogram!(
        format!("{}_heartbeat_duration_ms", METRIC_PREFIX),
        "Heartbeat sweep duration in milliseconds",
        vec![1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0]
    ).unwrap();

    /// Connections asked to close after exceeding the idle timeout
    pub static ref IDLE_EVICTIONS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_idle_evictions_total", METRIC_PREFIX),
        "Total connections evicted for inactivity"
    ).unwrap();
}
