//! Health check and statistics endpoints.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::relay::RelayStats;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub store: String,
    pub connections: ConnectionHealthResponse,
}

#[derive(Debug, Serialize)]
pub struct ConnectionHealthResponse {
    pub live: usize,
    pub online_users: usize,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub connections: ConnectionStats,
    pub relay: RelayStats,
}

#[derive(Debug, Serialize)]
pub struct ConnectionStats {
    /// Live sockets, identified or not
    pub live_connections: usize,
    pub online_users: usize,
    pub bound_connections: usize,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        store: state.store.backend_type().to_string(),
        connections: ConnectionHealthResponse {
            live: state.presence.live_count(),
            online_users: state.registry.len(),
        },
    })
}

pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let registry_stats = state.registry.stats();

    Json(StatsResponse {
        connections: ConnectionStats {
            live_connections: state.presence.live_count(),
            online_users: registry_stats.online_users,
            bound_connections: registry_stats.bound_connections,
        },
        relay: state.relay.stats(),
    })
}
