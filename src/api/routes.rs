use axum::{
    routing::{get, put},
    Router,
};

use crate::server::AppState;

use super::health::{health, stats};
use super::messages::{delete_message, get_conversation, mark_seen, send_message, unread_counts};
use super::metrics::prometheus_metrics;
use super::presence::online_users;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health & Stats
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/metrics", get(prometheus_metrics))
        .nest(
            "/api",
            Router::new()
                .route("/presence", get(online_users))
                .route("/messages/unread", get(unread_counts))
                .route("/messages/seen/{peer}", put(mark_seen))
                // {peer} is the receiver for POST, the peer for GET, the message id for DELETE
                .route(
                    "/messages/{peer}",
                    get(get_conversation)
                        .post(send_message)
                        .delete(delete_message),
                ),
        )
}
