use axum::{extract::State, Json};
use serde::Serialize;

use crate::auth::AuthUser;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct PresenceResponse {
    pub success: bool,
    pub count: usize,
    pub online: Vec<String>,
}

/// GET /api/presence
pub async fn online_users(State(state): State<AppState>, _user: AuthUser) -> Json<PresenceResponse> {
    let online: Vec<String> = state.registry.snapshot().into_iter().collect();

    Json(PresenceResponse {
        success: true,
        count: online.len(),
        online,
    })
}
