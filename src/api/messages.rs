//! Message endpoints.
//!
//! Every write commits to the store first and only then hands the result to
//! the relay. A store failure returns before anything is pushed.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::{AppError, Result};
use crate::relay::RelayRecord;
use crate::server::AppState;
use crate::store::{MessageRecord, NewMessage};

#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub success: bool,
    pub message: String,
    pub data: MessageRecord,
    /// Whether the receiver's live connection got the message right away
    pub delivered: bool,
}

#[derive(Debug, Serialize)]
pub struct ConversationResponse {
    pub success: bool,
    pub count: usize,
    pub messages: Vec<MessageRecord>,
}

#[derive(Debug, Serialize)]
pub struct MarkSeenResponse {
    pub success: bool,
    pub message: String,
    pub updated: u64,
}

#[derive(Debug, Serialize)]
pub struct DeleteMessageResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct UnreadEntry {
    pub sender: String,
    pub count: u64,
    pub online: bool,
}

#[derive(Debug, Serialize)]
pub struct UnreadResponse {
    pub success: bool,
    pub count: usize,
    pub data: Vec<UnreadEntry>,
}

/// POST /api/messages/{receiver}
#[tracing::instrument(
    name = "api.send_message",
    skip(state, user, draft),
    fields(sender = %user.identity())
)]
pub async fn send_message(
    State(state): State<AppState>,
    user: AuthUser,
    Path(receiver): Path<String>,
    Json(draft): Json<NewMessage>,
) -> Result<(StatusCode, Json<SendMessageResponse>)> {
    let record = state
        .store
        .create_message(user.identity(), &receiver, draft)
        .await?;

    let outcome = state.relay.deliver(RelayRecord::message(record.clone())).await;

    tracing::info!(
        message_id = %record.id,
        receiver = %receiver,
        relay = outcome.as_str(),
        "Message stored"
    );

    Ok((
        StatusCode::CREATED,
        Json(SendMessageResponse {
            success: true,
            message: "Message sent successfully".to_string(),
            data: record,
            delivered: outcome.is_pushed(),
        }),
    ))
}

/// GET /api/messages/{peer}
pub async fn get_conversation(
    State(state): State<AppState>,
    user: AuthUser,
    Path(peer): Path<String>,
) -> Result<Json<ConversationResponse>> {
    let messages = state.store.conversation(user.identity(), &peer).await?;

    Ok(Json(ConversationResponse {
        success: true,
        count: messages.len(),
        messages,
    }))
}

/// PUT /api/messages/seen/{peer}
#[tracing::instrument(
    name = "api.mark_seen",
    skip(state, user),
    fields(reader = %user.identity())
)]
pub async fn mark_seen(
    State(state): State<AppState>,
    user: AuthUser,
    Path(peer): Path<String>,
) -> Result<Json<MarkSeenResponse>> {
    let updated = state.store.mark_seen(user.identity(), &peer).await?;

    state
        .relay
        .deliver(RelayRecord::seen(user.identity(), peer.as_str()))
        .await;

    Ok(Json(MarkSeenResponse {
        success: true,
        message: "Messages marked as seen".to_string(),
        updated,
    }))
}

/// DELETE /api/messages/{id}
pub async fn delete_message(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<DeleteMessageResponse>> {
    let record = state
        .store
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Message not found".to_string()))?;

    if record.sender != user.identity() {
        return Err(AppError::Forbidden(
            "Not authorized to delete this message".to_string(),
        ));
    }

    state.store.delete(id).await?;
    tracing::info!(message_id = %id, "Message deleted");

    Ok(Json(DeleteMessageResponse {
        success: true,
        message: "Message deleted successfully".to_string(),
    }))
}

/// GET /api/messages/unread
pub async fn unread_counts(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<UnreadResponse>> {
    let counts = state.store.unread_counts(user.identity()).await?;

    let mut data: Vec<UnreadEntry> = counts
        .into_iter()
        .map(|(sender, count)| UnreadEntry {
            online: state.registry.is_online(&sender),
            sender,
            count,
        })
        .collect();
    data.sort_by(|a, b| a.sender.cmp(&b.sender));

    Ok(Json(UnreadResponse {
        success: true,
        count: data.len(),
        data,
    }))
}
