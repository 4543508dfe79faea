use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::auth::{extract_token, Claims};
use crate::connection_manager::ConnectionHandle;
use crate::metrics::ConnectionMetrics;
use crate::server::AppState;
use crate::session::Session;

use super::message::{ClientMessage, OutboundMessage, ServerMessage};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// WebSocket upgrade handler
#[tracing::instrument(
    name = "ws.upgrade",
    skip(ws, state, query, headers),
    fields(has_query_token = query.token.is_some())
)]
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
) -> Response {
    let token = extract_token(query.token.as_deref(), &headers);

    let claims = match token {
        Some(token) => match state.jwt_validator.validate(&token) {
            Ok(claims) => Some(claims),
            Err(e) => {
                tracing::warn!(error = %e, "JWT validation failed");
                return (StatusCode::UNAUTHORIZED, "Invalid token").into_response();
            }
        },
        None if state.settings.websocket.require_auth => {
            return (StatusCode::UNAUTHORIZED, "Missing authentication token").into_response();
        }
        None => None,
    };

    if let Some(ref claims) = claims {
        tracing::info!(identity = %claims.sub, "WebSocket upgrade requested");
    }

    ws.on_upgrade(move |socket| handle_socket(socket, state, claims))
}

/// Drive one physical connection from upgrade to close
#[tracing::instrument(name = "ws.connection", skip_all)]
async fn handle_socket(socket: WebSocket, state: AppState, claims: Option<Claims>) {
    let connection_start = std::time::Instant::now();

    let (tx, mut rx) = mpsc::channel::<OutboundMessage>(state.settings.websocket.channel_buffer);
    let handle = Arc::new(ConnectionHandle::new(tx));
    let connection_id = handle.id;
    let push_timeout = state.settings.websocket.push_timeout();

    let mut session = Session::open(handle.clone(), state.presence.clone());
    if state.settings.websocket.require_auth {
        if let Some(ref claims) = claims {
            session = session.pinned_to(claims.identity());
        }
    }

    ConnectionMetrics::record_opened();
    ConnectionMetrics::set_gauges(state.presence.live_count(), state.registry.len());
    tracing::info!(connection_id = %connection_id, "WebSocket connection established");

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Writer: channel -> socket
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let frame = match msg.to_json() {
                Some(Ok(text)) => Message::Text(text.into()),
                Some(Err(e)) => {
                    tracing::error!(error = %e, "Failed to serialize message");
                    continue;
                }
                None => Message::Ping(Bytes::new()),
            };

            if ws_sender.send(frame).await.is_err() {
                break;
            }
        }
    });

    // Reader: frames are applied to the session in arrival order
    loop {
        tokio::select! {
            frame = ws_receiver.next() => {
                match frame {
                    Some(Ok(msg)) => {
                        if !process_message(msg, &mut session, push_timeout).await {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        tracing::warn!(connection_id = %connection_id, error = %e, "WebSocket receive error");
                        break;
                    }
                    None => break,
                }
            }
            _ = &mut send_task => {
                tracing::debug!(connection_id = %connection_id, "Send task completed");
                break;
            }
            _ = handle.close_requested() => {
                tracing::info!(connection_id = %connection_id, "Closing idle connection");
                break;
            }
        }
    }

    let identity = session.identity().map(str::to_string);
    session.disconnect().await;
    send_task.abort();

    let duration = connection_start.elapsed().as_secs_f64();
    ConnectionMetrics::record_closed(duration);
    ConnectionMetrics::set_gauges(state.presence.live_count(), state.registry.len());

    tracing::info!(
        connection_id = %connection_id,
        identity = ?identity,
        duration_secs = duration,
        "WebSocket connection closed"
    );
}

/// Process a received WebSocket frame.
/// Returns false if the connection should be closed
async fn process_message(msg: Message, session: &mut Session, limit: Duration) -> bool {
    let handle = session.handle().clone();

    match msg {
        Message::Text(text) => {
            handle.update_activity();

            let client_msg: ClientMessage = match serde_json::from_str(&text) {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to parse client message");
                    return reply(
                        &handle,
                        ServerMessage::error("INVALID_MESSAGE", e.to_string()),
                        limit,
                    )
                    .await;
                }
            };

            handle_client_message(client_msg, session, limit).await
        }
        Message::Binary(_) => {
            reply(
                &handle,
                ServerMessage::error("UNSUPPORTED_FORMAT", "Binary messages are not supported"),
                limit,
            )
            .await
        }
        Message::Ping(_) | Message::Pong(_) => {
            // axum answers pings itself
            handle.update_activity();
            true
        }
        Message::Close(_) => {
            tracing::debug!(connection_id = %handle.id, "Received close frame");
            false
        }
    }
}

#[tracing::instrument(
    name = "ws.message",
    skip(session, limit),
    fields(connection_id = %session.handle().id)
)]
async fn handle_client_message(msg: ClientMessage, session: &mut Session, limit: Duration) -> bool {
    match msg {
        ClientMessage::Identify(identity) => match session.identify(&identity).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Identify rejected");
                reply(session.handle(), ServerMessage::error(e.code(), e.to_string()), limit).await
            }
        },
        ClientMessage::Ping => reply(session.handle(), ServerMessage::Pong, limit).await,
    }
}

/// A reply that cannot be queued in time means the client stopped reading
async fn reply(handle: &ConnectionHandle, message: ServerMessage, limit: Duration) -> bool {
    match handle.push(message, limit).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(connection_id = %handle.id, error = %e, "Reply not delivered, closing");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection_manager::Registry;
    use crate::presence::PresenceBroadcaster;

    const LIMIT: Duration = Duration::from_millis(50);

    fn session(buffer: usize) -> (Session, mpsc::Receiver<OutboundMessage>) {
        let presence = Arc::new(PresenceBroadcaster::new(Arc::new(Registry::new()), LIMIT));
        let (tx, rx) = mpsc::channel(buffer);
        (Session::open(Arc::new(ConnectionHandle::new(tx)), presence), rx)
    }

    #[tokio::test]
    async fn test_ping_is_answered_with_pong() {
        let (mut session, mut rx) = session(4);

        assert!(process_message(Message::Text(r#"{"type":"ping"}"#.into()), &mut session, LIMIT).await);
        match rx.try_recv() {
            Ok(OutboundMessage::Event(ServerMessage::Pong)) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_text_gets_error_frame() {
        let (mut session, mut rx) = session(4);

        assert!(process_message(Message::Text("not json".into()), &mut session, LIMIT).await);
        match rx.try_recv() {
            Ok(OutboundMessage::Event(ServerMessage::Error { code, .. })) => {
                assert_eq!(code, "INVALID_MESSAGE");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_client_that_never_reads_is_dropped() {
        let (mut session, _rx) = session(1);
        session
            .handle()
            .push(ServerMessage::Pong, LIMIT)
            .await
            .unwrap();
        session.handle().request_close();

        // Outbound buffer is full; the reply must give up instead of blocking the reader
        let keep_open = tokio::time::timeout(
            Duration::from_secs(2),
            process_message(Message::Text(r#"{"type":"ping"}"#.into()), &mut session, LIMIT),
        )
        .await
        .expect("reader should not block on a full buffer");
        assert!(!keep_open);

        // The pending eviction is still observable once the reader is free
        tokio::time::timeout(Duration::from_millis(100), session.handle().close_requested())
            .await
            .expect("close request should be observed");
    }
}
