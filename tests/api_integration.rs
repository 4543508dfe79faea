//! REST API integration tests
//!
//! Requests go through the full router via `oneshot`; live connections are
//! simulated with sessions on the same application state.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower::ServiceExt;

use chat_relay_service::auth::Claims;
use chat_relay_service::config::{
    JwtConfig, LoggingConfig, ServerConfig, Settings, StoreConfig, WebSocketConfig,
};
use chat_relay_service::connection_manager::ConnectionHandle;
use chat_relay_service::server::{create_app, AppState};
use chat_relay_service::session::Session;
use chat_relay_service::websocket::{OutboundMessage, ServerMessage};

const SECRET: &str = "api-test-secret";

fn test_settings() -> Settings {
    Settings {
        server: ServerConfig::default(),
        jwt: JwtConfig {
            secret: SECRET.to_string(),
            issuer: None,
            audience: None,
        },
        websocket: WebSocketConfig::default(),
        store: StoreConfig::default(),
        database: None,
        logging: LoggingConfig::default(),
    }
}

fn token_for(identity: &str) -> String {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: identity.to_string(),
        exp: now + 3600,
        iat: now,
        extra: HashMap::new(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

fn request(method: Method, uri: &str, identity: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(identity) = identity {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token_for(identity)));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

async fn online(state: &AppState, identity: &str) -> (Session, mpsc::Receiver<OutboundMessage>) {
    let (tx, rx) = mpsc::channel(32);
    let mut session = Session::open(Arc::new(ConnectionHandle::new(tx)), state.presence.clone());
    session.identify(identity).await.unwrap();
    (session, rx)
}

fn events(rx: &mut mpsc::Receiver<OutboundMessage>) -> Vec<ServerMessage> {
    let mut out = Vec::new();
    while let Ok(OutboundMessage::Event(event)) = rx.try_recv() {
        out.push(event);
    }
    out
}

#[tokio::test]
async fn test_health_is_public() {
    let app = create_app(AppState::new(test_settings()));

    let (status, body) = send(&app, request(Method::GET, "/health", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["store"], "memory");
}

#[tokio::test]
async fn test_missing_or_bad_token_is_unauthorized() {
    let app = create_app(AppState::new(test_settings()));

    let (status, body) = send(&app, request(Method::GET, "/api/presence", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let req = Request::builder()
        .uri("/api/messages/bob")
        .header(header::AUTHORIZATION, "Bearer not-a-jwt")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_send_message_relays_to_online_receiver_only() {
    let state = AppState::new(test_settings());
    let app = create_app(state.clone());
    let (_alice, mut alice_rx) = online(&state, "alice").await;
    let (_bob, mut bob_rx) = online(&state, "bob").await;
    events(&mut alice_rx);
    events(&mut bob_rx);

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            "/api/messages/bob",
            Some("alice"),
            Some(json!({ "text": "  hi  " })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["delivered"], true);
    assert_eq!(body["data"]["text"], "hi");
    assert_eq!(body["data"]["sender"], "alice");

    match events(&mut bob_rx).as_slice() {
        [ServerMessage::MessageReceived { message }] => {
            assert_eq!(message.text, "hi");
            assert_eq!(body["data"]["id"], message.id.to_string());
        }
        other => panic!("unexpected events: {:?}", other),
    }
    assert!(events(&mut alice_rx).is_empty());

    // The conversation is readable from either side
    let (status, body) = send(&app, request(Method::GET, "/api/messages/alice", Some("bob"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
}

#[tokio::test]
async fn test_send_to_offline_receiver_is_stored_and_counted_unread() {
    let state = AppState::new(test_settings());
    let app = create_app(state.clone());

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            "/api/messages/bob",
            Some("alice"),
            Some(json!({ "text": "are you there?" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["delivered"], false);

    let (status, body) = send(&app, request(Method::GET, "/api/messages/unread", Some("bob"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["sender"], "alice");
    assert_eq!(body["data"][0]["count"], 1);
    assert_eq!(body["data"][0]["online"], false);
    assert_eq!(state.relay.stats().offline, 1);
}

#[tokio::test]
async fn test_mark_seen_notifies_original_sender() {
    let state = AppState::new(test_settings());
    let app = create_app(state.clone());
    let (_alice, mut alice_rx) = online(&state, "alice").await;

    for text in ["one", "two"] {
        send(
            &app,
            request(
                Method::POST,
                "/api/messages/bob",
                Some("alice"),
                Some(json!({ "text": text })),
            ),
        )
        .await;
    }
    events(&mut alice_rx);

    let (status, body) = send(&app, request(Method::PUT, "/api/messages/seen/alice", Some("bob"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["updated"], 2);

    assert_eq!(
        events(&mut alice_rx),
        vec![ServerMessage::SeenNotice {
            seen_by: "bob".to_string()
        }]
    );
}

#[tokio::test]
async fn test_empty_message_is_rejected() {
    let state = AppState::new(test_settings());
    let app = create_app(state.clone());
    let (_bob, mut bob_rx) = online(&state, "bob").await;
    events(&mut bob_rx);

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            "/api/messages/bob",
            Some("alice"),
            Some(json!({ "text": "   " })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    // Nothing persisted, nothing pushed
    assert!(events(&mut bob_rx).is_empty());
}

#[tokio::test]
async fn test_only_sender_may_delete() {
    let app = create_app(AppState::new(test_settings()));

    let (_, body) = send(
        &app,
        request(
            Method::POST,
            "/api/messages/bob",
            Some("alice"),
            Some(json!({ "text": "oops" })),
        ),
    )
    .await;
    let id = body["data"]["id"].as_str().unwrap().to_string();
    let uri = format!("/api/messages/{}", id);

    let (status, _) = send(&app, request(Method::DELETE, &uri, Some("bob"), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, request(Method::DELETE, &uri, Some("alice"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, _) = send(&app, request(Method::DELETE, &uri, Some("alice"), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_presence_lists_online_identities() {
    let state = AppState::new(test_settings());
    let app = create_app(state.clone());
    let (_bob, _bob_rx) = online(&state, "bob").await;
    let (_alice, _alice_rx) = online(&state, "alice").await;

    let (status, body) = send(&app, request(Method::GET, "/api/presence", Some("carol"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["online"], json!(["alice", "bob"]));
    assert_eq!(body["count"], 2);
}
