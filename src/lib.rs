// Shared infrastructure
pub mod auth;
pub mod config;
pub mod error;
pub mod metrics;
pub mod postgres;
pub mod store;

// Presence and relay core
pub mod connection_manager;
pub mod presence;
pub mod relay;
pub mod session;

// Application layer
pub mod api;
pub mod server;
pub mod websocket;

// Supporting modules
pub mod tasks;
