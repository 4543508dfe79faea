//! Live connection bookkeeping
//!
//! This module provides:
//! - Connection handles (one per physical WebSocket)
//! - The identity registry (who is online, and on which connection)
//! - Registry statistics

mod registry;
mod stats;
mod types;

pub use registry::Registry;
pub use stats::RegistryStats;
pub use types::{ConnectionHandle, Identity, PushError};
