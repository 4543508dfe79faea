//! Registry statistics

use serde::Serialize;

/// Registry statistics
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    pub online_users: usize,
    pub bound_connections: usize,
}
