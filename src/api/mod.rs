//! API layer - HTTP endpoint handlers organized by domain.

mod health;
mod messages;
mod metrics;
mod presence;
mod routes;

pub use health::{health, stats};
pub use messages::{delete_message, get_conversation, mark_seen, send_message, unread_counts};
pub use metrics::prometheus_metrics;
pub use presence::online_users;
pub use routes::api_routes;
