use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    pub jwt: JwtConfig,
    #[serde(default)]
    pub websocket: WebSocketConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: Option<String>,
    pub audience: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketConfig {
    /// Heartbeat interval in seconds (server sends ping)
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval: u64,
    /// Idle timeout in seconds before a connection is asked to close (0 disables eviction)
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: u64,
    /// Eviction sweep interval in seconds
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval: u64,
    /// Upper bound for a single push to a connection, in milliseconds
    #[serde(default = "default_push_timeout_ms")]
    pub push_timeout_ms: u64,
    /// Outbound buffer per connection
    #[serde(default = "default_channel_buffer")]
    pub channel_buffer: usize,
    /// Refuse upgrades without a valid token and pin `identify` to the token subject
    #[serde(default)]
    pub require_auth: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// "memory" (default) or "postgres"
    #[serde(default = "default_store_backend")]
    pub backend: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u32,
    #[serde(default = "default_db_idle_timeout")]
    pub idle_timeout_seconds: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// "pretty" (default) or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_heartbeat_interval() -> u64 {
    30
}

fn default_idle_timeout() -> u64 {
    90
}

fn default_cleanup_interval() -> u64 {
    30
}

fn default_push_timeout_ms() -> u64 {
    5000
}

fn default_channel_buffer() -> usize {
    32
}

fn default_store_backend() -> String {
    "memory".to_string()
}

fn default_pool_size() -> u32 {
    10
}

fn default_connect_timeout() -> u32 {
    5
}

fn default_db_idle_timeout() -> u32 {
    300
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port())?
            .set_default("websocket.heartbeat_interval", default_heartbeat_interval())?
            .set_default("websocket.idle_timeout", default_idle_timeout())?
            .set_default("websocket.cleanup_interval", default_cleanup_interval())?
            .set_default("store.backend", default_store_backend())?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // SERVER__PORT, JWT__SECRET, WEBSOCKET__IDLE_TIMEOUT, DATABASE__URL, ...
            .add_source(
                Environment::default()
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(","),
            );

        builder.build()?.try_deserialize()
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: vec![],
        }
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: default_heartbeat_interval(),
            idle_timeout: default_idle_timeout(),
            cleanup_interval: default_cleanup_interval(),
            push_timeout_ms: default_push_timeout_ms(),
            channel_buffer: default_channel_buffer(),
            require_auth: false,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: default_log_format(),
        }
    }
}

impl WebSocketConfig {
    pub fn push_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.push_timeout_ms)
    }

    pub fn eviction_enabled(&self) -> bool {
        self.idle_timeout > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let server = ServerConfig::default();
        assert_eq!(server.host, "0.0.0.0");
        assert_eq!(server.port, 5000);

        let store = StoreConfig::default();
        assert_eq!(store.backend, "memory");
    }

    #[test]
    fn test_websocket_defaults() {
        let ws = WebSocketConfig::default();
        assert_eq!(ws.heartbeat_interval, 30);
        assert!(ws.eviction_enabled());
        assert!(!ws.require_auth);
        assert_eq!(ws.push_timeout().as_millis(), 5000);

        let disabled = WebSocketConfig {
            idle_timeout: 0,
            ..WebSocketConfig::default()
        };
        assert!(!disabled.eviction_enabled());
    }
}
