use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::hub::HubConfig;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub websocket: WebSocketConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub otel: OtelConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketConfig {
    /// Heartbeat interval in seconds (server sends ping)
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval: u64,
    /// Liveness window in seconds (evict if no pong within it); must exceed the interval
    #[serde(default = "default_liveness_window")]
    pub liveness_window: u64,
    /// Bound on a single frame write in milliseconds
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
    /// Maximum concurrent sends per broadcast
    #[serde(default = "default_max_concurrent_sends")]
    pub max_concurrent_sends: usize,
    /// Capacity of the inbound application frame queue
    #[serde(default = "default_inbound_buffer")]
    pub inbound_buffer: usize,
    /// Maximum inbound message size in bytes
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

fn default_heartbeat_interval() -> u64 {
    30 // 30 seconds
}

fn default_liveness_window() -> u64 {
    90 // three missed heartbeats
}

fn default_write_timeout_ms() -> u64 {
    5000
}

fn default_max_concurrent_sends() -> usize {
    100
}

fn default_inbound_buffer() -> usize {
    1024
}

fn default_max_message_size() -> usize {
    64 * 1024
}

impl WebSocketConfig {
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            write_timeout: Duration::from_millis(self.write_timeout_ms),
            max_concurrent_sends: self.max_concurrent_sends,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiConfig {
    /// Key required in `X-API-Key` for producer endpoints; open when unset
    pub key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtelConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_otel_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_sampling_ratio")]
    pub sampling_ratio: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub format: LogFormat,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8081
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_service_name() -> String {
    "livewire-hub".to_string()
}

fn default_sampling_ratio() -> f64 {
    1.0
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            // Start with default values
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8081)?
            .set_default("websocket.heartbeat_interval", 30)?
            .set_default("websocket.liveness_window", 90)?
            .set_default("websocket.write_timeout_ms", 5000)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables
            // SERVER__PORT, WEBSOCKET__HEARTBEAT_INTERVAL, API__KEY, OTEL__ENABLED, etc.
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
        }
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: default_heartbeat_interval(),
            liveness_window: default_liveness_window(),
            write_timeout_ms: default_write_timeout_ms(),
            max_concurrent_sends: default_max_concurrent_sends(),
            inbound_buffer: default_inbound_buffer(),
            max_message_size: default_max_message_size(),
        }
    }
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_otel_endpoint(),
            service_name: default_service_name(),
            sampling_ratio: default_sampling_ratio(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let server = ServerConfig::default();
        assert_eq!(server.host, "0.0.0.0");
        assert_eq!(server.port, 8081);

        let websocket = WebSocketConfig::default();
        assert!(websocket.liveness_window > websocket.heartbeat_interval);
    }

    #[test]
    fn test_log_format_parsing() {
        let config: LogConfig = serde_json::from_str(r#"{"format":"json"}"#).unwrap();
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(LogConfig::default().format, LogFormat::Pretty);
    }

    #[test]
    fn test_hub_config_from_websocket() {
        let websocket = WebSocketConfig {
            write_timeout_ms: 250,
            max_concurrent_sends: 8,
            ..Default::default()
        };
        let hub = websocket.hub_config();
        assert_eq!(hub.write_timeout, Duration::from_millis(250));
        assert_eq!(hub.max_concurrent_sends, 8);
    }
}
