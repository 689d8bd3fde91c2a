//! Configuration schema for config.toml.

use crate::types::TransportMode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Record gateway base URL.
    pub gateway_url: String,

    /// Static credential forwarded to the gateway as `X-API-Key`.
    pub gateway_api_key: String,

    /// Log level (debug, info, warn, error).
    pub log_level: String,

    /// Protocol transport.
    pub transport: TransportMode,

    /// Name reported by `initialize`.
    pub server_name: String,

    /// Version reported by `initialize`.
    pub server_version: String,

    /// Deadline of a single tool call.
    pub request_timeout_secs: u64,

    /// Concurrent gateway calls allowed across all requests.
    pub max_connections: usize,

    /// Retries of a failed read before giving up.
    pub max_retries: u32,

    /// First retry delay; doubles on each further attempt.
    pub retry_base_delay_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            gateway_url: "http://localhost:8002".into(),
            gateway_api_key: String::new(),
            log_level: "info".into(),
            transport: TransportMode::Sequential,
            server_name: "airtable-mcp".into(),
            server_version: env!("CARGO_PKG_VERSION").into(),
            request_timeout_secs: 30,
            max_connections: 10,
            max_retries: 3,
            retry_base_delay_ms: 200,
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}
