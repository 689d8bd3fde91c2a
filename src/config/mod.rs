pub mod schema;

pub use schema::ServerConfig;

use crate::types::TransportMode;
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default config file location (~/.airtable-mcp/config.toml).
pub fn default_config_path() -> PathBuf {
    directories::BaseDirs::new()
        .map(|d| d.home_dir().join(".airtable-mcp"))
        .unwrap_or_else(|| PathBuf::from(".airtable-mcp"))
        .join("config.toml")
}

/// Expand `~` in a user-supplied path.
pub fn resolve_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

/// Load config from the given path, or return defaults when it is absent.
pub fn load_config(path: &Path) -> Result<ServerConfig> {
    if path.exists() {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: ServerConfig =
            toml::from_str(&contents).context("Failed to parse config (TOML)")?;
        Ok(config)
    } else {
        debug!("No config file at {}, using defaults", path.display());
        Ok(ServerConfig::default())
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid value for {name}: {e}"))
}

/// Apply environment overrides. `lookup` returns a variable's value.
pub fn apply_env_overrides<F>(config: &mut ServerConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("AIRTABLE_GATEWAY_URL") {
        config.gateway_url = v;
    }
    if let Some(v) = lookup("AIRTABLE_GATEWAY_API_KEY") {
        config.gateway_api_key = v;
    }
    if let Some(v) = lookup("LOG_LEVEL") {
        config.log_level = v.to_lowercase();
    }
    if let Some(v) = lookup("MCP_SERVER_MODE") {
        config.transport = TransportMode::parse(&v)
            .with_context(|| format!("Invalid value for MCP_SERVER_MODE: {v}"))?;
    }
    if let Some(v) = lookup("MCP_SERVER_NAME") {
        config.server_name = v;
    }
    if let Some(v) = lookup("MCP_SERVER_VERSION") {
        config.server_version = v;
    }
    if let Some(v) = lookup("MCP_REQUEST_TIMEOUT_SECS") {
        config.request_timeout_secs = parse_var("MCP_REQUEST_TIMEOUT_SECS", &v)?;
    }
    if let Some(v) = lookup("MCP_MAX_CONNECTIONS") {
        config.max_connections = parse_var("MCP_MAX_CONNECTIONS", &v)?;
    }
    if let Some(v) = lookup("MCP_MAX_RETRIES") {
        config.max_retries = parse_var("MCP_MAX_RETRIES", &v)?;
    }
    Ok(())
}

/// Reject configurations the server cannot start with.
pub fn validate(config: &ServerConfig) -> Result<()> {
    if config.gateway_api_key.trim().is_empty() {
        bail!("AIRTABLE_GATEWAY_API_KEY is required (set it in the environment or config file)");
    }
    if config.gateway_url.trim().is_empty() {
        bail!("gateway_url must not be empty");
    }
    if config.request_timeout_secs == 0 {
        bail!("request_timeout_secs must be at least 1");
    }
    if config.max_connections == 0 {
        bail!("max_connections must be at least 1");
    }
    Ok(())
}
