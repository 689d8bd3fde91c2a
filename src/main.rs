//! airtable-mcp: MCP tool server over an Airtable record gateway.
//!
//! Usage:
//!   airtable-mcp                              Serve on stdin/stdout
//!   airtable-mcp --transport concurrent       Allow overlapping requests
//!   airtable-mcp --config ~/my.toml           Use another config file

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use airtable_mcp::config::{self, ServerConfig};
use airtable_mcp::gateway::{GatewayClient, RetryPolicy, StorePool};
use airtable_mcp::metrics::Metrics;
use airtable_mcp::tools::{ToolDispatcher, ToolRegistry};
use airtable_mcp::transport::concurrent::DRAIN_TIMEOUT;
use airtable_mcp::transport::{serve_concurrent, serve_sequential, McpServer};
use airtable_mcp::types::TransportMode;

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "airtable-mcp")]
#[command(version)]
#[command(about = "MCP tool server for Airtable records, analysis and sync")]
struct Cli {
    /// Protocol transport (overrides MCP_SERVER_MODE).
    #[arg(long, value_enum)]
    transport: Option<TransportMode>,

    /// Path to the TOML config file.
    #[arg(long)]
    config: Option<String>,

    /// Log level (overrides LOG_LEVEL; RUST_LOG takes precedence).
    #[arg(long)]
    log_level: Option<String>,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    // A missing .env is not an error.
    let _ = dotenvy::dotenv();

    let config = bootstrap(&cli)?;

    // Logs go to stderr; stdout carries the protocol.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    run(config).await
}

/// Resolve configuration: file, then environment, then CLI flags.
fn bootstrap(cli: &Cli) -> Result<ServerConfig> {
    let config_path = cli
        .config
        .as_deref()
        .map(config::resolve_path)
        .unwrap_or_else(config::default_config_path);

    let mut cfg = config::load_config(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    config::apply_env_overrides(&mut cfg, |key| std::env::var(key).ok())?;

    if let Some(transport) = cli.transport {
        cfg.transport = transport;
    }
    if let Some(level) = &cli.log_level {
        cfg.log_level = level.clone();
    }

    config::validate(&cfg)?;
    Ok(cfg)
}

async fn run(config: ServerConfig) -> Result<()> {
    let metrics = Metrics::new();
    let client = GatewayClient::new(&config.gateway_url, &config.gateway_api_key, config.max_connections)
        .context("Failed to build gateway client")?;
    let retry = RetryPolicy {
        max_retries: config.max_retries,
        base_delay: config.retry_base_delay(),
        ..RetryPolicy::default()
    };
    let pool = Arc::new(StorePool::new(
        Arc::new(client),
        config.max_connections,
        retry,
        metrics.clone(),
    ));
    let registry = Arc::new(ToolRegistry::with_catalog()?);
    let dispatcher = ToolDispatcher::new(registry, pool, metrics.clone(), config.request_timeout());
    let server = McpServer::new(dispatcher, &config.server_name, &config.server_version);

    info!(
        "Starting {} {} ({} transport, gateway {}, {} connections)",
        config.server_name,
        config.server_version,
        config.transport,
        config.gateway_url,
        config.max_connections
    );

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl+C received, shutting down gracefully");
                signal_token.cancel();
            }
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        }
    });

    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    let served = match config.transport {
        TransportMode::Sequential => serve_sequential(&server, stdin, stdout, shutdown).await,
        TransportMode::Concurrent => {
            info!(
                "In-flight requests get up to {:?} to finish on shutdown",
                DRAIN_TIMEOUT
            );
            serve_concurrent(server, stdin, stdout, shutdown).await
        }
    };

    let snapshot = metrics.snapshot();
    info!(
        "Shutdown complete: {}",
        serde_json::to_string(&snapshot).unwrap_or_default()
    );
    served
}
