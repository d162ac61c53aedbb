//! switchyard HTTP proxy
//!
//! This service:
//! - Forwards absolute-form `http://` requests with hop-by-hop headers removed
//! - Tunnels `CONNECT` requests as raw byte streams

use anyhow::{Context, Result};
use clap::Parser;
use switchyard_http_proxy::{Args, ProxyConfig, ProxyServer};
use switchyard_relay::logging;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = ProxyConfig::from_args(&args).context("Invalid configuration")?;

    logging::init(&config.log_level, config.log_format)?;

    info!(
        addr = %config.addr,
        max_connections = config.max_connections,
        dial_timeout_ms = config.dial_timeout.as_millis() as u64,
        "Starting switchyard http proxy"
    );

    let server = ProxyServer::bind(&config)
        .await
        .context("Failed to bind proxy listener")?;

    tokio::select! {
        result = server.run() => result.context("Proxy stopped")?,
        _ = tokio::signal::ctrl_c() => info!("Shutdown signal received"),
    }

    Ok(())
}
