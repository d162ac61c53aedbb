//! switchyard relay
//!
//! This service:
//! - Accepts client connections on the data listener
//! - Admits at most `--max-conns` concurrent sessions
//! - Relays each session to the current backend address
//! - Accepts backend IP updates on the control listener

use anyhow::{Context, Result};
use clap::Parser;
use switchyard_relay::{logging, Args, Relay, RelayConfig};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = RelayConfig::from_args(&args).context("Invalid configuration")?;

    logging::init(&config.log_level, config.log_format)?;

    info!("Starting switchyard relay");
    info!(
        listen = %config.listen,
        backend = %config.backend,
        control = %config.control,
        max_connections = config.max_connections,
        dial_timeout_ms = config.dial_timeout.as_millis() as u64,
        "Configuration loaded"
    );

    let relay = Relay::bind(&config)
        .await
        .context("Failed to bind listeners")?;

    tokio::select! {
        result = relay.run() => result.context("Relay stopped")?,
        _ = tokio::signal::ctrl_c() => info!("Shutdown signal received"),
    }

    Ok(())
}
