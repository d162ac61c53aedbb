//! Proxy configuration.

use std::time::Duration;

use clap::Parser;
use switchyard_networking::{AddressError, SocketAddress};
use switchyard_relay::session::DEFAULT_DIAL_TIMEOUT;
use switchyard_relay::{LogFormat, UNBOUNDED};
use thiserror::Error;

/// Command-line arguments for the proxy binary.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "http-proxy",
    version,
    about = "HTTP forwarding proxy with CONNECT tunnelling"
)]
pub struct Args {
    /// Address the proxy listens on.
    #[arg(long, env = "SWITCHYARD_PROXY_ADDR", default_value = ":3128")]
    pub addr: String,

    /// Max concurrent client connections; 0 or less means no limit.
    #[arg(
        long = "max-conns",
        env = "SWITCHYARD_PROXY_MAX_CONNS",
        default_value_t = UNBOUNDED,
        allow_negative_numbers = true
    )]
    pub max_conns: i64,

    /// Upstream dial timeout in milliseconds.
    #[arg(long, env = "SWITCHYARD_PROXY_DIAL_TIMEOUT_MS", default_value_t = DEFAULT_DIAL_TIMEOUT.as_millis() as u64)]
    pub dial_timeout_ms: u64,

    /// Log level (trace, debug, info, warn, error). RUST_LOG takes precedence.
    #[arg(long, env = "SWITCHYARD_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format.
    #[arg(long, env = "SWITCHYARD_LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid listen address '{value}': {source}")]
    InvalidAddress {
        value: String,
        #[source]
        source: AddressError,
    },

    #[error("dial timeout must be at least 1ms")]
    InvalidDialTimeout,
}

/// Validated proxy configuration.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub addr: SocketAddress,
    /// Connection ceiling; `<= 0` is unbounded.
    pub max_connections: i64,
    pub dial_timeout: Duration,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl ProxyConfig {
    pub fn new(addr: SocketAddress) -> Self {
        Self {
            addr,
            max_connections: UNBOUNDED,
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
        }
    }

    pub fn from_args(args: &Args) -> Result<Self, ConfigError> {
        let addr =
            SocketAddress::parse(&args.addr).map_err(|source| ConfigError::InvalidAddress {
                value: args.addr.clone(),
                source,
            })?;

        if args.dial_timeout_ms == 0 {
            return Err(ConfigError::InvalidDialTimeout);
        }

        Ok(Self {
            addr,
            max_connections: args.max_conns,
            dial_timeout: Duration::from_millis(args.dial_timeout_ms),
            log_level: args.log_level.clone(),
            log_format: args.log_format,
        })
    }
}
