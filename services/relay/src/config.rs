//! Relay configuration.
//!
//! Flags keep their historical short names (`-c`, `-r`, `-u`); every flag
//! can also be set through a `SWITCHYARD_*` environment variable.

use std::time::Duration;

use clap::{Parser, ValueEnum};
use switchyard_networking::{AddressError, SocketAddress};
use thiserror::Error;

use crate::admission::UNBOUNDED;
use crate::session::DEFAULT_DIAL_TIMEOUT;

/// Default time a control client may take to send its body.
pub const DEFAULT_CONTROL_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Json,
    Text,
}

/// Command-line arguments for the relay binary.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "relay",
    version,
    about = "TCP relay with a runtime-switchable backend address"
)]
pub struct Args {
    /// Socket on which client connections are accepted, format address:port.
    #[arg(short = 'c', long = "listen", env = "SWITCHYARD_LISTEN", default_value = ":3110")]
    pub listen: String,

    /// Initial address of the backend server.
    #[arg(short = 'r', long = "remote", env = "SWITCHYARD_REMOTE", default_value = ":22")]
    pub remote: String,

    /// Socket which receives backend IP updates.
    #[arg(short = 'u', long = "control", env = "SWITCHYARD_CONTROL", default_value = ":3111")]
    pub control: String,

    /// Max concurrent client connections; 0 or less means no limit.
    #[arg(
        long = "max-conns",
        env = "SWITCHYARD_MAX_CONNS",
        default_value_t = UNBOUNDED,
        allow_negative_numbers = true
    )]
    pub max_conns: i64,

    /// Backend dial timeout in milliseconds.
    #[arg(long, env = "SWITCHYARD_DIAL_TIMEOUT_MS", default_value_t = DEFAULT_DIAL_TIMEOUT.as_millis() as u64)]
    pub dial_timeout_ms: u64,

    /// Time a control client may take to send its update, in milliseconds.
    #[arg(long, env = "SWITCHYARD_CONTROL_READ_TIMEOUT_MS", default_value_t = DEFAULT_CONTROL_READ_TIMEOUT.as_millis() as u64)]
    pub control_read_timeout_ms: u64,

    /// Log level (trace, debug, info, warn, error). RUST_LOG takes precedence.
    #[arg(long, env = "SWITCHYARD_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format.
    #[arg(long, env = "SWITCHYARD_LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,
}

/// Startup configuration errors. All are fatal.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid listen address '{value}': {source}")]
    InvalidListenAddress {
        value: String,
        #[source]
        source: AddressError,
    },

    #[error("invalid backend address '{value}': {source}")]
    InvalidBackendAddress {
        value: String,
        #[source]
        source: AddressError,
    },

    #[error("invalid control address '{value}': {source}")]
    InvalidControlAddress {
        value: String,
        #[source]
        source: AddressError,
    },

    #[error("data and control listeners both use {0}")]
    ListenerConflict(SocketAddress),

    #[error("{name} must be at least 1ms")]
    InvalidTimeout { name: &'static str },
}

/// Validated relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Data listener address.
    pub listen: SocketAddress,
    /// Initial backend address.
    pub backend: SocketAddress,
    /// Control listener address.
    pub control: SocketAddress,
    /// Connection ceiling; `<= 0` is unbounded.
    pub max_connections: i64,
    /// Backend dial timeout.
    pub dial_timeout: Duration,
    /// Control body read timeout.
    pub control_read_timeout: Duration,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Log output format.
    pub log_format: LogFormat,
}

impl RelayConfig {
    /// Create a configuration with default limits and timeouts.
    pub fn new(listen: SocketAddress, backend: SocketAddress, control: SocketAddress) -> Self {
        Self {
            listen,
            backend,
            control,
            max_connections: UNBOUNDED,
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            control_read_timeout: DEFAULT_CONTROL_READ_TIMEOUT,
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
        }
    }

    /// Validate command-line arguments.
    pub fn from_args(args: &Args) -> Result<Self, ConfigError> {
        let listen = SocketAddress::parse(&args.listen).map_err(|source| {
            ConfigError::InvalidListenAddress {
                value: args.listen.clone(),
                source,
            }
        })?;

        let backend = SocketAddress::parse(&args.remote)
            .and_then(|addr| {
                if addr.port() == 0 {
                    Err(AddressError::InvalidPort("0".to_string()))
                } else {
                    Ok(addr)
                }
            })
            .map_err(|source| ConfigError::InvalidBackendAddress {
                value: args.remote.clone(),
                source,
            })?;

        let control = SocketAddress::parse(&args.control).map_err(|source| {
            ConfigError::InvalidControlAddress {
                value: args.control.clone(),
                source,
            }
        })?;

        if listen == control && listen.port() != 0 {
            return Err(ConfigError::ListenerConflict(listen));
        }

        if args.dial_timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout {
                name: "dial timeout",
            });
        }
        if args.control_read_timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout {
                name: "control read timeout",
            });
        }

        Ok(Self {
            listen,
            backend,
            control,
            max_connections: args.max_conns,
            dial_timeout: Duration::from_millis(args.dial_timeout_ms),
            control_read_timeout: Duration::from_millis(args.control_read_timeout_ms),
            log_level: args.log_level.clone(),
            log_format: args.log_format,
        })
    }
}
