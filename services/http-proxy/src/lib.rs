//! switchyard HTTP proxy
//!
//! Forwarding proxy for plain `http://` requests, with `CONNECT` tunnels
//! relayed through the same stream phase as the switchyard relay.

pub mod config;
pub mod error;
pub mod headers;
pub mod proxy;
pub mod server;

pub use config::{Args, ConfigError, ProxyConfig};
pub use error::ProxyError;
pub use proxy::{Proxy, ProxyBody};
pub use server::ProxyServer;
