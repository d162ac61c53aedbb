//! Networking value types shared across switchyard services.
//!
//! This library provides:
//! - `SocketAddress`, a host/port pair whose host may be an unresolved name
//! - Parsing of `host:port`, `:port` and `[ipv6]:port` forms
//! - Validation of bare IP literals received over the control channel

use std::fmt;
use std::net::{IpAddr, Ipv6Addr};
use std::str::FromStr;

use thiserror::Error;

/// Host used when a listen address omits the host (`:3110`).
pub const LISTEN_ANY_HOST: &str = "0.0.0.0";

/// Host used when a dial address omits the host (`:22`).
pub const DIAL_LOCAL_HOST: &str = "127.0.0.1";

/// Address parsing errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// The input string is empty.
    #[error("address cannot be empty")]
    Empty,

    /// No `:port` suffix was found.
    #[error("port not passed in '{0}'")]
    MissingPort(String),

    /// The port is not a number in 0..=65535.
    #[error("port '{0}' isn't a valid 16-bit number")]
    InvalidPort(String),

    /// The host part is malformed (e.g. an IPv6 literal without brackets).
    #[error("invalid host '{0}'")]
    InvalidHost(String),

    /// The input is not an IPv4 or IPv6 literal.
    #[error("invalid IP address '{0}'")]
    InvalidIp(String),
}

// ============================================================================
// Socket address
// ============================================================================

/// A host/port pair.
///
/// The host is kept as text so it can be an unresolved DNS name as well as an
/// IP literal. Values are immutable; replacing the host produces a new value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SocketAddress {
    host: String,
    port: u16,
}

impl SocketAddress {
    /// Create a new address from its parts.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse `host:port`, `:port` or `[ipv6]:port`.
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        if s.is_empty() {
            return Err(AddressError::Empty);
        }

        let (host, port) = if let Some(rest) = s.strip_prefix('[') {
            let Some((host, after)) = rest.split_once(']') else {
                return Err(AddressError::InvalidHost(s.to_string()));
            };
            if Ipv6Addr::from_str(host).is_err() {
                return Err(AddressError::InvalidHost(host.to_string()));
            }
            let Some(port) = after.strip_prefix(':') else {
                return Err(AddressError::MissingPort(s.to_string()));
            };
            (host, port)
        } else {
            let Some((host, port)) = s.rsplit_once(':') else {
                return Err(AddressError::MissingPort(s.to_string()));
            };
            if host.contains(':') {
                return Err(AddressError::InvalidHost(host.to_string()));
            }
            (host, port)
        };

        let port = port
            .parse::<u16>()
            .map_err(|_| AddressError::InvalidPort(port.to_string()))?;

        Ok(Self::new(host, port))
    }

    /// Host part (possibly empty).
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port part.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Copy of this address with the host replaced by `ip`, keeping the port.
    pub fn with_host(&self, ip: IpAddr) -> Self {
        Self::new(ip.to_string(), self.port)
    }

    /// Rendering suitable for binding a listener.
    pub fn listen_target(&self) -> String {
        self.or_default_host(LISTEN_ANY_HOST).to_string()
    }

    /// Rendering suitable for dialing.
    pub fn dial_target(&self) -> String {
        self.or_default_host(DIAL_LOCAL_HOST).to_string()
    }

    fn or_default_host(&self, default: &str) -> Self {
        if self.host.is_empty() {
            Self::new(default, self.port)
        } else {
            self.clone()
        }
    }
}

impl fmt::Display for SocketAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for SocketAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<std::net::SocketAddr> for SocketAddress {
    fn from(addr: std::net::SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

// ============================================================================
// IP literals
// ============================================================================

/// Validate a dotted-decimal or colon-form IP literal.
pub fn parse_ip(candidate: &str) -> Result<IpAddr, AddressError> {
    if candidate.is_empty() {
        return Err(AddressError::Empty);
    }

    IpAddr::from_str(candidate).map_err(|_| AddressError::InvalidIp(candidate.to_string()))
}
