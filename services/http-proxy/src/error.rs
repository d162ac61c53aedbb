//! Error types for the HTTP proxy.

use hyper::header::InvalidHeaderValue;
use hyper::http::uri::InvalidUri;
use hyper::StatusCode;
use switchyard_networking::AddressError;
use switchyard_relay::RelayError;
use thiserror::Error;

/// Per-request errors. Each one is turned into a response for that request.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The request target is not an absolute `http://` URI.
    #[error("unsupported protocol scheme {0}")]
    UnsupportedScheme(String),

    /// The request target has no host.
    #[error("request target has no host")]
    MissingAuthority,

    /// The CONNECT target is not `host:port`.
    #[error("invalid tunnel target: {0}")]
    InvalidTarget(#[from] AddressError),

    /// The rewritten request target is not a valid URI.
    #[error("invalid request target: {0}")]
    InvalidUri(#[from] InvalidUri),

    /// A rewritten header value is not valid.
    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] InvalidHeaderValue),

    /// The CONNECT target could not be reached.
    #[error("tunnel dial failed: {0}")]
    TunnelDial(#[source] RelayError),

    /// The upstream origin could not be reached.
    #[error("upstream dial failed: {0}")]
    UpstreamDial(#[source] RelayError),

    /// The upstream exchange failed after connecting.
    #[error("upstream request failed: {0}")]
    Upstream(#[from] hyper::Error),
}

impl ProxyError {
    /// Status code sent to the client.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::UnsupportedScheme(_)
            | ProxyError::MissingAuthority
            | ProxyError::InvalidTarget(_)
            | ProxyError::InvalidUri(_)
            | ProxyError::InvalidHeader(_) => StatusCode::BAD_REQUEST,
            ProxyError::TunnelDial(_) => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::UpstreamDial(_) | ProxyError::Upstream(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Response body sent to the client, if any.
    pub fn client_message(&self) -> Option<String> {
        match self.status() {
            StatusCode::BAD_REQUEST => Some(self.to_string()),
            StatusCode::INTERNAL_SERVER_ERROR => Some("Server Error".to_string()),
            _ => None,
        }
    }

    /// Get the standardized reason code for this error.
    pub fn reason_code(&self) -> &'static str {
        match self {
            ProxyError::UnsupportedScheme(_) => "unsupported_scheme",
            ProxyError::MissingAuthority => "missing_authority",
            ProxyError::InvalidTarget(_) => "invalid_target",
            ProxyError::InvalidUri(_) => "invalid_uri",
            ProxyError::InvalidHeader(_) => "invalid_header",
            ProxyError::TunnelDial(_) => "tunnel_dial_failed",
            ProxyError::UpstreamDial(_) => "upstream_dial_failed",
            ProxyError::Upstream(_) => "upstream_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use switchyard_networking::SocketAddress;

    fn dial_timeout() -> RelayError {
        RelayError::DialTimeout {
            addr: SocketAddress::new("192.0.2.1", 80),
            timeout: Duration::from_millis(10),
        }
    }

    #[test]
    fn test_scheme_error_message() {
        let err = ProxyError::UnsupportedScheme("ftp".to_string());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            err.client_message().as_deref(),
            Some("unsupported protocol scheme ftp")
        );
    }

    #[test]
    fn test_dial_failures_by_mode() {
        let tunnel = ProxyError::TunnelDial(dial_timeout());
        assert_eq!(tunnel.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(tunnel.client_message(), None);

        let upstream = ProxyError::UpstreamDial(dial_timeout());
        assert_eq!(upstream.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(upstream.client_message().as_deref(), Some("Server Error"));
        assert_eq!(upstream.reason_code(), "upstream_dial_failed");
    }
}
