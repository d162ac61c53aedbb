//! Request handling.
//!
//! `CONNECT` requests become raw byte tunnels driven by the relay's stream
//! phase. Every other method is forwarded to an absolute `http://` target
//! over a fresh upstream connection.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{combinators::BoxBody, BodyExt, Empty, Full};
use hyper::body::Incoming;
use hyper::client::conn::http1 as client;
use hyper::header::{HeaderValue, CONTENT_TYPE, HOST};
use hyper::{Method, Request, Response, Uri};
use hyper_util::rt::TokioIo;
use switchyard_networking::SocketAddress;
use switchyard_relay::{dial, relay_streams, AdmissionPermit};
use tracing::{debug, info, warn, Instrument};

use crate::error::ProxyError;
use crate::headers::{append_forwarded_for, strip_hop_by_hop};

/// Response body type used by the proxy.
pub type ProxyBody = BoxBody<Bytes, hyper::Error>;

/// Port assumed when an `http://` target omits one.
pub const DEFAULT_HTTP_PORT: u16 = 80;

/// Stateless request handler shared by every client connection.
#[derive(Debug, Clone)]
pub struct Proxy {
    dial_timeout: Duration,
}

impl Proxy {
    pub fn new(dial_timeout: Duration) -> Self {
        Self { dial_timeout }
    }

    /// Handle one request from `peer_addr`.
    ///
    /// `permit` is the admission slot of the client connection; a tunnel
    /// keeps it alive until the tunnel closes.
    pub async fn handle(
        &self,
        req: Request<Incoming>,
        peer_addr: SocketAddr,
        permit: Arc<AdmissionPermit>,
    ) -> Result<Response<ProxyBody>, Infallible> {
        info!(method = %req.method(), uri = %req.uri(), "Request received");

        let result = if req.method() == Method::CONNECT {
            self.tunnel(req, permit).await
        } else {
            self.forward(req, peer_addr).await
        };

        Ok(result.unwrap_or_else(|err| {
            warn!(error = %err, reason = err.reason_code(), "Request failed");
            error_response(&err)
        }))
    }

    async fn tunnel(
        &self,
        req: Request<Incoming>,
        permit: Arc<AdmissionPermit>,
    ) -> Result<Response<ProxyBody>, ProxyError> {
        let authority = req.uri().authority().ok_or(ProxyError::MissingAuthority)?;
        let target = SocketAddress::parse(authority.as_str())?;

        let upstream = dial(&target, self.dial_timeout)
            .await
            .map_err(ProxyError::TunnelDial)?;
        if let Err(e) = upstream.set_nodelay(true) {
            debug!(error = %e, "Failed to set TCP_NODELAY on tunnel upstream");
        }

        info!(target = %target, "Tunnel established");

        // The upgrade resolves only after the 200 below has been written.
        tokio::spawn(
            async move {
                let _permit = permit;
                match hyper::upgrade::on(req).await {
                    Ok(upgraded) => {
                        let report = relay_streams(TokioIo::new(upgraded), upstream).await;
                        info!(
                            target = %target,
                            bytes_to_upstream = report.bytes_to_backend(),
                            bytes_from_upstream = report.bytes_from_backend(),
                            stream_error = report.first_error().map(tracing::field::display),
                            "Tunnel closed"
                        );
                    }
                    Err(e) => warn!(target = %target, error = %e, "Upgrade failed"),
                }
            }
            .in_current_span(),
        );

        Ok(Response::new(empty()))
    }

    /// Forward an absolute-form `http://` request.
    ///
    /// `https://` targets are refused with 400 since there is no TLS client
    /// here; HTTPS traffic goes through `CONNECT` instead.
    async fn forward(
        &self,
        req: Request<Incoming>,
        peer_addr: SocketAddr,
    ) -> Result<Response<ProxyBody>, ProxyError> {
        let (mut parts, body) = req.into_parts();

        if parts.uri.scheme_str() != Some("http") {
            let scheme = parts.uri.scheme_str().unwrap_or_default().to_string();
            return Err(ProxyError::UnsupportedScheme(scheme));
        }

        let target = upstream_target(&parts.uri)?;
        if !parts.headers.contains_key(HOST) {
            if let Some(authority) = parts.uri.authority() {
                parts
                    .headers
                    .insert(HOST, HeaderValue::from_str(authority.as_str())?);
            }
        }
        parts.uri = origin_form(&parts.uri)?;

        strip_hop_by_hop(&mut parts.headers);
        append_forwarded_for(&mut parts.headers, peer_addr.ip())?;

        let upstream = dial(&target, self.dial_timeout)
            .await
            .map_err(ProxyError::UpstreamDial)?;
        let (mut sender, conn) = client::handshake(TokioIo::new(upstream)).await?;
        tokio::spawn(
            async move {
                if let Err(e) = conn.await {
                    debug!(error = %e, "Upstream connection failed");
                }
            }
            .in_current_span(),
        );

        let mut response = sender
            .send_request(Request::from_parts(parts, body))
            .await?;
        info!(target = %target, status = %response.status(), "Upstream responded");

        strip_hop_by_hop(response.headers_mut());
        Ok(response.map(|body| body.boxed()))
    }
}

/// Host and port to dial for an absolute-form target.
fn upstream_target(uri: &Uri) -> Result<SocketAddress, ProxyError> {
    let authority = uri.authority().ok_or(ProxyError::MissingAuthority)?;
    let host = authority.host().trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err(ProxyError::MissingAuthority);
    }
    let port = authority.port_u16().unwrap_or(DEFAULT_HTTP_PORT);
    Ok(SocketAddress::new(host, port))
}

/// Strip scheme and authority, keeping path and query.
fn origin_form(uri: &Uri) -> Result<Uri, ProxyError> {
    let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    Ok(path.parse()?)
}

fn empty() -> ProxyBody {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed()
}

fn error_response(err: &ProxyError) -> Response<ProxyBody> {
    let mut response = match err.client_message() {
        Some(message) => {
            let mut response = Response::new(
                Full::new(Bytes::from(format!("{}\n", message)))
                    .map_err(|never| match never {})
                    .boxed(),
            );
            response.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static("text/plain; charset=utf-8"),
            );
            response
        }
        None => Response::new(empty()),
    };
    *response.status_mut() = err.status();
    response
}
