//! Control-plane listener.
//!
//! Protocol: connect, write one IP literal, close. There is no response;
//! the outcome is only visible in the logs. Connections are handled one at
//! a time.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use switchyard_networking::SocketAddress;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use super::ACCEPT_ERROR_BACKOFF;
use crate::error::RelayError;
use crate::registry::{BackendRegistry, BackendUpdate};
use crate::stats::RelayStats;

/// Largest control body accepted. An IPv6 literal is at most 45 bytes.
pub const MAX_CONTROL_BODY: usize = 256;

/// Accepts backend address updates.
pub struct ControlListener {
    listener: TcpListener,
    registry: Arc<BackendRegistry>,
    stats: Arc<RelayStats>,
    read_timeout: Duration,
}

impl ControlListener {
    /// Bind the control listener.
    pub async fn bind(
        addr: &SocketAddress,
        registry: Arc<BackendRegistry>,
        stats: Arc<RelayStats>,
        read_timeout: Duration,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr.listen_target()).await?;
        info!(bind_addr = %listener.local_addr()?, "Control listener bound");

        Ok(Self {
            listener,
            registry,
            stats,
            read_timeout,
        })
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept, read, validate and close, one connection at a time, forever.
    pub async fn run(self) -> io::Result<()> {
        info!(bind_addr = %self.listener.local_addr()?, "Control listener started");

        loop {
            let (mut stream, peer_addr) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!(error = %e, "Control accept error");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    continue;
                }
            };

            match self.apply(&mut stream).await {
                Ok(update) => {
                    self.stats.backend_updates.fetch_add(1, Ordering::Relaxed);
                    info!(
                        peer_addr = %peer_addr,
                        previous = %update.previous,
                        current = %update.current,
                        "Backend address updated"
                    );
                }
                Err(e) => {
                    self.stats.control_rejected.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        peer_addr = %peer_addr,
                        error = %e,
                        reason = e.reason_code(),
                        backend = %self.registry.current(),
                        "Control input rejected"
                    );
                }
            }
        }
    }

    async fn apply<R>(&self, stream: &mut R) -> Result<BackendUpdate, RelayError>
    where
        R: AsyncRead + Unpin,
    {
        let body = read_body(stream, self.read_timeout).await?;
        let candidate = parse_control_body(&body)?;
        Ok(self.registry.update(candidate)?)
    }
}

async fn read_body<R>(stream: &mut R, timeout: Duration) -> Result<Vec<u8>, RelayError>
where
    R: AsyncRead + Unpin,
{
    let mut body = Vec::with_capacity(64);
    let mut limited = stream.take(MAX_CONTROL_BODY as u64 + 1);
    let read = limited.read_to_end(&mut body);

    match tokio::time::timeout(timeout, read).await {
        Ok(result) => {
            result?;
        }
        Err(_) => return Err(RelayError::ControlReadTimeout { timeout }),
    }

    if body.len() > MAX_CONTROL_BODY {
        return Err(RelayError::ControlBodyTooLarge {
            limit: MAX_CONTROL_BODY,
        });
    }
    Ok(body)
}

/// Decode a control body and strip trailing whitespace and newlines.
pub fn parse_control_body(body: &[u8]) -> Result<&str, RelayError> {
    let text = std::str::from_utf8(body).map_err(|_| RelayError::ControlBodyNotUtf8)?;
    Ok(text.trim_end())
}
