//! Relay session state machine.
//!
//! ```text
//! Dialing -> Relaying -> Completed
//!    |
//!    +-----> Failed
//! ```
//!
//! A session dials the backend snapshot it was created with, then runs two
//! pump directions concurrently. When either direction stops, for any
//! reason, the other is torn down too. The session only finishes after both
//! directions have returned and both streams have been dropped.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use switchyard_networking::SocketAddress;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::{PumpError, RelayError};
use crate::pump::{pump, Direction};

/// Default timeout for dialing the backend.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Dialing,
    Relaying,
    Completed,
    Failed,
}

/// How one direction of a session ended.
#[derive(Debug)]
pub struct DirectionReport {
    pub direction: Direction,
    /// Bytes written to the destination.
    pub transferred: u64,
    /// Set when the pump failed; `None` for EOF or teardown by the peer direction.
    pub error: Option<PumpError>,
}

/// Outcome of the relaying phase.
#[derive(Debug)]
pub struct RelayReport {
    pub client_to_backend: DirectionReport,
    pub backend_to_client: DirectionReport,
}

impl RelayReport {
    pub fn bytes_to_backend(&self) -> u64 {
        self.client_to_backend.transferred
    }

    pub fn bytes_from_backend(&self) -> u64 {
        self.backend_to_client.transferred
    }

    /// First stream error, if either direction failed.
    pub fn first_error(&self) -> Option<&PumpError> {
        self.client_to_backend
            .error
            .as_ref()
            .or(self.backend_to_client.error.as_ref())
    }
}

/// Final report of a finished session.
#[derive(Debug)]
pub struct SessionReport {
    pub peer_addr: SocketAddr,
    pub backend: Arc<SocketAddress>,
    /// Either `Completed` or `Failed`.
    pub state: SessionState,
    pub outcome: Result<RelayReport, RelayError>,
    pub duration: Duration,
}

/// One admitted client connection.
#[derive(Debug)]
pub struct RelaySession {
    client: TcpStream,
    peer_addr: SocketAddr,
    backend: Arc<SocketAddress>,
    dial_timeout: Duration,
    started_at: Instant,
}

impl RelaySession {
    /// Create a session for `client` that will dial the `backend` snapshot.
    pub fn new(
        client: TcpStream,
        peer_addr: SocketAddr,
        backend: Arc<SocketAddress>,
        dial_timeout: Duration,
    ) -> Self {
        Self {
            client,
            peer_addr,
            backend,
            dial_timeout,
            started_at: Instant::now(),
        }
    }

    pub fn backend(&self) -> &SocketAddress {
        &self.backend
    }

    /// Drive the session to completion.
    ///
    /// Both streams are closed by the time this returns.
    pub async fn run(self) -> SessionReport {
        let RelaySession {
            client,
            peer_addr,
            backend,
            dial_timeout,
            started_at,
        } = self;

        debug!(state = ?SessionState::Dialing, backend = %backend, "Dialing backend");

        let upstream = match dial(&backend, dial_timeout).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(
                    backend = %backend,
                    error = %e,
                    reason = e.reason_code(),
                    "Backend dial failed"
                );
                drop(client);
                return SessionReport {
                    peer_addr,
                    backend,
                    state: SessionState::Failed,
                    outcome: Err(e),
                    duration: started_at.elapsed(),
                };
            }
        };

        client.set_nodelay(true).ok();
        upstream.set_nodelay(true).ok();

        debug!(state = ?SessionState::Relaying, backend = %backend, "Connected to backend");

        let report = relay_streams(client, upstream).await;

        debug!(
            state = ?SessionState::Completed,
            bytes_to_backend = report.bytes_to_backend(),
            bytes_from_backend = report.bytes_from_backend(),
            "Relay finished"
        );

        SessionReport {
            peer_addr,
            backend,
            state: SessionState::Completed,
            outcome: Ok(report),
            duration: started_at.elapsed(),
        }
    }
}

/// Dial `addr` with a bounded timeout.
pub async fn dial(addr: &SocketAddress, timeout: Duration) -> Result<TcpStream, RelayError> {
    let target = addr.dial_target();
    connect_within(addr, timeout, TcpStream::connect(target.as_str())).await
}

/// Bound `connect` by `timeout`, mapping failures to dial errors for `addr`.
async fn connect_within<S, F>(
    addr: &SocketAddress,
    timeout: Duration,
    connect: F,
) -> Result<S, RelayError>
where
    F: Future<Output = io::Result<S>>,
{
    match tokio::time::timeout(timeout, connect).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(source)) => Err(RelayError::Dial {
            addr: addr.clone(),
            source,
        }),
        Err(_) => Err(RelayError::DialTimeout {
            addr: addr.clone(),
            timeout,
        }),
    }
}

/// Relay bytes between two established streams until both directions stop.
///
/// Takes ownership of both streams and drops them before returning.
pub async fn relay_streams<C, B>(client: C, backend: B) -> RelayReport
where
    C: AsyncRead + AsyncWrite,
    B: AsyncRead + AsyncWrite,
{
    let (mut client_read, mut client_write) = tokio::io::split(client);
    let (mut backend_read, mut backend_write) = tokio::io::split(backend);
    let (teardown, _) = watch::channel(false);

    let (client_to_backend, backend_to_client) = tokio::join!(
        run_direction(
            Direction::ClientToBackend,
            &mut client_read,
            &mut backend_write,
            &teardown,
        ),
        run_direction(
            Direction::BackendToClient,
            &mut backend_read,
            &mut client_write,
            &teardown,
        ),
    );

    drop((client_read, client_write));
    drop((backend_read, backend_write));

    RelayReport {
        client_to_backend,
        backend_to_client,
    }
}

/// Run one direction until it ends or the other direction signals teardown.
async fn run_direction<R, W>(
    direction: Direction,
    reader: &mut R,
    writer: &mut W,
    teardown: &watch::Sender<bool>,
) -> DirectionReport
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut stopped = teardown.subscribe();
    let mut transferred = 0u64;

    let result = tokio::select! {
        result = pump(reader, writer, &mut transferred) => result,
        _ = stopped.wait_for(|torn_down| *torn_down) => Ok(()),
    };

    if let Err(e) = &result {
        debug!(direction = %direction, error = %e, "Pump stopped with error");
    }
    teardown.send_replace(true);

    DirectionReport {
        direction,
        transferred,
        error: result.err(),
    }
}
