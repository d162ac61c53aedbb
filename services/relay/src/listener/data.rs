//! Data-plane listener.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use switchyard_networking::SocketAddress;
use tokio::net::TcpListener;
use tracing::{debug, error, info, Instrument};

use super::ACCEPT_ERROR_BACKOFF;
use crate::admission::AdmissionController;
use crate::completion::{CompletionSender, CompletionSignal};
use crate::registry::BackendRegistry;
use crate::session::RelaySession;
use crate::stats::RelayStats;

/// Accepts client connections and starts a relay session for each admitted one.
pub struct DataListener {
    listener: TcpListener,
    registry: Arc<BackendRegistry>,
    admission: Arc<AdmissionController>,
    completions: CompletionSender,
    stats: Arc<RelayStats>,
    dial_timeout: Duration,
}

impl DataListener {
    /// Bind the data listener.
    pub async fn bind(
        addr: &SocketAddress,
        registry: Arc<BackendRegistry>,
        admission: Arc<AdmissionController>,
        completions: CompletionSender,
        stats: Arc<RelayStats>,
        dial_timeout: Duration,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr.listen_target()).await?;

        info!(
            bind_addr = %listener.local_addr()?,
            max_connections = admission.limit(),
            "Data listener bound"
        );

        Ok(Self {
            listener,
            registry,
            admission,
            completions,
            stats,
            dial_timeout,
        })
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections forever.
    ///
    /// Accepting is sequential; sessions run as their own tasks, so the loop
    /// never waits on one.
    pub async fn run(self) -> io::Result<()> {
        info!(bind_addr = %self.listener.local_addr()?, "Data listener started");

        loop {
            let (stream, peer_addr) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!(error = %e, "Accept error");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    continue;
                }
            };

            let Some(permit) = self.admission.try_acquire() else {
                self.stats
                    .connections_rejected
                    .fetch_add(1, Ordering::Relaxed);
                info!(
                    peer_addr = %peer_addr,
                    max_connections = self.admission.limit(),
                    "Connection rejected: connection limit reached"
                );
                drop(stream);
                continue;
            };

            self.stats
                .connections_accepted
                .fetch_add(1, Ordering::Relaxed);
            info!(
                peer_addr = %peer_addr,
                active = self.admission.active(),
                "Connection established"
            );

            let registry = Arc::clone(&self.registry);
            let completions = self.completions.clone();
            let dial_timeout = self.dial_timeout;

            tokio::spawn(
                async move {
                    let session =
                        RelaySession::new(stream, peer_addr, registry.current(), dial_timeout);
                    let report = session.run().await;

                    if completions
                        .send(CompletionSignal::new(report, permit))
                        .is_err()
                    {
                        // The undelivered signal drops its permit, releasing the slot.
                        debug!("Completion reaper gone");
                    }
                }
                .instrument(tracing::info_span!("connection", peer = %peer_addr)),
            );
        }
    }
}
