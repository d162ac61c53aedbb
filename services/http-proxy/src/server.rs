//! Proxy accept loop.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use switchyard_relay::{AdmissionController, AdmissionPermit};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, Instrument};

use crate::config::ProxyConfig;
use crate::proxy::Proxy;

const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// A bound proxy, ready to run.
pub struct ProxyServer {
    listener: TcpListener,
    proxy: Arc<Proxy>,
    admission: Arc<AdmissionController>,
}

impl ProxyServer {
    /// Bind the proxy listener.
    pub async fn bind(config: &ProxyConfig) -> io::Result<Self> {
        let listener = TcpListener::bind(config.addr.listen_target()).await?;

        info!(
            bind_addr = %listener.local_addr()?,
            max_connections = config.max_connections,
            "Proxy listener bound"
        );

        Ok(Self {
            listener,
            proxy: Arc::new(Proxy::new(config.dial_timeout)),
            admission: Arc::new(AdmissionController::new(config.max_connections)),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Admission state shared with every client connection.
    pub fn admission(&self) -> Arc<AdmissionController> {
        Arc::clone(&self.admission)
    }

    /// Accept client connections forever.
    pub async fn run(self) -> io::Result<()> {
        info!(bind_addr = %self.listener.local_addr()?, "Proxy started");

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
                info!(
                    peer_addr = %peer_addr,
                    max_connections = self.admission.limit(),
                    "Connection rejected: connection limit reached"
                );
                drop(stream);
                continue;
            };

            debug!(peer_addr = %peer_addr, active = self.admission.active(), "Connection accepted");

            tokio::spawn(
                serve_connection(stream, peer_addr, Arc::clone(&self.proxy), permit)
                    .instrument(tracing::info_span!("connection", peer = %peer_addr)),
            );
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    proxy: Arc<Proxy>,
    permit: AdmissionPermit,
) {
    // Shared with tunnels so the slot stays taken until the last one closes.
    let permit = Arc::new(permit);

    let service = service_fn(move |req| {
        let proxy = Arc::clone(&proxy);
        let permit = Arc::clone(&permit);
        async move { proxy.handle(req, peer_addr, permit).await }
    });

    if let Err(e) = http1::Builder::new()
        .preserve_header_case(true)
        .serve_connection(TokioIo::new(stream), service)
        .with_upgrades()
        .await
    {
        debug!(error = %e, "Connection closed with error");
    }
}
