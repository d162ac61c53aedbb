//! Relay assembly.
//!
//! Wires the shared registry and admission state into both listeners and
//! the completion reaper, and runs them as independent tasks.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{error, info};

use crate::admission::AdmissionController;
use crate::completion::{self, run_completion_loop, CompletionReceiver};
use crate::config::RelayConfig;
use crate::listener::{ControlListener, DataListener};
use crate::registry::BackendRegistry;
use crate::stats::RelayStats;

/// Shared state of a running relay.
#[derive(Debug, Clone)]
pub struct RelayHandle {
    pub data_addr: SocketAddr,
    pub control_addr: SocketAddr,
    pub registry: Arc<BackendRegistry>,
    pub admission: Arc<AdmissionController>,
    pub stats: Arc<RelayStats>,
}

/// A bound relay, ready to run.
pub struct Relay {
    data: DataListener,
    control: ControlListener,
    completions: CompletionReceiver,
    handle: RelayHandle,
}

impl Relay {
    /// Bind both listeners. Failing to bind either is fatal.
    pub async fn bind(config: &RelayConfig) -> io::Result<Self> {
        let registry = Arc::new(BackendRegistry::new(config.backend.clone()));
        let admission = Arc::new(AdmissionController::new(config.max_connections));
        let stats = Arc::new(RelayStats::default());
        let (completion_tx, completion_rx) = completion::channel();

        let data = DataListener::bind(
            &config.listen,
            Arc::clone(&registry),
            Arc::clone(&admission),
            completion_tx,
            Arc::clone(&stats),
            config.dial_timeout,
        )
        .await?;

        let control = ControlListener::bind(
            &config.control,
            Arc::clone(&registry),
            Arc::clone(&stats),
            config.control_read_timeout,
        )
        .await?;

        let handle = RelayHandle {
            data_addr: data.local_addr()?,
            control_addr: control.local_addr()?,
            registry,
            admission,
            stats,
        };

        Ok(Self {
            data,
            control,
            completions: completion_rx,
            handle,
        })
    }

    /// Handle to the relay's shared state.
    pub fn handle(&self) -> RelayHandle {
        self.handle.clone()
    }

    /// Run both listeners and the completion reaper.
    ///
    /// Returns only if a listener task stops.
    pub async fn run(self) -> io::Result<()> {
        let Relay {
            data,
            control,
            completions,
            handle,
        } = self;

        info!(
            data_addr = %handle.data_addr,
            control_addr = %handle.control_addr,
            backend = %handle.registry.current(),
            max_connections = handle.admission.limit(),
            "Relay running"
        );

        let reaper = tokio::spawn(run_completion_loop(completions, Arc::clone(&handle.stats)));
        let mut data_task = tokio::spawn(data.run());
        let mut control_task = tokio::spawn(control.run());

        let (name, result) = tokio::select! {
            result = &mut data_task => ("data", result),
            result = &mut control_task => ("control", result),
        };

        data_task.abort();
        control_task.abort();
        reaper.abort();

        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                error!(listener = name, error = %e, "Listener failed");
                Err(e)
            }
            Err(e) => {
                error!(listener = name, error = %e, "Listener task aborted");
                Err(io::Error::other(e))
            }
        }
    }
}
