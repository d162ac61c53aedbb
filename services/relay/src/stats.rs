//! Relay counters.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::session::SessionReport;

/// Statistics for a relay process.
#[derive(Debug, Default)]
pub struct RelayStats {
    /// Connections admitted by the data listener.
    pub connections_accepted: AtomicU64,
    /// Connections closed because the ceiling was reached.
    pub connections_rejected: AtomicU64,
    /// Sessions whose completion has been processed.
    pub connections_closed: AtomicU64,
    /// Sessions that failed to dial the backend.
    pub dial_failures: AtomicU64,
    /// Bytes relayed client to backend.
    pub bytes_to_backend: AtomicU64,
    /// Bytes relayed backend to client.
    pub bytes_from_backend: AtomicU64,
    /// Backend address updates applied.
    pub backend_updates: AtomicU64,
    /// Control inputs rejected.
    pub control_rejected: AtomicU64,
}

/// Point-in-time copy of [`RelayStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStatsSnapshot {
    pub connections_accepted: u64,
    pub connections_rejected: u64,
    pub connections_closed: u64,
    pub dial_failures: u64,
    pub bytes_to_backend: u64,
    pub bytes_from_backend: u64,
    pub backend_updates: u64,
    pub control_rejected: u64,
}

impl RelayStats {
    pub(crate) fn record_completion(&self, report: &SessionReport) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
        match &report.outcome {
            Ok(relay) => {
                self.bytes_to_backend
                    .fetch_add(relay.bytes_to_backend(), Ordering::Relaxed);
                self.bytes_from_backend
                    .fetch_add(relay.bytes_from_backend(), Ordering::Relaxed);
            }
            Err(e) if e.is_dial_failure() => {
                self.dial_failures.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {}
        }
    }

    pub fn snapshot(&self) -> RelayStatsSnapshot {
        RelayStatsSnapshot {
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            connections_rejected: self.connections_rejected.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            dial_failures: self.dial_failures.load(Ordering::Relaxed),
            bytes_to_backend: self.bytes_to_backend.load(Ordering::Relaxed),
            bytes_from_backend: self.bytes_from_backend.load(Ordering::Relaxed),
            backend_updates: self.backend_updates.load(Ordering::Relaxed),
            control_rejected: self.control_rejected.load(Ordering::Relaxed),
        }
    }
}
