//! Backend registry.
//!
//! Holds the address every new relay session dials. Updates arrive from the
//! control listener and replace the host only; the port stays as configured
//! at startup.
//!
//! Uses ArcSwap so readers take a consistent snapshot without blocking and
//! writers swap in a new value in one step. A session keeps its snapshot for
//! its whole lifetime, so later updates never affect it.

use std::sync::Arc;

use arc_swap::ArcSwap;
use switchyard_networking::{parse_ip, AddressError, SocketAddress};

/// Result of a successful update, for the caller to log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendUpdate {
    pub previous: Arc<SocketAddress>,
    pub current: Arc<SocketAddress>,
}

/// Process-wide holder of the current backend address.
pub struct BackendRegistry {
    target: ArcSwap<SocketAddress>,
}

impl BackendRegistry {
    /// Create a registry with the startup backend address.
    pub fn new(initial: SocketAddress) -> Self {
        Self {
            target: ArcSwap::from_pointee(initial),
        }
    }

    /// Snapshot of the current backend address.
    pub fn current(&self) -> Arc<SocketAddress> {
        self.target.load_full()
    }

    /// Replace the backend host with the IP literal in `candidate`.
    ///
    /// On error the registry is unchanged.
    pub fn update(&self, candidate: &str) -> Result<BackendUpdate, AddressError> {
        let ip = parse_ip(candidate)?;

        let previous = self.target.rcu(|current| current.with_host(ip));
        let current = Arc::new(previous.with_host(ip));

        Ok(BackendUpdate { previous, current })
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("target", &self.current())
            .finish()
    }
}
