//! switchyard relay
//!
//! TCP relay that forwards every admitted client connection, byte for byte,
//! to a backend whose address can be switched at runtime over a separate
//! control socket.
//!
//! ## Usage
//!
//! ```ignore
//! use switchyard_relay::{Relay, RelayConfig};
//!
//! let config = RelayConfig::new(":3110".parse()?, "10.0.0.1:22".parse()?, ":3111".parse()?);
//! let relay = Relay::bind(&config).await?;
//! relay.run().await?;
//! ```

pub mod admission;
pub mod completion;
pub mod config;
pub mod error;
pub mod listener;
pub mod logging;
pub mod pump;
pub mod registry;
pub mod server;
pub mod session;
pub mod stats;

pub use admission::{AdmissionController, AdmissionPermit, UNBOUNDED};
pub use completion::CompletionSignal;
pub use config::{Args, ConfigError, LogFormat, RelayConfig};
pub use error::{AdmissionError, PumpError, RelayError};
pub use listener::{ControlListener, DataListener};
pub use pump::{pump, Direction};
pub use registry::{BackendRegistry, BackendUpdate};
pub use server::{Relay, RelayHandle};
pub use session::{dial, relay_streams, RelayReport, RelaySession, SessionReport, SessionState};
pub use stats::{RelayStats, RelayStatsSnapshot};
pub use switchyard_networking::SocketAddress;
