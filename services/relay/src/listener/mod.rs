//! Data and control listeners.
//!
//! ```text
//! Client  -> DataListener -> Admission -> RelaySession -> Backend
//!                                              |
//!                                   CompletionSignal -> reaper
//!
//! Updater -> ControlListener -> BackendRegistry
//! ```
//!
//! The two listeners run as independent tasks. A stuck control client never
//! blocks the data path.

mod control;
mod data;

pub use control::{parse_control_body, ControlListener, MAX_CONTROL_BODY};
pub use data::DataListener;

use std::time::Duration;

/// Pause after an accept error before accepting again.
pub(crate) const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);
