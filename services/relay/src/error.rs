//! Error types for the relay.

use std::io;
use std::time::Duration;

use switchyard_networking::{AddressError, SocketAddress};
use thiserror::Error;

/// Failure of a single pump direction.
#[derive(Debug, Error)]
pub enum PumpError {
    /// Reading from the source failed.
    #[error("read failed: {0}")]
    Read(#[source] io::Error),

    /// Writing to the destination failed.
    #[error("write failed: {0}")]
    Write(#[source] io::Error),

    /// The peer reset or aborted the connection.
    #[error("connection reset by peer")]
    Reset,
}

impl PumpError {
    pub(crate) fn from_read(err: io::Error) -> Self {
        if is_reset(&err) {
            PumpError::Reset
        } else {
            PumpError::Read(err)
        }
    }

    pub(crate) fn from_write(err: io::Error) -> Self {
        if is_reset(&err) {
            PumpError::Reset
        } else {
            PumpError::Write(err)
        }
    }
}

fn is_reset(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted
    )
}

/// Errors from the admission controller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    /// `release` was called with no active admission outstanding.
    #[error("release called with no active connections")]
    ReleaseWithoutAdmission,
}

/// Per-connection and control-channel errors.
///
/// None of these are fatal to the process; each is isolated to the session
/// or control connection that produced it.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The backend refused or could not be reached.
    #[error("dial {addr} failed: {source}")]
    Dial {
        addr: SocketAddress,
        #[source]
        source: io::Error,
    },

    /// The backend did not accept within the dial timeout.
    #[error("dial {addr} timed out after {timeout:?}")]
    DialTimeout {
        addr: SocketAddress,
        timeout: Duration,
    },

    /// A relay direction failed mid-stream.
    #[error("stream error: {0}")]
    Stream(#[from] PumpError),

    /// The control body was not a valid IP literal.
    #[error("invalid control input: {0}")]
    ControlInput(#[from] AddressError),

    /// The control body exceeded the size limit.
    #[error("control body exceeds {limit} bytes")]
    ControlBodyTooLarge { limit: usize },

    /// The control body was not UTF-8.
    #[error("control body is not valid UTF-8")]
    ControlBodyNotUtf8,

    /// The control client did not finish sending in time.
    #[error("control read timed out after {timeout:?}")]
    ControlReadTimeout { timeout: Duration },

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl RelayError {
    /// Get the standardized reason code for this error.
    pub fn reason_code(&self) -> &'static str {
        match self {
            RelayError::Dial { .. } => "dial_failed",
            RelayError::DialTimeout { .. } => "dial_timeout",
            RelayError::Stream(_) => "stream_error",
            RelayError::ControlInput(_) => "control_input_invalid",
            RelayError::ControlBodyTooLarge { .. } => "control_body_too_large",
            RelayError::ControlBodyNotUtf8 => "control_body_not_utf8",
            RelayError::ControlReadTimeout { .. } => "control_read_timeout",
            RelayError::Io(_) => "io_error",
        }
    }

    /// Returns true if this error happened while dialing the backend.
    pub fn is_dial_failure(&self) -> bool {
        matches!(self, RelayError::Dial { .. } | RelayError::DialTimeout { .. })
    }
}
