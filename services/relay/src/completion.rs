//! Session completion handling.
//!
//! Every admitted session ends by sending one [`CompletionSignal`] to the
//! reaper task, which releases the admission slot and logs the end of the
//! connection. The signal owns the session's admission permit, so the slot
//! is released exactly once even if the signal is never delivered.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;

use crate::admission::AdmissionPermit;
use crate::session::SessionReport;
use crate::stats::RelayStats;

/// One-shot notice that a session has fully stopped.
#[derive(Debug)]
pub struct CompletionSignal {
    pub report: SessionReport,
    permit: AdmissionPermit,
}

impl CompletionSignal {
    pub fn new(report: SessionReport, permit: AdmissionPermit) -> Self {
        Self { report, permit }
    }
}

pub type CompletionSender = mpsc::UnboundedSender<CompletionSignal>;
pub type CompletionReceiver = mpsc::UnboundedReceiver<CompletionSignal>;

/// Create the channel between sessions and the reaper.
pub fn channel() -> (CompletionSender, CompletionReceiver) {
    mpsc::unbounded_channel()
}

/// Consume completion signals until every sender is gone.
pub async fn run_completion_loop(mut completions: CompletionReceiver, stats: Arc<RelayStats>) {
    while let Some(signal) = completions.recv().await {
        let CompletionSignal { report, permit } = signal;
        let active = permit.release();
        stats.record_completion(&report);

        match &report.outcome {
            Ok(relay) => info!(
                peer_addr = %report.peer_addr,
                backend = %report.backend,
                active = active,
                state = ?report.state,
                bytes_to_backend = relay.bytes_to_backend(),
                bytes_from_backend = relay.bytes_from_backend(),
                stream_error = relay.first_error().map(tracing::field::display),
                duration_ms = report.duration.as_millis() as u64,
                "Connection ended"
            ),
            Err(e) => info!(
                peer_addr = %report.peer_addr,
                backend = %report.backend,
                active = active,
                state = ?report.state,
                reason = e.reason_code(),
                duration_ms = report.duration.as_millis() as u64,
                "Connection ended"
            ),
        }
    }
}
