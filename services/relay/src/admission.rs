//! Admission control for relayed connections.
//!
//! A single configured ceiling bounds the number of concurrently active
//! sessions. A ceiling of zero or below means unbounded; the active count is
//! still tracked so it can be logged.
//!
//! All mutation happens under one mutex, held only for the compare and
//! increment (or decrement), never across I/O.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::error;

use crate::error::AdmissionError;

/// Ceiling value meaning "no limit".
pub const UNBOUNDED: i64 = 0;

#[derive(Debug)]
struct AdmissionState {
    active: usize,
    /// `None` when unbounded.
    limit: Option<usize>,
}

/// Tracks active connections against a configured ceiling.
#[derive(Debug)]
pub struct AdmissionController {
    configured_limit: i64,
    state: Mutex<AdmissionState>,
}

impl AdmissionController {
    /// Create a controller. `limit <= 0` disables the ceiling.
    pub fn new(limit: i64) -> Self {
        let effective = usize::try_from(limit).ok().filter(|l| *l > 0);
        Self {
            configured_limit: limit,
            state: Mutex::new(AdmissionState {
                active: 0,
                limit: effective,
            }),
        }
    }

    /// The ceiling as configured (may be zero or negative).
    pub fn limit(&self) -> i64 {
        self.configured_limit
    }

    /// Whether a positive ceiling is in force.
    pub fn is_bounded(&self) -> bool {
        self.lock().limit.is_some()
    }

    /// Number of currently admitted connections.
    pub fn active(&self) -> usize {
        self.lock().active
    }

    /// Admit one connection if the ceiling allows it.
    ///
    /// Returns false, without mutating anything, when the ceiling is reached.
    pub fn try_admit(&self) -> bool {
        let mut state = self.lock();
        if state.limit.is_some_and(|limit| state.active >= limit) {
            return false;
        }
        state.active += 1;
        true
    }

    /// Release one admitted connection, returning the new active count.
    ///
    /// Releasing with nothing admitted is an error and leaves the count at zero.
    pub fn release(&self) -> Result<usize, AdmissionError> {
        let mut state = self.lock();
        if state.active == 0 {
            return Err(AdmissionError::ReleaseWithoutAdmission);
        }
        state.active -= 1;
        Ok(state.active)
    }

    /// Admit one connection and return a permit that releases it exactly once.
    pub fn try_acquire(self: &Arc<Self>) -> Option<AdmissionPermit> {
        if !self.try_admit() {
            return None;
        }
        Some(AdmissionPermit {
            controller: Arc::clone(self),
            released: false,
        })
    }

    fn lock(&self) -> MutexGuard<'_, AdmissionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Proof of one admission.
///
/// The slot is released by `release` or, failing that, when the permit is
/// dropped. Either way it happens once.
#[derive(Debug)]
pub struct AdmissionPermit {
    controller: Arc<AdmissionController>,
    released: bool,
}

impl AdmissionPermit {
    /// Release the slot now, returning the new active count.
    pub fn release(mut self) -> usize {
        self.released = true;
        release_slot(&self.controller)
    }
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        if !self.released {
            release_slot(&self.controller);
        }
    }
}

fn release_slot(controller: &AdmissionController) -> usize {
    match controller.release() {
        Ok(active) => active,
        Err(e) => {
            error!(error = %e, "Admission count out of sync");
            0
        }
    }
}
