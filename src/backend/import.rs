//! The process-wide appliance import job.
//!
//! At most one import is outstanding. The controller polls busy state,
//! progress and result; nothing is pushed.

use std::sync::{Mutex, PoisonError};

use crate::error::{RelayError, Result};

/// Point-in-time view of the import job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSnapshot {
    /// Whether an import is running.
    pub busy: bool,
    /// Progress percentage, 0 to 100.
    pub progress: u32,
    /// Name of the VM created by the last finished import.
    pub new_name: String,
    /// Whether the last finished import succeeded.
    pub succeeded: bool,
    /// Failure message of the last finished import.
    pub error: Option<String>,
}

/// Shared import job state.
#[derive(Debug, Default)]
pub struct ImportJob {
    state: Mutex<ImportSnapshot>,
}

impl ImportJob {
    /// Creates an idle job.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets the job and marks it busy.
    ///
    /// Fails with `ImportBusy` if an import is already running.
    pub fn begin(&self) -> Result<()> {
        let mut state = self.lock();
        if state.busy {
            return Err(RelayError::ImportBusy);
        }
        *state = ImportSnapshot {
            busy: true,
            ..ImportSnapshot::default()
        };
        Ok(())
    }

    /// Records progress; values are clamped to 100 and never move backwards.
    pub fn set_progress(&self, percent: u32) {
        let mut state = self.lock();
        if state.busy {
            state.progress = state.progress.max(percent.min(100));
        }
    }

    /// Marks the job finished successfully.
    pub fn finish_ok(&self, new_name: impl Into<String>) {
        let mut state = self.lock();
        state.busy = false;
        state.progress = 100;
        state.new_name = new_name.into();
        state.succeeded = true;
        state.error = None;
    }

    /// Marks the job failed.
    pub fn finish_err(&self, message: impl Into<String>) {
        let mut state = self.lock();
        state.busy = false;
        state.succeeded = false;
        state.error = Some(message.into());
    }

    /// Returns a copy of the current state.
    pub fn snapshot(&self) -> ImportSnapshot {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ImportSnapshot> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
