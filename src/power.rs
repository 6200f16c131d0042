//! Launch and power-button jobs.
//!
//! `control start` and `control stop` either run inline or as background
//! jobs polled through `get powerStat`, `get powerSucceeded` and
//! `get powerError`, the same way appliance imports are polled.

use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use tracing::{info, warn};

use crate::backend::{SharedMachine, VirtualMachine};
use crate::error::{RelayError, Result};

/// A power operation on one VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerOp {
    /// Start the VM (`control start`).
    Launch,
    /// Press the power button (`control stop`).
    PowerButton,
}

impl PowerOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Launch => "launch",
            Self::PowerButton => "powerButton",
        }
    }

    async fn run(self, vm: &dyn VirtualMachine) -> Result<()> {
        match self {
            Self::Launch => vm.launch().await,
            Self::PowerButton => vm.power_button().await,
        }
    }
}

impl fmt::Display for PowerOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of the latest power job on a VM.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PowerStatus {
    /// Whether the job is still running.
    pub busy: bool,
    /// Whether the last finished job succeeded.
    pub succeeded: bool,
    /// Failure message of the last finished job.
    pub error: Option<String>,
    /// Operation of the latest job.
    pub op: Option<PowerOp>,
}

/// Power jobs of every VM, keyed by UUID. Shared by all connections.
#[derive(Debug, Default)]
pub struct PowerJobs {
    jobs: Mutex<HashMap<String, PowerStatus>>,
}

impl PowerJobs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Status of the latest job on `uuid`; idle if none ever ran.
    pub fn status(&self, uuid: &str) -> PowerStatus {
        self.lock().get(uuid).cloned().unwrap_or_default()
    }

    /// Starts `op` in the background. Fails with `PowerBusy` if a job is
    /// already running on the VM.
    pub fn start(self: &Arc<Self>, vm: SharedMachine, op: PowerOp) -> Result<()> {
        self.begin(vm.uuid(), op)?;
        let jobs = Arc::clone(self);
        tokio::spawn(async move {
            let result = run_guarded(vm.as_ref(), op).await;
            jobs.finish(vm.uuid(), op, &result);
        });
        Ok(())
    }

    /// Runs `op` to completion and returns its outcome. The job is tracked
    /// the same way as a background one.
    pub async fn run_blocking(&self, vm: &SharedMachine, op: PowerOp) -> Result<()> {
        self.begin(vm.uuid(), op)?;
        let result = run_guarded(vm.as_ref(), op).await;
        self.finish(vm.uuid(), op, &result);
        result
    }

    fn begin(&self, uuid: &str, op: PowerOp) -> Result<()> {
        let mut jobs = self.lock();
        let status = jobs.entry(uuid.to_string()).or_default();
        if status.busy {
            return Err(RelayError::PowerBusy);
        }
        *status = PowerStatus {
            busy: true,
            succeeded: false,
            error: None,
            op: Some(op),
        };
        Ok(())
    }

    fn finish(&self, uuid: &str, op: PowerOp, result: &Result<()>) {
        match result {
            Ok(()) => info!(uuid, %op, "power operation finished"),
            Err(e) => warn!(uuid, %op, "power operation failed: {}", e),
        }
        let mut jobs = self.lock();
        let status = jobs.entry(uuid.to_string()).or_default();
        status.busy = false;
        status.succeeded = result.is_ok();
        status.error = result.as_ref().err().map(RelayError::reason);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PowerStatus>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Runs `op`, turning a panic inside the backend into an error so the job
/// never stays busy.
async fn run_guarded(vm: &dyn VirtualMachine, op: PowerOp) -> Result<()> {
    match AssertUnwindSafe(op.run(vm)).catch_unwind().await {
        Ok(result) => result,
        Err(_) => Err(RelayError::internal(format!("{op} panicked"))),
    }
}
