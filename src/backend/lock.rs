//! Exclusive write-lock sessions on VMs.
//!
//! Configuration changes must hold the VM's write lock for their whole
//! duration. The lock is an RAII guard, so it is released on every exit path:
//! normal return, `?` propagation, or unwinding.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{RelayError, Result};

/// Registry of VMs whose write lock is currently held.
#[derive(Debug, Default, Clone)]
pub struct WriteLocks {
    held: Arc<Mutex<HashSet<String>>>,
}

impl WriteLocks {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the write lock for `uuid`, failing if another session holds it.
    pub fn acquire(&self, uuid: &str) -> Result<WriteLock> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        if !held.insert(uuid.to_string()) {
            return Err(RelayError::Locked(uuid.to_string()));
        }
        tracing::trace!(uuid, "write lock acquired");
        Ok(WriteLock {
            uuid: uuid.to_string(),
            held: Arc::clone(&self.held),
        })
    }

    /// Returns true if the write lock for `uuid` is held.
    pub fn is_locked(&self, uuid: &str) -> bool {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(uuid)
    }

    /// Runs `op` while holding the write lock for `uuid`.
    pub async fn with_lock<F, T>(&self, uuid: &str, op: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let _guard = self.acquire(uuid)?;
        op.await
    }
}

/// A held write lock. Dropping it releases the lock.
#[derive(Debug)]
pub struct WriteLock {
    uuid: String,
    held: Arc<Mutex<HashSet<String>>>,
}

impl WriteLock {
    /// UUID of the locked VM.
    pub fn uuid(&self) -> &str {
        &self.uuid
    }
}

impl Drop for WriteLock {
    fn drop(&mut self) {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.uuid);
        tracing::trace!(uuid = %self.uuid, "write lock released");
    }
}
