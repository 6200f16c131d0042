//! VM backend abstraction layer for vmrelay.
//!
//! Provides a trait-based interface to the virtualization backend, allowing
//! different drivers (the VBoxManage CLI, an in-memory mock) to be used
//! interchangeably by the interpreter.

pub mod host;
mod import;
mod lock;
mod mock;
mod types;
mod vboxmanage;

pub use import::{ImportJob, ImportSnapshot};
pub use lock::{WriteLock, WriteLocks};
pub use mock::{FailingBackend, MockBackend, MockOptions, MockVm};
pub use types::{MachineState, PortForward};
pub use vboxmanage::{IndexEntry, VBoxManageBackend};

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{BackendConfig, BackendKind};
use crate::error::Result;

/// Shared reference to a backend-owned VM.
pub type SharedMachine = Arc<dyn VirtualMachine>;

/// Creates the backend selected by the configuration.
///
/// `seed` is only used by the mock backend.
pub fn from_config(config: &BackendConfig, seed: Option<&Path>) -> Result<Arc<dyn VmBackend>> {
    match config.kind {
        BackendKind::Mock => {
            let backend = match seed {
                Some(path) => MockBackend::from_seed_file(path)?,
                None => MockBackend::new(),
            };
            Ok(Arc::new(backend))
        }
        BackendKind::VBoxManage => Ok(Arc::new(VBoxManageBackend::new(config))),
    }
}

/// Operations on a single VM.
///
/// Handles stay valid until the VM is deleted; afterwards every call fails.
#[async_trait]
pub trait VirtualMachine: Send + Sync + std::fmt::Debug {
    /// Stable UUID of the VM.
    fn uuid(&self) -> &str;

    /// Current display name.
    async fn name(&self) -> Result<String>;

    /// Renames the VM.
    async fn set_name(&self, name: &str) -> Result<()>;

    /// Current machine state.
    async fn machine_state(&self) -> Result<MachineState>;

    /// Starts the VM headless. Fails unless the VM is powered off.
    async fn launch(&self) -> Result<()>;

    /// Presses the virtual power button (ACPI shutdown request).
    async fn power_button(&self) -> Result<()>;

    /// Exports the VM as an appliance to `path`.
    async fn export_to(&self, path: &str) -> Result<()>;

    /// Sets the number of virtual CPUs.
    async fn set_cpu_count(&self, count: u32) -> Result<()>;

    /// Sets the memory size in MiB.
    async fn set_ram_size(&self, mib: u32) -> Result<()>;

    /// Adds a NAT rule; `online` selects the running-VM path.
    async fn add_port_forward(&self, guest_port: u16, host_port: u16, online: bool) -> Result<()>;

    /// Removes the NAT rule named after `guest_port`.
    async fn remove_port_forward(&self, guest_port: u16, online: bool) -> Result<()>;
}

/// The virtualization backend as seen by the interpreter.
#[async_trait]
pub trait VmBackend: Send + Sync {
    /// Fixed identity string reported by `get backend`.
    fn label(&self) -> String;

    /// Backend version string.
    async fn version(&self) -> Result<String>;

    /// Looks a VM up by name or UUID.
    async fn resolve_vm(&self, query: &str) -> Result<Option<SharedMachine>>;

    /// Re-reads the VM index so later lookups see added or removed VMs.
    async fn refresh_index(&self) -> Result<()>;

    /// Unregisters a VM and deletes its backing storage.
    async fn delete_fully(&self, name_or_uuid: &str) -> Result<()>;

    /// Starts importing an appliance. Returns once the import is running.
    async fn begin_import(&self, locator: &str) -> Result<()>;

    /// Snapshot of the import job.
    fn import_job(&self) -> ImportSnapshot;

    /// Whether an import is running.
    fn is_import_busy(&self) -> bool {
        self.import_job().busy
    }

    /// Import progress percentage.
    fn import_progress(&self) -> u32 {
        self.import_job().progress
    }

    /// Name of the VM created by the last import.
    fn imported_name(&self) -> String {
        self.import_job().new_name
    }

    /// Whether the last import succeeded.
    fn import_succeeded(&self) -> bool {
        self.import_job().succeeded
    }

    /// Captures and saves the host network configuration.
    async fn reconfigure_host_networking(&self) -> Result<()>;

    /// Home directory of the user running the backend.
    async fn home_path(&self) -> Result<String> {
        host::home_path()
    }

    /// Total host memory in MiB.
    async fn total_ram(&self) -> Result<u64> {
        host::total_ram_mib()
    }

    /// Whether the host CPU supports hardware virtualization.
    async fn vmx_support(&self) -> Result<bool> {
        host::vmx_support()
    }

    /// Number of logical host processors.
    async fn cpu_count(&self) -> Result<usize> {
        host::cpu_count()
    }
}
