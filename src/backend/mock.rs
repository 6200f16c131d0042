//! Mock VM backend for testing.
//!
//! Provides an in-memory backend for headless testing and for running the
//! relay without VirtualBox installed (`--mock-backend`).

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{
    ImportJob, ImportSnapshot, MachineState, SharedMachine, VirtualMachine, VmBackend, WriteLocks,
};
use crate::error::{RelayError, Result};

/// A VM held by the mock backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MockVm {
    pub name: String,
    pub uuid: String,
    #[serde(default = "default_state")]
    pub state: MachineState,
    #[serde(default = "default_cpus")]
    pub cpus: u32,
    #[serde(default = "default_ram")]
    pub ram_mib: u32,
    /// Guest port -> host port.
    #[serde(skip)]
    pub port_forwards: BTreeMap<u16, u16>,
    /// Paths the VM was exported to.
    #[serde(skip)]
    pub exports: Vec<String>,
}

fn default_state() -> MachineState {
    MachineState::PoweredOff
}

fn default_cpus() -> u32 {
    1
}

fn default_ram() -> u32 {
    512
}

impl MockVm {
    /// Creates a powered-off VM with one CPU and 512 MiB.
    pub fn new(name: impl Into<String>, uuid: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uuid: uuid.into(),
            state: default_state(),
            cpus: default_cpus(),
            ram_mib: default_ram(),
            port_forwards: BTreeMap::new(),
            exports: Vec::new(),
        }
    }

    /// Sets the initial machine state.
    pub fn with_state(mut self, state: MachineState) -> Self {
        self.state = state;
        self
    }
}

/// Tunables for the mock backend.
#[derive(Debug, Clone)]
pub struct MockOptions {
    /// Progress added per `import_progress` poll. Zero finishes imports
    /// synchronously inside `begin_import`.
    pub import_step: u32,
    /// Time launch and power-button operations take.
    pub power_delay: Duration,
    /// Reported backend version.
    pub version: String,
}

impl Default for MockOptions {
    fn default() -> Self {
        Self {
            import_step: 25,
            power_delay: Duration::ZERO,
            version: "7.0.14r161095".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SeedFile {
    #[serde(default)]
    vm: Vec<MockVm>,
}

#[derive(Debug, Default)]
struct MockState {
    vms: Vec<MockVm>,
    pending_import: Option<String>,
    next_uuid: u64,
}

#[derive(Debug)]
struct MockInner {
    state: Mutex<MockState>,
    locks: WriteLocks,
    import: ImportJob,
    failing: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
    refreshes: AtomicUsize,
    options: MockOptions,
}

impl MockInner {
    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: String) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    fn check_fail(&self, op: &str) -> Result<()> {
        let failing = self.failing.lock().unwrap_or_else(PoisonError::into_inner);
        if failing.contains(op) {
            return Err(RelayError::backend(format!("{op} failed")));
        }
        Ok(())
    }

    fn find_uuid(&self, query: &str) -> Option<String> {
        self.state()
            .vms
            .iter()
            .find(|vm| vm.name == query || vm.uuid == query)
            .map(|vm| vm.uuid.clone())
    }

    fn with_vm<T>(&self, uuid: &str, f: impl FnOnce(&mut MockVm) -> Result<T>) -> Result<T> {
        let mut state = self.state();
        let vm = state
            .vms
            .iter_mut()
            .find(|vm| vm.uuid == uuid)
            .ok_or_else(|| RelayError::VmNotFound(uuid.to_string()))?;
        f(vm)
    }

    fn current_state(&self, uuid: &str) -> Result<MachineState> {
        self.with_vm(uuid, |vm| Ok(vm.state))
    }

    /// Registers the pending import as a new VM.
    fn complete_import(&self) {
        let mut state = self.state();
        let base = state
            .pending_import
            .take()
            .unwrap_or_else(|| "imported".to_string());

        let mut name = base.clone();
        let mut suffix = 1;
        while state.vms.iter().any(|vm| vm.name == name) {
            name = format!("{base}_{suffix}");
            suffix += 1;
        }

        state.next_uuid += 1;
        let uuid = format!("00000000-0000-4000-8000-{:012x}", state.next_uuid);
        state.vms.push(MockVm::new(name.clone(), uuid));
        drop(state);

        self.import.finish_ok(name);
    }
}

/// An in-memory backend with failure injection and call recording.
#[derive(Debug, Clone)]
pub struct MockBackend {
    inner: Arc<MockInner>,
}

impl MockBackend {
    /// Creates a mock backend with no VMs.
    pub fn new() -> Self {
        Self::with_vms(Vec::new())
    }

    /// Creates a mock backend holding the given VMs.
    pub fn with_vms(vms: Vec<MockVm>) -> Self {
        Self::with_options(vms, MockOptions::default())
    }

    /// Creates a mock backend with custom options.
    pub fn with_options(vms: Vec<MockVm>, options: MockOptions) -> Self {
        Self {
            inner: Arc::new(MockInner {
                state: Mutex::new(MockState {
                    vms,
                    ..MockState::default()
                }),
                locks: WriteLocks::new(),
                import: ImportJob::new(),
                failing: Mutex::new(HashSet::new()),
                calls: Mutex::new(Vec::new()),
                refreshes: AtomicUsize::new(0),
                options,
            }),
        }
    }

    /// Loads VMs from a TOML seed file (`[[vm]]` tables).
    pub fn from_seed_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RelayError::config(format!("Failed to read seed file {}: {e}", path.display()))
        })?;
        let seed: SeedFile = toml::from_str(&content).map_err(|e| {
            RelayError::config(format!("Seed file error in {}:\n  {e}", path.display()))
        })?;
        tracing::info!("Loaded {} mock VMs from {}", seed.vm.len(), path.display());
        Ok(Self::with_vms(seed.vm))
    }

    /// Makes every later call of `op` fail with a backend error.
    pub fn fail_on(&self, op: &str) {
        self.inner
            .failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(op.to_string());
    }

    /// Removes all injected failures.
    pub fn clear_failures(&self) {
        self.inner
            .failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Returns every backend call made so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.inner
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of `refresh_index` calls.
    pub fn refresh_count(&self) -> usize {
        self.inner.refreshes.load(Ordering::SeqCst)
    }

    /// Returns a copy of the VM matching `name_or_uuid`.
    pub fn vm(&self, name_or_uuid: &str) -> Option<MockVm> {
        self.inner
            .state()
            .vms
            .iter()
            .find(|vm| vm.name == name_or_uuid || vm.uuid == name_or_uuid)
            .cloned()
    }

    /// Number of registered VMs.
    pub fn vm_count(&self) -> usize {
        self.inner.state().vms.len()
    }

    /// Forces a VM into `state`.
    pub fn set_state(&self, name_or_uuid: &str, state: MachineState) {
        let mut inner = self.inner.state();
        if let Some(vm) = inner
            .vms
            .iter_mut()
            .find(|vm| vm.name == name_or_uuid || vm.uuid == name_or_uuid)
        {
            vm.state = state;
        }
    }

    /// The write-lock registry used for configuration changes.
    pub fn locks(&self) -> &WriteLocks {
        &self.inner.locks
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VmBackend for MockBackend {
    fn label(&self) -> String {
        "Mock".to_string()
    }

    async fn version(&self) -> Result<String> {
        self.inner.record("version".to_string());
        self.inner.check_fail("version")?;
        Ok(self.inner.options.version.clone())
    }

    async fn resolve_vm(&self, query: &str) -> Result<Option<SharedMachine>> {
        self.inner.record(format!("resolve_vm {query}"));
        self.inner.check_fail("resolve_vm")?;
        Ok(self.inner.find_uuid(query).map(|uuid| {
            Arc::new(MockMachine {
                uuid,
                inner: Arc::clone(&self.inner),
            }) as SharedMachine
        }))
    }

    async fn refresh_index(&self) -> Result<()> {
        self.inner.record("refresh_index".to_string());
        self.inner.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete_fully(&self, name_or_uuid: &str) -> Result<()> {
        self.inner.record(format!("delete_fully {name_or_uuid}"));
        self.inner.check_fail("delete_fully")?;

        let uuid = self
            .inner
            .find_uuid(name_or_uuid)
            .ok_or_else(|| RelayError::VmNotFound(name_or_uuid.to_string()))?;
        let _lock = self.inner.locks.acquire(&uuid)?;

        let state = self.inner.current_state(&uuid)?;
        if state.is_running() {
            return Err(RelayError::invalid_state("PoweredOff", state.as_str()));
        }
        self.inner.state().vms.retain(|vm| vm.uuid != uuid);
        Ok(())
    }

    async fn begin_import(&self, locator: &str) -> Result<()> {
        self.inner.record(format!("begin_import {locator}"));
        self.inner.check_fail("begin_import")?;
        self.inner.import.begin()?;

        self.inner.state().pending_import = appliance_stem(locator);

        if self.inner.options.import_step == 0 {
            self.inner.complete_import();
        }
        Ok(())
    }

    fn import_job(&self) -> ImportSnapshot {
        self.inner.import.snapshot()
    }

    /// Each poll advances a running import by the configured step.
    fn import_progress(&self) -> u32 {
        let snapshot = self.inner.import.snapshot();
        if snapshot.busy {
            let next = snapshot.progress + self.inner.options.import_step;
            if next >= 100 {
                self.inner.complete_import();
            } else {
                self.inner.import.set_progress(next);
            }
        }
        self.inner.import.snapshot().progress
    }

    async fn reconfigure_host_networking(&self) -> Result<()> {
        self.inner.record("reconfigure_host_networking".to_string());
        self.inner.check_fail("reconfigure_host_networking")
    }

    async fn home_path(&self) -> Result<String> {
        Ok("/home/mock".to_string())
    }

    async fn total_ram(&self) -> Result<u64> {
        Ok(16384)
    }

    async fn vmx_support(&self) -> Result<bool> {
        Ok(true)
    }

    async fn cpu_count(&self) -> Result<usize> {
        Ok(8)
    }
}

/// File name of `locator` without its extension. Accepts `/` and `\`
/// separators.
fn appliance_stem(locator: &str) -> Option<String> {
    let file = locator.rsplit(['/', '\\']).next()?;
    let stem = match file.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file,
    };
    (!stem.is_empty()).then(|| stem.to_string())
}

/// Handle to a VM inside the mock backend.
#[derive(Debug)]
struct MockMachine {
    uuid: String,
    inner: Arc<MockInner>,
}

impl MockMachine {
    async fn transition(&self, via: MachineState, to: MachineState) -> Result<()> {
        let delay = self.inner.options.power_delay;
        if delay.is_zero() {
            return self.inner.with_vm(&self.uuid, |vm| {
                vm.state = to;
                Ok(())
            });
        }
        self.inner.with_vm(&self.uuid, |vm| {
            vm.state = via;
            Ok(())
        })?;
        tokio::time::sleep(delay).await;
        self.inner.with_vm(&self.uuid, |vm| {
            vm.state = to;
            Ok(())
        })
    }
}

#[async_trait]
impl VirtualMachine for MockMachine {
    fn uuid(&self) -> &str {
        &self.uuid
    }

    async fn name(&self) -> Result<String> {
        self.inner.with_vm(&self.uuid, |vm| Ok(vm.name.clone()))
    }

    async fn set_name(&self, name: &str) -> Result<()> {
        self.inner.record(format!("set_name {} {name}", self.uuid));
        let _lock = self.inner.locks.acquire(&self.uuid)?;
        self.inner.check_fail("set_name")?;
        if name.is_empty() {
            return Err(RelayError::backend("machine name must not be empty"));
        }
        self.inner.with_vm(&self.uuid, |vm| {
            vm.name = name.to_string();
            Ok(())
        })
    }

    async fn machine_state(&self) -> Result<MachineState> {
        self.inner.check_fail("machine_state")?;
        self.inner.current_state(&self.uuid)
    }

    async fn launch(&self) -> Result<()> {
        self.inner.record(format!("launch {}", self.uuid));
        self.inner.check_fail("launch")?;
        let state = self.inner.current_state(&self.uuid)?;
        if state != MachineState::PoweredOff {
            return Err(RelayError::invalid_state("PoweredOff", state.as_str()));
        }
        self.transition(MachineState::Starting, MachineState::Running)
            .await
    }

    async fn power_button(&self) -> Result<()> {
        self.inner.record(format!("power_button {}", self.uuid));
        self.inner.check_fail("power_button")?;
        let state = self.inner.current_state(&self.uuid)?;
        if !state.is_running() {
            return Err(RelayError::invalid_state("Running", state.as_str()));
        }
        self.transition(MachineState::Stopping, MachineState::PoweredOff)
            .await
    }

    async fn export_to(&self, path: &str) -> Result<()> {
        self.inner.record(format!("export_to {} {path}", self.uuid));
        self.inner.check_fail("export_to")?;
        if path.is_empty() {
            return Err(RelayError::backend("export path must not be empty"));
        }
        self.inner.with_vm(&self.uuid, |vm| {
            vm.exports.push(path.to_string());
            Ok(())
        })
    }

    async fn set_cpu_count(&self, count: u32) -> Result<()> {
        self.inner.record(format!("set_cpu_count {} {count}", self.uuid));
        if self.inner.current_state(&self.uuid)?.is_running() {
            tracing::debug!(uuid = %self.uuid, "ignoring cpu change on running vm");
            return Ok(());
        }
        let _lock = self.inner.locks.acquire(&self.uuid)?;
        self.inner.check_fail("set_cpu_count")?;
        if count == 0 {
            return Err(RelayError::backend("cpu count must be at least 1"));
        }
        self.inner.with_vm(&self.uuid, |vm| {
            vm.cpus = count;
            Ok(())
        })
    }

    async fn set_ram_size(&self, mib: u32) -> Result<()> {
        self.inner.record(format!("set_ram_size {} {mib}", self.uuid));
        if self.inner.current_state(&self.uuid)?.is_running() {
            tracing::debug!(uuid = %self.uuid, "ignoring memory change on running vm");
            return Ok(());
        }
        let _lock = self.inner.locks.acquire(&self.uuid)?;
        self.inner.check_fail("set_ram_size")?;
        if mib < 4 {
            return Err(RelayError::backend(format!("memory size {mib} MiB is too small")));
        }
        self.inner.with_vm(&self.uuid, |vm| {
            vm.ram_mib = mib;
            Ok(())
        })
    }

    async fn add_port_forward(&self, guest_port: u16, host_port: u16, online: bool) -> Result<()> {
        self.inner.record(format!(
            "add_port_forward {} {guest_port} {host_port} {online}",
            self.uuid
        ));
        let _lock = if online {
            None
        } else {
            Some(self.inner.locks.acquire(&self.uuid)?)
        };
        self.inner.check_fail("add_port_forward")?;
        self.inner.with_vm(&self.uuid, |vm| {
            check_online_matches(vm.state, online)?;
            if vm.port_forwards.values().any(|&h| h == host_port) {
                return Err(RelayError::backend(format!(
                    "host port {host_port} is already forwarded"
                )));
            }
            vm.port_forwards.insert(guest_port, host_port);
            Ok(())
        })
    }

    async fn remove_port_forward(&self, guest_port: u16, online: bool) -> Result<()> {
        self.inner.record(format!(
            "remove_port_forward {} {guest_port} {online}",
            self.uuid
        ));
        let _lock = if online {
            None
        } else {
            Some(self.inner.locks.acquire(&self.uuid)?)
        };
        self.inner.check_fail("remove_port_forward")?;
        self.inner.with_vm(&self.uuid, |vm| {
            check_online_matches(vm.state, online)?;
            vm.port_forwards.remove(&guest_port).map(|_| ()).ok_or_else(|| {
                RelayError::backend(format!("no port forwarding rule for guest port {guest_port}"))
            })
        })
    }
}

/// Online rule changes need a running VM; offline ones need it stopped.
fn check_online_matches(state: MachineState, online: bool) -> Result<()> {
    match (online, state.is_running()) {
        (true, false) => Err(RelayError::invalid_state("Running", state.as_str())),
        (false, true) => Err(RelayError::invalid_state("PoweredOff", state.as_str())),
        _ => Ok(()),
    }
}

/// A backend where every operation fails, for error-path testing.
#[derive(Debug, Default)]
pub struct FailingBackend {
    message: String,
}

impl FailingBackend {
    /// Creates a failing backend with the default message.
    pub fn new() -> Self {
        Self::with_message("backend unavailable")
    }

    /// Creates a failing backend reporting `message`.
    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    fn fail<T>(&self) -> Result<T> {
        Err(RelayError::backend(self.message.clone()))
    }
}

#[async_trait]
impl VmBackend for FailingBackend {
    fn label(&self) -> String {
        "Failing".to_string()
    }

    async fn version(&self) -> Result<String> {
        self.fail()
    }

    async fn resolve_vm(&self, _query: &str) -> Result<Option<SharedMachine>> {
        self.fail()
    }

    async fn refresh_index(&self) -> Result<()> {
        self.fail()
    }

    async fn delete_fully(&self, _name_or_uuid: &str) -> Result<()> {
        self.fail()
    }

    async fn begin_import(&self, _locator: &str) -> Result<()> {
        self.fail()
    }

    fn import_job(&self) -> ImportSnapshot {
        ImportSnapshot::default()
    }

    async fn reconfigure_host_networking(&self) -> Result<()> {
        self.fail()
    }

    async fn home_path(&self) -> Result<String> {
        self.fail()
    }

    async fn total_ram(&self) -> Result<u64> {
        self.fail()
    }

    async fn vmx_support(&self) -> Result<bool> {
        self.fail()
    }

    async fn cpu_count(&self) -> Result<usize> {
        self.fail()
    }
}
