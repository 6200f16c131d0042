//! VirtualBox backend driven through the `VBoxManage` command-line tool.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{
    host, ImportJob, ImportSnapshot, MachineState, PortForward, SharedMachine, VirtualMachine,
    VmBackend, WriteLocks,
};
use crate::config::BackendConfig;
use crate::error::{RelayError, Result};

/// One row of `VBoxManage list vms`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub name: String,
    pub uuid: String,
}

#[derive(Debug)]
struct VBoxInner {
    tool: PathBuf,
    label: String,
    network_report: PathBuf,
    index: RwLock<Vec<IndexEntry>>,
    locks: WriteLocks,
    import: ImportJob,
}

/// Backend that shells out to `VBoxManage`.
#[derive(Debug, Clone)]
pub struct VBoxManageBackend {
    inner: Arc<VBoxInner>,
}

impl VBoxManageBackend {
    /// Creates a backend from the `[backend]` configuration section.
    pub fn new(config: &BackendConfig) -> Self {
        let label = config.label.clone().unwrap_or_else(default_label);
        let network_report = config
            .network_report
            .clone()
            .unwrap_or_else(host::default_network_report_path);

        Self {
            inner: Arc::new(VBoxInner {
                tool: config.vboxmanage_path.clone(),
                label,
                network_report,
                index: RwLock::new(Vec::new()),
                locks: WriteLocks::new(),
                import: ImportJob::new(),
            }),
        }
    }
}

/// `VirtualBox <OS>`, e.g. `VirtualBox Windows`.
fn default_label() -> String {
    let os = match std::env::consts::OS {
        "windows" => "Windows",
        "linux" => "Linux",
        "macos" => "macOS",
        other => other,
    };
    format!("VirtualBox {os}")
}

impl VBoxInner {
    async fn run(&self, args: &[&str]) -> Result<String> {
        debug!(tool = %self.tool.display(), ?args, "running VBoxManage");
        let output = Command::new(&self.tool)
            .args(args)
            .output()
            .await
            .map_err(|e| {
                RelayError::backend(format!("failed to run {}: {e}", self.tool.display()))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RelayError::backend(stderr_message(&stderr)));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn list_vms(&self) -> Result<Vec<IndexEntry>> {
        let output = self.run(&["list", "vms"]).await?;
        Ok(parse_list_vms(&output))
    }

    async fn refresh(&self) -> Result<Vec<IndexEntry>> {
        let entries = self.list_vms().await?;
        debug!(count = entries.len(), "refreshed VM index");
        *self.index.write().await = entries.clone();
        Ok(entries)
    }

    /// Looks `query` up in the cached index, refreshing once on a miss.
    async fn lookup(&self, query: &str) -> Result<Option<IndexEntry>> {
        if let Some(entry) = find_entry(&self.index.read().await, query) {
            return Ok(Some(entry));
        }
        let entries = self.refresh().await?;
        Ok(find_entry(&entries, query))
    }

    async fn vm_info(&self, uuid: &str) -> Result<HashMap<String, String>> {
        let output = self.run(&["showvminfo", uuid, "--machinereadable"]).await?;
        Ok(parse_machine_readable(&output))
    }

    async fn state_of(&self, uuid: &str) -> Result<MachineState> {
        let info = self.vm_info(uuid).await?;
        Ok(info
            .get("VMState")
            .map(|s| MachineState::from_vboxmanage(s))
            .unwrap_or_default())
    }

    /// Follows a running `VBoxManage import` and records its outcome.
    async fn watch_import(self: Arc<Self>, mut child: Child, before: Vec<IndexEntry>) {
        let stderr = child.stderr.take();
        let stderr_task = tokio::spawn(async move {
            let Some(stderr) = stderr else {
                return String::new();
            };
            match read_stderr(stderr).await {
                Ok(text) => text,
                Err(e) => {
                    warn!("Failed to read import stderr: {}", e);
                    String::new()
                }
            }
        });

        if let Some(stdout) = child.stdout.take() {
            if let Err(e) = follow_progress(stdout, &self.import).await {
                warn!("Stopped reading import progress: {}", e);
            }
        }

        let status = child.wait().await;
        let stderr = stderr_task.await.unwrap_or_default();

        match status {
            Ok(status) if status.success() => match self.refresh().await {
                Ok(after) => {
                    let name = after
                        .iter()
                        .find(|entry| !before.iter().any(|b| b.uuid == entry.uuid))
                        .map(|entry| entry.name.clone())
                        .unwrap_or_default();
                    info!("Imported appliance as '{}'", name);
                    self.import.finish_ok(name);
                }
                Err(e) => self.import.finish_err(e.reason()),
            },
            Ok(status) => {
                let message = stderr_message(&stderr);
                warn!(%status, "Appliance import failed: {}", message);
                self.import.finish_err(message);
            }
            Err(e) => {
                warn!("Appliance import could not be awaited: {}", e);
                self.import.finish_err(e.to_string());
            }
        }
    }
}

fn find_entry(entries: &[IndexEntry], query: &str) -> Option<IndexEntry> {
    entries
        .iter()
        .find(|entry| entry.name == query || entry.uuid == query)
        .cloned()
}

/// Parses `VBoxManage list vms` output (`"name" {uuid}` per line).
pub fn parse_list_vms(output: &str) -> Vec<IndexEntry> {
    output
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            let rest = line.strip_prefix('"')?;
            let (name, tail) = rest.rsplit_once("\" {")?;
            let uuid = tail.strip_suffix('}')?;
            Some(IndexEntry {
                name: name.to_string(),
                uuid: uuid.to_string(),
            })
        })
        .collect()
}

/// Parses `--machinereadable` output (`key="value"` per line).
pub fn parse_machine_readable(output: &str) -> HashMap<String, String> {
    output
        .lines()
        .filter_map(|line| {
            let (key, value) = line.split_once('=')?;
            Some((unquote(key).to_string(), unquote(value).to_string()))
        })
        .collect()
}

fn unquote(s: &str) -> &str {
    let s = s.trim();
    s.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(s)
}

fn progress_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(\d{1,3})%").expect("progress pattern is valid"))
}

/// Reads progress output until EOF, recording each percentage in `job`.
async fn follow_progress<R>(mut reader: R, job: &ImportJob) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut seen = String::new();
    let mut chunk = [0u8; 256];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        seen.push_str(&String::from_utf8_lossy(&chunk[..n]));
        if let Some(percent) = parse_progress(&seen) {
            job.set_progress(percent);
        }
    }
}

async fn read_stderr<R>(mut reader: R) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut text = String::new();
    reader.read_to_string(&mut text).await?;
    Ok(text)
}

/// Returns the latest percentage in VBoxManage progress output
/// (`0%...10%...20%`).
pub fn parse_progress(output: &str) -> Option<u32> {
    progress_pattern()
        .captures_iter(output)
        .filter_map(|caps| caps[1].parse::<u32>().ok())
        .filter(|percent| *percent <= 100)
        .last()
}

/// Extracts the useful part of a VBoxManage failure.
///
/// Picks the first `VBoxManage: error:` line when present.
pub fn stderr_message(stderr: &str) -> String {
    let first_error = stderr
        .lines()
        .find_map(|line| line.trim().strip_prefix("VBoxManage: error:"));
    match first_error {
        Some(message) => message.trim().to_string(),
        None => {
            let trimmed = stderr.trim();
            if trimmed.is_empty() {
                "VBoxManage failed".to_string()
            } else {
                trimmed.to_string()
            }
        }
    }
}

#[async_trait]
impl VmBackend for VBoxManageBackend {
    fn label(&self) -> String {
        self.inner.label.clone()
    }

    async fn version(&self) -> Result<String> {
        let output = self.inner.run(&["--version"]).await?;
        Ok(output.trim().to_string())
    }

    async fn resolve_vm(&self, query: &str) -> Result<Option<SharedMachine>> {
        Ok(self.inner.lookup(query).await?.map(|entry| {
            Arc::new(VBoxMachine {
                uuid: entry.uuid,
                inner: Arc::clone(&self.inner),
            }) as SharedMachine
        }))
    }

    async fn refresh_index(&self) -> Result<()> {
        self.inner.refresh().await.map(|_| ())
    }

    async fn delete_fully(&self, name_or_uuid: &str) -> Result<()> {
        let entry = self
            .inner
            .lookup(name_or_uuid)
            .await?
            .ok_or_else(|| RelayError::VmNotFound(name_or_uuid.to_string()))?;

        let _lock = self.inner.locks.acquire(&entry.uuid)?;
        self.inner
            .run(&["unregistervm", &entry.uuid, "--delete"])
            .await?;
        self.inner
            .index
            .write()
            .await
            .retain(|e| e.uuid != entry.uuid);
        info!("Deleted VM '{}' ({})", entry.name, entry.uuid);
        Ok(())
    }

    async fn begin_import(&self, locator: &str) -> Result<()> {
        self.inner.import.begin()?;

        let before = match self.inner.list_vms().await {
            Ok(entries) => entries,
            Err(e) => {
                self.inner.import.finish_err(e.reason());
                return Err(e);
            }
        };

        let child = Command::new(&self.inner.tool)
            .args(["import", locator])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();
        let child = match child {
            Ok(child) => child,
            Err(e) => {
                let err = RelayError::backend(format!(
                    "failed to run {}: {e}",
                    self.inner.tool.display()
                ));
                self.inner.import.finish_err(err.reason());
                return Err(err);
            }
        };

        info!("Importing appliance from {}", locator);
        tokio::spawn(Arc::clone(&self.inner).watch_import(child, before));
        Ok(())
    }

    fn import_job(&self) -> ImportSnapshot {
        self.inner.import.snapshot()
    }

    async fn reconfigure_host_networking(&self) -> Result<()> {
        host::save_network_report(&self.inner.network_report).await
    }
}

/// Handle to a VM registered with VirtualBox.
#[derive(Debug)]
struct VBoxMachine {
    uuid: String,
    inner: Arc<VBoxInner>,
}

impl VBoxMachine {
    async fn modify(&self, args: &[&str]) -> Result<()> {
        let _lock = self.inner.locks.acquire(&self.uuid)?;
        let mut full = vec!["modifyvm", self.uuid.as_str()];
        full.extend_from_slice(args);
        self.inner.run(&full).await.map(|_| ())
    }

    async fn control(&self, args: &[&str]) -> Result<()> {
        let mut full = vec!["controlvm", self.uuid.as_str()];
        full.extend_from_slice(args);
        self.inner.run(&full).await.map(|_| ())
    }
}

#[async_trait]
impl VirtualMachine for VBoxMachine {
    fn uuid(&self) -> &str {
        &self.uuid
    }

    async fn name(&self) -> Result<String> {
        let info = self.inner.vm_info(&self.uuid).await?;
        info.get("name")
            .cloned()
            .ok_or_else(|| RelayError::backend("showvminfo did not report a name"))
    }

    async fn set_name(&self, name: &str) -> Result<()> {
        self.modify(&["--name", name]).await?;
        let mut index = self.inner.index.write().await;
        if let Some(entry) = index.iter_mut().find(|e| e.uuid == self.uuid) {
            entry.name = name.to_string();
        }
        Ok(())
    }

    async fn machine_state(&self) -> Result<MachineState> {
        self.inner.state_of(&self.uuid).await
    }

    async fn launch(&self) -> Result<()> {
        let state = self.machine_state().await?;
        if state != MachineState::PoweredOff {
            return Err(RelayError::invalid_state("PoweredOff", state.as_str()));
        }
        self.inner
            .run(&["startvm", &self.uuid, "--type", "headless"])
            .await
            .map(|_| ())
    }

    async fn power_button(&self) -> Result<()> {
        let state = self.machine_state().await?;
        if !state.is_running() {
            return Err(RelayError::invalid_state("Running", state.as_str()));
        }
        self.control(&["acpipowerbutton"]).await
    }

    async fn export_to(&self, path: &str) -> Result<()> {
        self.inner
            .run(&["export", &self.uuid, "--output", path])
            .await
            .map(|_| ())
    }

    async fn set_cpu_count(&self, count: u32) -> Result<()> {
        if self.machine_state().await?.is_running() {
            debug!(uuid = %self.uuid, "ignoring cpu change on running vm");
            return Ok(());
        }
        self.modify(&["--cpus", &count.to_string()]).await
    }

    async fn set_ram_size(&self, mib: u32) -> Result<()> {
        if self.machine_state().await?.is_running() {
            debug!(uuid = %self.uuid, "ignoring memory change on running vm");
            return Ok(());
        }
        self.modify(&["--memory", &mib.to_string()]).await
    }

    async fn add_port_forward(&self, guest_port: u16, host_port: u16, online: bool) -> Result<()> {
        let spec = PortForward::new(guest_port, host_port).to_natpf_spec();
        if online {
            self.control(&["natpf1", &spec]).await
        } else {
            self.modify(&["--natpf1", &spec]).await
        }
    }

    async fn remove_port_forward(&self, guest_port: u16, online: bool) -> Result<()> {
        let name = guest_port.to_string();
        if online {
            self.control(&["natpf1", "delete", &name]).await
        } else {
            self.modify(&["--natpf1", "delete", &name]).await
        }
    }
}
