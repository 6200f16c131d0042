//! Host facts reported through `get`: home path, RAM, CPU count, VT-x/AMD-V
//! support, and the network configuration report.

use std::path::{Path, PathBuf};

use sysinfo::System;
use tokio::process::Command;

use crate::error::{RelayError, Result};

/// Returns the current user's home directory.
pub fn home_path() -> Result<String> {
    dirs::home_dir()
        .map(|p| p.display().to_string())
        .ok_or_else(|| RelayError::backend("home directory is not available"))
}

/// Returns the number of logical processors.
pub fn cpu_count() -> Result<usize> {
    let mut sys = System::new();
    sys.refresh_cpu();
    match sys.cpus().len() {
        0 => std::thread::available_parallelism()
            .map(|n| n.get())
            .map_err(RelayError::from),
        n => Ok(n),
    }
}

/// Returns total physical memory in MiB.
pub fn total_ram_mib() -> Result<u64> {
    let mut sys = System::new();
    sys.refresh_memory();
    match sys.total_memory() {
        0 => Err(RelayError::backend("total memory is not available")),
        bytes => Ok(bytes / 1024 / 1024),
    }
}

/// Returns true if the CPU advertises hardware virtualization (VT-x or AMD-V).
pub fn vmx_support() -> Result<bool> {
    Ok(cpu_has_virtualization())
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
fn cpu_has_virtualization() -> bool {
    let cpuid = raw_cpuid::CpuId::new();
    let vmx = cpuid
        .get_feature_info()
        .is_some_and(|info| info.has_vmx());
    let svm = cpuid
        .get_extended_processor_and_feature_identifiers()
        .is_some_and(|ext| ext.has_svm());
    vmx || svm
}

// VirtualBox only runs x86 guests with hardware assistance on x86 hosts.
#[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
fn cpu_has_virtualization() -> bool {
    false
}

/// Default location of the saved network report.
pub fn default_network_report_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("vmrelay")
        .join("ipconfig.txt")
}

/// Captures the host network configuration and saves it to `path`.
///
/// Runs `ipconfig /all` on Windows and `ip addr` elsewhere.
pub async fn save_network_report(path: &Path) -> Result<()> {
    let (program, args): (&str, &[&str]) = if cfg!(windows) {
        ("ipconfig", &["/all"])
    } else {
        ("ip", &["addr"])
    };

    let output = Command::new(program).args(args).output().await?;
    if !output.status.success() {
        return Err(RelayError::backend(format!(
            "{program} failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, &output.stdout).await?;
    tracing::info!("Saved network report to {}", path.display());
    Ok(())
}
