//! Configuration management for vmrelay.
//!
//! Handles loading configuration from TOML files and environment variables,
//! covering the listener, interpreter policies and backend selection.

use crate::error::{RelayError, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure for vmrelay.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// TCP listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Command interpreter policies.
    #[serde(default)]
    pub interpreter: InterpreterConfig,

    /// Virtualization backend selection.
    #[serde(default)]
    pub backend: BackendConfig,
}

/// TCP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the relay listens on.
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Seconds of silence after which a connection is dropped (0 = never).
    #[serde(default)]
    pub idle_timeout_secs: u64,
}

fn default_listen() -> String {
    "127.0.0.1:8998".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            idle_timeout_secs: 0,
        }
    }
}

impl ServerConfig {
    /// Parses the listen address.
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen
            .parse()
            .map_err(|e| RelayError::config(format!("Invalid listen address '{}': {e}", self.listen)))
    }

    /// Idle timeout, or `None` when disabled.
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }
}

/// How `control start` and `control stop` are carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerMode {
    /// Run the operation as a background job polled with `get powerStat`.
    #[default]
    Background,
    /// Wait for the operation and report its failure inline.
    Blocking,
}

/// Command interpreter policies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterpreterConfig {
    #[serde(default)]
    pub power_mode: PowerMode,

    /// Report `set` failures as `ERROR PartialFailure` instead of `SUCCEED`.
    #[serde(default)]
    pub strict_set: bool,

    /// Pause after a successful delete before the index is refreshed.
    #[serde(default = "default_delete_settle_ms")]
    pub delete_settle_ms: u64,

    /// Drop the session's selection when `del` removes the selected VM.
    #[serde(default = "default_true")]
    pub clear_selection_on_delete: bool,
}

fn default_delete_settle_ms() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            power_mode: PowerMode::default(),
            strict_set: false,
            delete_settle_ms: default_delete_settle_ms(),
            clear_selection_on_delete: true,
        }
    }
}

impl InterpreterConfig {
    /// Settle delay after deletes.
    pub fn delete_settle(&self) -> Duration {
        Duration::from_millis(self.delete_settle_ms)
    }
}

/// Which backend drives the VMs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BackendKind {
    /// The `VBoxManage` command-line tool.
    #[default]
    #[serde(rename = "vboxmanage")]
    VBoxManage,
    /// In-memory VMs, for testing without VirtualBox.
    #[serde(rename = "mock")]
    Mock,
}

/// Virtualization backend selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub kind: BackendKind,

    /// Path or name of the `VBoxManage` executable.
    #[serde(default = "default_vboxmanage_path")]
    pub vboxmanage_path: PathBuf,

    /// Override for the `get backend` identity string.
    pub label: Option<String>,

    /// Where `get ipconfigAndSave` writes the host network report.
    pub network_report: Option<PathBuf>,
}

fn default_vboxmanage_path() -> PathBuf {
    PathBuf::from("VBoxManage")
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            vboxmanage_path: default_vboxmanage_path(),
            label: None,
            network_report: None,
        }
    }
}

impl Config {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("vmrelay")
            .join("config.toml")
    }

    /// Loads configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| RelayError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    /// Parses configuration from a TOML string.
    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            RelayError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })
    }

    /// Applies environment variables (VMRELAY_LISTEN, VBOXMANAGE_PATH) on top
    /// of the file values.
    pub fn apply_env_defaults(&mut self) {
        self.apply_env(|key| std::env::var(key).ok());
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(listen) = var("VMRELAY_LISTEN").filter(|v| !v.is_empty()) {
            self.server.listen = listen;
        }
        if let Some(tool) = var("VBOXMANAGE_PATH").filter(|v| !v.is_empty()) {
            self.backend.vboxmanage_path = PathBuf::from(tool);
        }
    }
}
