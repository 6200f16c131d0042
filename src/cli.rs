//! Command-line argument parsing for vmrelay.

use clap::Parser;
use std::path::PathBuf;
use vmrelay::config::{BackendKind, Config};

/// Relays line-based VM control commands to VirtualBox.
#[derive(Parser, Debug)]
#[command(name = "vmrelay")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(long, value_name = "PATH", env = "VMRELAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to listen on (overrides config and VMRELAY_LISTEN)
    #[arg(short, long, value_name = "ADDR")]
    pub listen: Option<String>,

    /// Serve a single session on stdin/stdout instead of TCP
    #[arg(long)]
    pub stdio: bool,

    /// Use the in-memory mock backend instead of VBoxManage
    #[arg(long)]
    pub mock_backend: bool,

    /// TOML file with VMs for the mock backend
    #[arg(long, value_name = "PATH")]
    pub seed: Option<PathBuf>,

    /// Write logs to the log file instead of stderr
    #[arg(long)]
    pub log_file: bool,
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the config file path to use.
    ///
    /// Uses the --config argument if provided, otherwise the default path.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::default_path)
    }

    /// Validates flags against the effective configuration, after
    /// [`Cli::apply_to`].
    pub fn validate(&self, config: &Config) -> std::result::Result<(), String> {
        if self.seed.is_some() && config.backend.kind != BackendKind::Mock {
            return Err(
                "--seed requires the mock backend (--mock-backend or backend.kind = \"mock\")"
                    .to_string(),
            );
        }
        Ok(())
    }

    /// Applies flags on top of the loaded configuration.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(listen) = &self.listen {
            config.server.listen = listen.clone();
        }
        if self.mock_backend {
            config.backend.kind = BackendKind::Mock;
        }
    }
}
