//! Value types shared by the backend implementations.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Power/machine state of a VM, as reported to the controller.
///
/// The string forms are part of the wire protocol (`get machineState`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MachineState {
    PoweredOff,
    Running,
    Aborted,
    Null,
    Paused,
    Starting,
    Stopping,
    Snapshotting,
    DeletingSnapshot,
    RestoringSnapshot,
    #[default]
    Unknown,
}

impl MachineState {
    /// Returns the protocol name of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PoweredOff => "PoweredOff",
            Self::Running => "Running",
            Self::Aborted => "Aborted",
            Self::Null => "Null",
            Self::Paused => "Paused",
            Self::Starting => "Starting",
            Self::Stopping => "Stopping",
            Self::Snapshotting => "Snapshotting",
            Self::DeletingSnapshot => "DeletingSnapshot",
            Self::RestoringSnapshot => "RestoringSnapshot",
            Self::Unknown => "Unknown",
        }
    }

    /// Maps a `VMState` value from `VBoxManage showvminfo --machinereadable`.
    ///
    /// States without a protocol counterpart (saved, stuck, teleporting...)
    /// map to `Unknown`.
    pub fn from_vboxmanage(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "poweroff" => Self::PoweredOff,
            "running" => Self::Running,
            "aborted" => Self::Aborted,
            "null" => Self::Null,
            "paused" => Self::Paused,
            "starting" => Self::Starting,
            "stopping" => Self::Stopping,
            "snapshotting" | "livesnapshotting" | "onlinesnapshotting" => Self::Snapshotting,
            "deletingsnapshot" | "deletingsnapshotlive" | "deletingsnapshotpaused" => {
                Self::DeletingSnapshot
            }
            "restoringsnapshot" => Self::RestoringSnapshot,
            _ => Self::Unknown,
        }
    }

    /// Returns true if the VM is running and online operations apply.
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A NAT port-forwarding rule on the first network adapter.
///
/// Rules are named after the guest port so they can be removed by it alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortForward {
    /// Port inside the guest.
    pub guest_port: u16,
    /// Port on the host.
    pub host_port: u16,
}

impl PortForward {
    /// Creates a TCP forwarding rule.
    pub fn new(guest_port: u16, host_port: u16) -> Self {
        Self {
            guest_port,
            host_port,
        }
    }

    /// Returns the rule name.
    pub fn name(&self) -> String {
        self.guest_port.to_string()
    }

    /// Renders the rule in VBoxManage's `name,proto,hostip,hostport,guestip,guestport` form.
    pub fn to_natpf_spec(&self) -> String {
        format!("{},tcp,,{},,{}", self.name(), self.host_port, self.guest_port)
    }
}
