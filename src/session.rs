//! Per-connection session state: the currently selected VM.

use crate::backend::SharedMachine;
use crate::error::{RelayError, Result};

/// Zero or one selected VM.
///
/// Set only by `select search`; cleared by [`Session::reset`], when the
/// connection ends, and when `del` removes the selected VM.
#[derive(Debug, Default)]
pub struct Session {
    selected: Option<SharedMachine>,
}

impl Session {
    /// Creates a session with no selection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Selects `vm`, replacing any previous selection.
    pub fn select(&mut self, vm: SharedMachine) {
        tracing::debug!(uuid = vm.uuid(), "selected vm");
        self.selected = Some(vm);
    }

    /// The selected VM, if any.
    pub fn selected(&self) -> Option<&SharedMachine> {
        self.selected.as_ref()
    }

    /// Returns true if a VM is selected.
    pub fn has_selection(&self) -> bool {
        self.selected.is_some()
    }

    /// Returns the selected VM or `NoVmSelected`.
    pub fn require(&self) -> Result<SharedMachine> {
        self.selected.clone().ok_or(RelayError::NoVmSelected)
    }

    /// Clears the selection.
    pub fn reset(&mut self) {
        self.selected = None;
    }

    /// Clears the selection if it refers to `uuid`. Returns true if cleared.
    pub fn clear_if_selected(&mut self, uuid: &str) -> bool {
        if self.selected.as_ref().is_some_and(|vm| vm.uuid() == uuid) {
            tracing::debug!(uuid, "cleared selection of deleted vm");
            self.selected = None;
            return true;
        }
        false
    }
}
