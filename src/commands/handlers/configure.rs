//! `set` handlers (machineName, cpuCount, ramSize, port forwarding).

use super::CommandContext;
use crate::backend::SharedMachine;
use crate::commands::output::Reply;
use crate::commands::router::SetCommand;
use crate::error::{RelayError, Result};

/// Handle `set <sub-verb> <args...>`.
///
/// Without a selection the reply is a bare `ERROR`, whatever the sub-verb.
/// Backend failures are logged and still answered with `SUCCEED` unless
/// `strict_set` is on, which reports them as `PartialFailure`.
pub async fn handle_set(ctx: &mut CommandContext<'_>, cmd: &SetCommand) -> Result<Reply> {
    let Some(vm) = ctx.session.selected().cloned() else {
        return Ok(Reply::bare_error());
    };

    let (sub_verb, result) = match cmd {
        SetCommand::MachineName(name) => ("machineName", vm.set_name(name).await),
        SetCommand::CpuCount(count) => ("cpuCount", vm.set_cpu_count(*count).await),
        SetCommand::RamSize(mib) => ("ramSize", vm.set_ram_size(*mib).await),
        SetCommand::AddPortForwarding {
            guest_port,
            host_port,
        } => (
            "addPortForwarding",
            add_port_forward(&vm, *guest_port, *host_port).await,
        ),
        SetCommand::RemovePortForwarding { guest_port } => (
            "removePortForwarding",
            remove_port_forward(&vm, *guest_port).await,
        ),
        SetCommand::Missing(arg) => return Err(RelayError::MissingArgument(*arg)),
        SetCommand::Invalid(arg) => return Err(RelayError::InvalidArgument(*arg)),
        SetCommand::Unknown(_) => return Err(RelayError::UnknownCommand),
    };

    match result {
        Ok(()) => Ok(Reply::succeed()),
        Err(e) => {
            tracing::error!(sub_verb, uuid = vm.uuid(), "set failed: {}", e);
            if ctx.settings.strict_set {
                Err(RelayError::PartialFailure(e.reason()))
            } else {
                Ok(Reply::succeed())
            }
        }
    }
}

/// Adds the rule online when the VM is running, offline otherwise.
async fn add_port_forward(vm: &SharedMachine, guest_port: u16, host_port: u16) -> Result<()> {
    let online = vm.machine_state().await?.is_running();
    vm.add_port_forward(guest_port, host_port, online).await
}

async fn remove_port_forward(vm: &SharedMachine, guest_port: u16) -> Result<()> {
    let online = vm.machine_state().await?.is_running();
    vm.remove_port_forward(guest_port, online).await
}
