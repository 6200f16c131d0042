//! `control` handlers (start, stop, output).

use super::CommandContext;
use crate::backend::SharedMachine;
use crate::commands::output::Reply;
use crate::commands::router::ControlCommand;
use crate::config::PowerMode;
use crate::error::{RelayError, Result};
use crate::power::PowerOp;

/// Handle `control <sub-verb>`. The selection is checked before the sub-verb.
pub async fn handle_control(ctx: &mut CommandContext<'_>, cmd: &ControlCommand) -> Result<Reply> {
    let vm = ctx.session.require()?;

    match cmd {
        ControlCommand::Start => power(ctx, vm, PowerOp::Launch).await,
        ControlCommand::Stop => power(ctx, vm, PowerOp::PowerButton).await,
        ControlCommand::Output(Some(path)) => {
            vm.export_to(path).await?;
            tracing::info!(uuid = vm.uuid(), "exported vm to {}", path);
            Ok(Reply::succeed())
        }
        ControlCommand::Output(None) => Err(RelayError::MissingArgument("path")),
        ControlCommand::Unknown(_) => Err(RelayError::UnknownCommand),
    }
}

async fn power(ctx: &CommandContext<'_>, vm: SharedMachine, op: PowerOp) -> Result<Reply> {
    match ctx.settings.power_mode {
        PowerMode::Background => ctx.power.start(vm, op)?,
        PowerMode::Blocking => ctx.power.run_blocking(&vm, op).await?,
    }
    Ok(Reply::succeed())
}
