//! `get` handler.

use super::CommandContext;
use crate::backend::SharedMachine;
use crate::commands::output::Reply;
use crate::commands::router::GetKey;
use crate::error::{RelayError, Result};

/// Handle `get <key>`.
///
/// Selection-scoped keys without a selection, and unknown keys, are both
/// `UnknownCommand`.
pub async fn handle_get(ctx: &mut CommandContext<'_>, key: Option<GetKey>) -> Result<Reply> {
    let key = key.ok_or(RelayError::UnknownCommand)?;
    let backend = ctx.backend;

    let reply = match key {
        GetKey::BackendVersion => Reply::literal(backend.version().await?),
        GetKey::Backend => Reply::literal(backend.label()),
        GetKey::ImportStat => Reply::busy(backend.is_import_busy()),
        GetKey::ImportProgress => Reply::literal(backend.import_progress().to_string()),
        GetKey::ImportedNewName => Reply::literal(backend.imported_name()),
        GetKey::ImportSucceeded => Reply::flag(backend.import_succeeded()),
        GetKey::IpconfigAndSave => {
            backend.reconfigure_host_networking().await?;
            Reply::literal("done")
        }
        GetKey::UserHomePath => Reply::literal(backend.home_path().await?),
        GetKey::SystemTotalRam => Reply::literal(backend.total_ram().await?.to_string()),
        GetKey::VmxSupport => Reply::flag(backend.vmx_support().await?),
        GetKey::ProcessorCount => Reply::literal(backend.cpu_count().await?.to_string()),
        GetKey::MachineState => Reply::literal(selected(ctx)?.machine_state().await?.as_str()),
        GetKey::MachineId => Reply::literal(selected(ctx)?.uuid()),
        GetKey::MachineName => Reply::literal(selected(ctx)?.name().await?),
        GetKey::PowerStat => Reply::busy(ctx.power.status(selected(ctx)?.uuid()).busy),
        GetKey::PowerSucceeded => Reply::flag(ctx.power.status(selected(ctx)?.uuid()).succeeded),
        GetKey::PowerError => Reply::literal(
            ctx.power
                .status(selected(ctx)?.uuid())
                .error
                .unwrap_or_default(),
        ),
    };
    Ok(reply)
}

fn selected(ctx: &CommandContext<'_>) -> Result<SharedMachine> {
    ctx.session
        .selected()
        .cloned()
        .ok_or(RelayError::UnknownCommand)
}
