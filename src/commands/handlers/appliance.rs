//! `import` and `del` handlers.
//!
//! These are the two verbs whose backend calls are long-running or
//! destructive: import gets a busy guard, delete gets a settle delay and an
//! index refresh.

use tracing::{info, warn};

use super::CommandContext;
use crate::commands::output::Reply;
use crate::error::{RelayError, Result};

/// Reply sent when the import job is idle right after being started.
pub const IMPORT_NOT_STARTED: &str = "UnImplemented error code";

/// Handle `import <locator...>`.
///
/// Starts the import, then polls busy state once: busy means the import is
/// running (`SUCCESS`); idle means it finished or never started.
pub async fn handle_import(ctx: &mut CommandContext<'_>, locator: Option<&str>) -> Result<Reply> {
    let locator = locator.ok_or(RelayError::MissingArgument("locator"))?;
    if ctx.backend.is_import_busy() {
        return Err(RelayError::ImportBusy);
    }

    match ctx.backend.begin_import(locator).await {
        Ok(()) => {}
        Err(RelayError::ImportBusy) => return Err(RelayError::ImportBusy),
        Err(e) => warn!("Import of {} did not start: {}", locator, e),
    }

    if ctx.backend.is_import_busy() {
        Ok(Reply::Success)
    } else {
        Ok(Reply::error(IMPORT_NOT_STARTED))
    }
}

/// Handle `del <nameOrUuid>`.
pub async fn handle_delete(ctx: &mut CommandContext<'_>, target: Option<&str>) -> Result<Reply> {
    let target = target.ok_or(RelayError::MissingArgument("target"))?;

    // Only needed to tell whether the selection goes away with the VM.
    let deleted_uuid = match ctx.session.selected() {
        Some(_) if ctx.settings.clear_selection_on_delete => ctx
            .backend
            .resolve_vm(target)
            .await
            .ok()
            .flatten()
            .map(|vm| vm.uuid().to_string()),
        _ => None,
    };

    ctx.backend.delete_fully(target).await?;
    info!("Deleted VM {}", target);

    let settle = ctx.settings.delete_settle();
    if !settle.is_zero() {
        tokio::time::sleep(settle).await;
    }
    if let Err(e) = ctx.backend.refresh_index().await {
        warn!("Index refresh after deleting {} failed: {}", target, e);
    }

    if let Some(uuid) = deleted_uuid {
        ctx.session.clear_if_selected(&uuid);
    }
    Ok(Reply::succeed())
}
