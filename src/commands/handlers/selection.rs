//! `select search` handler.

use super::CommandContext;
use crate::commands::output::Reply;
use crate::error::{RelayError, Result};

/// Handle `select search <query>`.
///
/// On a miss the previous selection is kept.
pub async fn handle_select(ctx: &mut CommandContext<'_>, query: Option<&str>) -> Result<Reply> {
    let query = query.ok_or(RelayError::NoVmNameMatched)?;

    let vm = ctx
        .backend
        .resolve_vm(query)
        .await?
        .ok_or(RelayError::NoVmNameMatched)?;
    let name = vm.name().await?;

    ctx.session.select(vm);
    Ok(Reply::succeed_with(format!("VmName {name}")))
}
