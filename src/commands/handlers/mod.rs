//! Command handlers for vmrelay.
//!
//! Each handler takes a command context and returns the reply, or an error
//! that the interpreter turns into an `ERROR` reply.

pub mod appliance;
pub mod configure;
pub mod control;
pub mod query;
pub mod selection;
pub mod system;

use std::sync::Arc;

use super::output::Reply;
use super::router::Command;
use crate::backend::VmBackend;
use crate::config::InterpreterConfig;
use crate::error::Result;
use crate::power::PowerJobs;
use crate::session::Session;

/// Context provided to command handlers.
pub struct CommandContext<'a> {
    /// Backend all VM operations go through.
    pub backend: &'a dyn VmBackend,
    /// The connection's session.
    pub session: &'a mut Session,
    /// Interpreter policies.
    pub settings: &'a InterpreterConfig,
    /// Shared power jobs.
    pub power: &'a Arc<PowerJobs>,
}

/// Routes a parsed command to its handler.
pub async fn dispatch(ctx: &mut CommandContext<'_>, command: &Command) -> Result<Reply> {
    match command {
        Command::Select { query } => selection::handle_select(ctx, query.as_deref()).await,
        Command::Control(cmd) => control::handle_control(ctx, cmd).await,
        Command::Get(key) => query::handle_get(ctx, *key).await,
        Command::Set(cmd) => configure::handle_set(ctx, cmd).await,
        Command::Import { locator } => appliance::handle_import(ctx, locator.as_deref()).await,
        Command::Delete { target } => appliance::handle_delete(ctx, target.as_deref()).await,
        Command::Exit => Ok(system::handle_exit()),
        Command::KeepAlive => Ok(system::handle_keep_alive()),
        Command::Unknown(verb) => system::handle_unknown(verb),
    }
}
