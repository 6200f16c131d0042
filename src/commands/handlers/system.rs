//! Session command handlers (exit, keepAlive, unknown verbs).

use crate::commands::output::Reply;
use crate::error::{RelayError, Result};

/// Handle `exit`. The transport closes the connection after sending it.
pub fn handle_exit() -> Reply {
    Reply::literal("exit")
}

/// Handle `keepAlive`.
pub fn handle_keep_alive() -> Reply {
    Reply::literal("keepAlive")
}

/// Handle an unknown verb.
pub fn handle_unknown(verb: &str) -> Result<Reply> {
    tracing::debug!(verb, "unknown command");
    Err(RelayError::UnknownCommand)
}
