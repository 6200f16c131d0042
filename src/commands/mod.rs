//! Command parsing and dispatch for vmrelay.
//!
//! This module separates command parsing from execution, so the grammar can
//! be unit tested without a backend.

pub mod handlers;
pub mod output;
pub mod router;
pub mod tokenizer;

pub use handlers::CommandContext;
pub use output::Reply;
pub use router::{Command, CommandRouter, ControlCommand, GetKey, SetCommand};
pub use tokenizer::{tokenize, CommandQueue};
