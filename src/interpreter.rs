//! The command interpreter: one line in, one reply out.
//!
//! Each connection owns an [`Interpreter`] and with it a [`Session`]. The
//! backend and the power jobs are shared through a [`RelayContext`].

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, error};

use crate::backend::VmBackend;
use crate::commands::handlers::{self, CommandContext};
use crate::commands::{CommandRouter, Reply};
use crate::config::InterpreterConfig;
use crate::error::RelayError;
use crate::power::PowerJobs;
use crate::session::Session;

/// State shared by every interpreter of a relay process.
#[derive(Clone)]
pub struct RelayContext {
    pub backend: Arc<dyn VmBackend>,
    pub settings: InterpreterConfig,
    pub power: Arc<PowerJobs>,
}

impl RelayContext {
    /// Creates a context with fresh power-job tracking.
    pub fn new(backend: Arc<dyn VmBackend>, settings: InterpreterConfig) -> Self {
        Self {
            backend,
            settings,
            power: Arc::new(PowerJobs::new()),
        }
    }
}

/// Interprets command lines for one session.
pub struct Interpreter {
    ctx: RelayContext,
    session: Session,
}

impl Interpreter {
    pub fn new(ctx: RelayContext) -> Self {
        Self {
            ctx,
            session: Session::new(),
        }
    }

    /// Runs one command line and returns its reply.
    ///
    /// Never fails: handler errors and panics become `ERROR` replies.
    pub async fn run(&mut self, line: &str) -> Reply {
        let command = CommandRouter::parse(line);
        debug!(verb = command.verb(), "handling command");

        let mut handler_ctx = CommandContext {
            backend: self.ctx.backend.as_ref(),
            session: &mut self.session,
            settings: &self.ctx.settings,
            power: &self.ctx.power,
        };

        let outcome = AssertUnwindSafe(handlers::dispatch(&mut handler_ctx, &command))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                debug!(verb = command.verb(), "{}: {}", e.category(), e);
                Reply::from_error(&e)
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(verb = command.verb(), "command handler panicked: {}", message);
                Reply::from_error(&RelayError::internal(format!(
                    "{} panicked: {message}",
                    command.verb()
                )))
            }
        }
    }

    /// The session state.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Clears the selection.
    pub fn reset(&mut self) {
        self.session.reset();
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
