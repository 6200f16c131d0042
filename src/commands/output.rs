//! Reply strings sent back to the controller.
//!
//! Every command produces exactly one [`Reply`]; its `Display` form is the
//! wire text, without the line terminator.

use std::fmt;

use crate::error::RelayError;

/// Output from a command handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `SUCCEED`, optionally followed by data (`SUCCEED VmName web`).
    Succeed(Option<String>),

    /// `SUCCESS`, used by `import` when the job is running.
    Success,

    /// `ERROR`, optionally followed by a reason. A bare `ERROR` is only used
    /// by `set` without a selection.
    Error(Option<String>),

    /// A bare value: `exit`, `keepAlive`, `done`, `true`, `BUSY`, a version...
    Literal(String),
}

impl Reply {
    /// Creates a bare `SUCCEED`.
    pub fn succeed() -> Self {
        Self::Succeed(None)
    }

    /// Creates `SUCCEED <data>`.
    pub fn succeed_with(data: impl Into<String>) -> Self {
        Self::Succeed(Some(data.into()))
    }

    /// Creates `ERROR <reason>`.
    pub fn error(reason: impl Into<String>) -> Self {
        Self::Error(Some(reason.into()))
    }

    /// Creates a bare `ERROR`.
    pub fn bare_error() -> Self {
        Self::Error(None)
    }

    /// Creates a bare literal reply.
    pub fn literal(value: impl Into<String>) -> Self {
        Self::Literal(value.into())
    }

    /// Creates `true` or `false`.
    pub fn flag(value: bool) -> Self {
        Self::literal(if value { "true" } else { "false" })
    }

    /// Creates `BUSY` or `IDLE`.
    pub fn busy(busy: bool) -> Self {
        Self::literal(if busy { "BUSY" } else { "IDLE" })
    }

    /// Converts an error into its `ERROR <reason>` reply.
    pub fn from_error(err: &RelayError) -> Self {
        Self::error(err.reason())
    }

    /// Returns true for the `exit` reply, after which the session ends.
    pub fn is_exit(&self) -> bool {
        matches!(self, Self::Literal(s) if s == "exit")
    }

    /// Returns true for any `ERROR` reply.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeed(None) => f.write_str("SUCCEED"),
            Self::Succeed(Some(data)) => write!(f, "SUCCEED {data}"),
            Self::Success => f.write_str("SUCCESS"),
            Self::Error(None) => f.write_str("ERROR"),
            Self::Error(Some(reason)) => write!(f, "ERROR {reason}"),
            Self::Literal(value) => f.write_str(value),
        }
    }
}

impl From<RelayError> for Reply {
    fn from(err: RelayError) -> Self {
        Self::from_error(&err)
    }
}
