//! Error types for vmrelay.
//!
//! Defines the main error enum used throughout the relay. Protocol-level
//! kinds (`NoVmSelected`, `UnknownCommand`, ...) render to the exact tokens
//! the controller matches on; everything else carries a human message.

use thiserror::Error;

/// Main error type for vmrelay operations.
#[derive(Error, Debug)]
pub enum RelayError {
    /// A command that needs a selected VM was issued without one.
    #[error("NoVmSelected")]
    NoVmSelected,

    /// `select search` did not match any VM.
    #[error("NoVmNameMatched")]
    NoVmNameMatched,

    /// Unrecognized verb, sub-verb or query key.
    #[error("UnknownCommand")]
    UnknownCommand,

    /// A required argument was not supplied.
    #[error("MissingArgument {0}")]
    MissingArgument(&'static str),

    /// An argument could not be parsed.
    #[error("InvalidArgument {0}")]
    InvalidArgument(&'static str),

    /// An appliance import is already in flight.
    #[error("ImportBusy")]
    ImportBusy,

    /// A power operation is already running on the selected VM.
    #[error("PowerBusy")]
    PowerBusy,

    /// A mutation was attempted but the backend reported a failure.
    #[error("PartialFailure {0}")]
    PartialFailure(String),

    /// VM lookup failed inside the backend.
    #[error("vm not found: {0}")]
    VmNotFound(String),

    /// The VM is not in the state an operation requires.
    #[error("invalid vm state: expected {expected}, got {actual}")]
    InvalidState {
        /// State the operation requires.
        expected: String,
        /// State the VM is actually in.
        actual: String,
    },

    /// Another session holds the write lock on this VM.
    #[error("vm is locked by another session: {0}")]
    Locked(String),

    /// Backend driver errors (tool failures, unexpected output, etc.)
    #[error("Backend error: {0}")]
    Backend(String),

    /// Configuration errors (invalid config file, bad listen address, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors from the transport or from spawned tools.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RelayError {
    /// Creates a backend error with the given message.
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Creates an invalid-state error.
    pub fn invalid_state(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::InvalidState {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Returns the reason text sent after `ERROR ` on the wire.
    ///
    /// Backend messages pass through verbatim, without the category prefix.
    pub fn reason(&self) -> String {
        match self {
            Self::Backend(msg) | Self::Internal(msg) | Self::Config(msg) => msg.clone(),
            Self::Io(e) => e.to_string(),
            other => other.to_string(),
        }
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::NoVmSelected
            | Self::NoVmNameMatched
            | Self::UnknownCommand
            | Self::MissingArgument(_)
            | Self::InvalidArgument(_)
            | Self::ImportBusy
            | Self::PowerBusy
            | Self::PartialFailure(_) => "Protocol Error",
            Self::VmNotFound(_) | Self::InvalidState { .. } | Self::Locked(_) | Self::Backend(_) => {
                "Backend Error"
            }
            Self::Config(_) => "Configuration Error",
            Self::Io(_) => "I/O Error",
            Self::Internal(_) => "Internal Error",
        }
    }
}

/// Result type alias using RelayError.
pub type Result<T> = std::result::Result<T, RelayError>;
