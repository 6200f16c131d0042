//! vmrelay - line-based VM control relay.
//!
//! This library exposes the core modules for the binary and for integration
//! tests.

pub mod backend;
pub mod commands;
pub mod config;
pub mod error;
pub mod interpreter;
pub mod logging;
pub mod power;
pub mod server;
pub mod session;
