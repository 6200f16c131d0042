//! Integration test modules.

pub mod config_test;
pub mod interpreter_test;
pub mod power_test;
pub mod server_test;

use std::sync::Arc;

use vmrelay::backend::{MockBackend, MockVm};
use vmrelay::config::InterpreterConfig;
use vmrelay::interpreter::{Interpreter, RelayContext};

/// Settings for tests: no settle delay after deletes.
pub fn test_settings() -> InterpreterConfig {
    InterpreterConfig {
        delete_settle_ms: 0,
        ..InterpreterConfig::default()
    }
}

/// A mock backend with two powered-off VMs, `web` and `db`.
pub fn two_vm_backend() -> MockBackend {
    MockBackend::with_vms(vec![
        MockVm::new("web", "uuid-web"),
        MockVm::new("db", "uuid-db"),
    ])
}

/// Creates an interpreter over `backend` with the given settings.
pub fn interpreter_with(backend: &MockBackend, settings: InterpreterConfig) -> Interpreter {
    Interpreter::new(RelayContext::new(Arc::new(backend.clone()), settings))
}

/// Creates an interpreter over `backend` with test settings.
pub fn interpreter(backend: &MockBackend) -> Interpreter {
    interpreter_with(backend, test_settings())
}

/// Runs `line` and returns the wire text of the reply.
pub async fn send(interp: &mut Interpreter, line: &str) -> String {
    interp.run(line).await.to_string()
}
