//! Power operation integration tests (control start/stop and power queries).

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use vmrelay::backend::{MachineState, MockBackend, MockOptions, MockVm};
use vmrelay::config::{InterpreterConfig, PowerMode};
use vmrelay::interpreter::{Interpreter, RelayContext};

use super::{interpreter, interpreter_with, send, test_settings};

fn slow_backend() -> MockBackend {
    let options = MockOptions {
        power_delay: Duration::from_millis(50),
        ..MockOptions::default()
    };
    MockBackend::with_options(vec![MockVm::new("web", "uuid-web")], options)
}

/// Polls `get powerStat` until the job is idle.
async fn wait_power_idle(interp: &mut Interpreter) {
    for _ in 0..200 {
        if send(interp, "get powerStat").await == "IDLE" {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("power job never finished");
}

#[tokio::test]
async fn test_background_start_reports_busy_then_success() {
    let backend = slow_backend();
    let mut interp = interpreter(&backend);
    send(&mut interp, "select search web").await;

    assert_eq!(send(&mut interp, "control start").await, "SUCCEED");
    assert_eq!(send(&mut interp, "get powerStat").await, "BUSY");
    assert_eq!(send(&mut interp, "control start").await, "ERROR PowerBusy");
    assert_eq!(send(&mut interp, "keepAlive").await, "keepAlive");

    wait_power_idle(&mut interp).await;
    assert_eq!(send(&mut interp, "get powerSucceeded").await, "true");
    assert_eq!(send(&mut interp, "get powerError").await, "");
    assert_eq!(send(&mut interp, "get machineState").await, "Running");
}

#[tokio::test]
async fn test_background_failure_is_queryable() {
    let backend = MockBackend::with_vms(vec![MockVm::new("web", "uuid-web")]);
    let mut interp = interpreter(&backend);
    send(&mut interp, "select search web").await;

    assert_eq!(send(&mut interp, "control stop").await, "SUCCEED");
    wait_power_idle(&mut interp).await;

    assert_eq!(send(&mut interp, "get powerSucceeded").await, "false");
    assert_eq!(
        send(&mut interp, "get powerError").await,
        "invalid vm state: expected Running, got PoweredOff"
    );
}

#[tokio::test]
async fn test_power_status_is_shared_between_sessions() {
    let backend = slow_backend();
    let ctx = RelayContext::new(Arc::new(backend.clone()), test_settings());
    let mut first = Interpreter::new(ctx.clone());
    let mut second = Interpreter::new(ctx);

    send(&mut first, "select search web").await;
    send(&mut second, "select search web").await;
    assert_eq!(send(&mut first, "control start").await, "SUCCEED");
    assert_eq!(send(&mut second, "get powerStat").await, "BUSY");
    assert_eq!(send(&mut second, "control start").await, "ERROR PowerBusy");

    wait_power_idle(&mut second).await;
    assert_eq!(backend.vm("web").unwrap().state, MachineState::Running);
}

#[tokio::test]
async fn test_blocking_mode_waits_for_completion() {
    let backend = slow_backend();
    let settings = InterpreterConfig {
        power_mode: PowerMode::Blocking,
        ..test_settings()
    };
    let mut interp = interpreter_with(&backend, settings);
    send(&mut interp, "select search web").await;

    assert_eq!(send(&mut interp, "control start").await, "SUCCEED");
    assert_eq!(send(&mut interp, "get machineState").await, "Running");
    assert_eq!(send(&mut interp, "get powerStat").await, "IDLE");
    assert_eq!(
        send(&mut interp, "control start").await,
        "ERROR invalid vm state: expected PoweredOff, got Running"
    );

    assert_eq!(send(&mut interp, "control stop").await, "SUCCEED");
    assert_eq!(send(&mut interp, "get machineState").await, "PoweredOff");
}

#[tokio::test]
async fn test_blocking_mode_reports_backend_failure() {
    let backend = MockBackend::with_vms(vec![MockVm::new("web", "uuid-web")]);
    backend.fail_on("launch");
    let settings = InterpreterConfig {
        power_mode: PowerMode::Blocking,
        ..test_settings()
    };
    let mut interp = interpreter_with(&backend, settings);
    send(&mut interp, "select search web").await;

    assert_eq!(send(&mut interp, "control start").await, "ERROR launch failed");
    assert_eq!(send(&mut interp, "get powerSucceeded").await, "false");
    assert_eq!(send(&mut interp, "get powerError").await, "launch failed");
}

#[tokio::test]
async fn test_start_on_running_vm_by_power_mode() {
    let running = || {
        MockBackend::with_vms(vec![
            MockVm::new("web", "uuid-web").with_state(MachineState::Running)
        ])
    };

    let backend = running();
    let mut background = interpreter(&backend);
    send(&mut background, "select search web").await;
    assert_eq!(send(&mut background, "control start").await, "SUCCEED");
    wait_power_idle(&mut background).await;
    assert_eq!(
        send(&mut background, "get powerError").await,
        "invalid vm state: expected PoweredOff, got Running"
    );

    let backend = running();
    let settings = InterpreterConfig {
        power_mode: PowerMode::Blocking,
        ..test_settings()
    };
    let mut blocking = interpreter_with(&backend, settings);
    send(&mut blocking, "select search web").await;
    assert_eq!(
        send(&mut blocking, "control start").await,
        "ERROR invalid vm state: expected PoweredOff, got Running"
    );
}
