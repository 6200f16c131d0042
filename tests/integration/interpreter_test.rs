//! Interpreter integration tests.
//!
//! Exercises selection, queries and configuration through command lines, the
//! way a controller would send them.

use pretty_assertions::assert_eq;
use vmrelay::backend::{MachineState, MockBackend, MockVm};
use vmrelay::config::InterpreterConfig;

use super::{interpreter, interpreter_with, send, test_settings, two_vm_backend};

#[tokio::test]
async fn test_select_then_get_machine_name() {
    let backend = two_vm_backend();
    let mut interp = interpreter(&backend);

    assert_eq!(send(&mut interp, "select search db").await, "SUCCEED VmName db");
    assert_eq!(send(&mut interp, "get machineName").await, "db");
    assert_eq!(send(&mut interp, "get machineId").await, "uuid-db");
    assert_eq!(send(&mut interp, "get machineState").await, "PoweredOff");
}

#[tokio::test]
async fn test_select_by_uuid() {
    let backend = two_vm_backend();
    let mut interp = interpreter(&backend);

    assert_eq!(
        send(&mut interp, "select search uuid-web").await,
        "SUCCEED VmName web"
    );
}

#[tokio::test]
async fn test_select_miss_keeps_previous_selection() {
    let backend = two_vm_backend();
    let mut interp = interpreter(&backend);

    send(&mut interp, "select search web").await;
    assert_eq!(send(&mut interp, "select search ghost").await, "ERROR NoVmNameMatched");
    assert_eq!(send(&mut interp, "select search").await, "ERROR NoVmNameMatched");
    assert_eq!(send(&mut interp, "get machineName").await, "web");
}

#[tokio::test]
async fn test_select_without_search_is_unknown() {
    let backend = two_vm_backend();
    let mut interp = interpreter(&backend);

    assert_eq!(send(&mut interp, "select web").await, "ERROR UnknownCommand");
    assert!(!interp.session().has_selection());
}

#[tokio::test]
async fn test_commands_without_selection() {
    let backend = two_vm_backend();
    let mut interp = interpreter(&backend);

    assert_eq!(send(&mut interp, "control start").await, "ERROR NoVmSelected");
    assert_eq!(send(&mut interp, "control bogus").await, "ERROR NoVmSelected");
    assert_eq!(send(&mut interp, "set cpuCount 4").await, "ERROR");
    assert_eq!(send(&mut interp, "set bogus").await, "ERROR");
    assert_eq!(send(&mut interp, "get machineName").await, "ERROR UnknownCommand");
    assert_eq!(send(&mut interp, "get powerStat").await, "ERROR UnknownCommand");
    assert_eq!(backend.vm("web").unwrap().cpus, 1);
}

#[tokio::test]
async fn test_unknown_input_leaves_state_unchanged() {
    let backend = two_vm_backend();
    let mut interp = interpreter(&backend);
    send(&mut interp, "select search web").await;
    let calls_before = backend.calls().len();

    for line in ["frobnicate", "", "KEEPALIVE", "get bogusKey", "get", "control", "set"] {
        let reply = send(&mut interp, line).await;
        assert!(reply.starts_with("ERROR"), "{line:?} gave {reply:?}");
    }

    assert_eq!(backend.calls().len(), calls_before);
    assert_eq!(send(&mut interp, "get machineName").await, "web");
}

#[tokio::test]
async fn test_exit_and_keep_alive_touch_nothing() {
    let backend = two_vm_backend();
    let mut interp = interpreter(&backend);

    assert_eq!(send(&mut interp, "keepAlive").await, "keepAlive");
    assert_eq!(send(&mut interp, "exit").await, "exit");
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn test_backend_label_is_stable() {
    let backend = two_vm_backend();
    let mut interp = interpreter(&backend);

    let first = send(&mut interp, "get backend").await;
    send(&mut interp, "select search web").await;
    let second = send(&mut interp, "get backend").await;
    assert_eq!(first, "Mock");
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_host_queries() {
    let backend = two_vm_backend();
    let mut interp = interpreter(&backend);

    assert_eq!(send(&mut interp, "get backendVersion").await, "7.0.14r161095");
    assert_eq!(send(&mut interp, "get userHomePath").await, "/home/mock");
    assert_eq!(send(&mut interp, "get systemTotalRAM").await, "16384");
    assert_eq!(send(&mut interp, "get vmxSupport").await, "true");
    assert_eq!(send(&mut interp, "get processorCount").await, "8");
    assert_eq!(send(&mut interp, "get ipconfigAndSave").await, "done");
}

#[tokio::test]
async fn test_host_query_failure_is_reported() {
    let backend = two_vm_backend();
    backend.fail_on("version");
    backend.fail_on("reconfigure_host_networking");
    let mut interp = interpreter(&backend);

    assert_eq!(send(&mut interp, "get backendVersion").await, "ERROR version failed");
    assert_eq!(
        send(&mut interp, "get ipconfigAndSave").await,
        "ERROR reconfigure_host_networking failed"
    );
}

#[tokio::test]
async fn test_set_cpu_and_ram() {
    let backend = two_vm_backend();
    let mut interp = interpreter(&backend);
    send(&mut interp, "select search web").await;

    assert_eq!(send(&mut interp, "set cpuCount 4").await, "SUCCEED");
    assert_eq!(send(&mut interp, "set ramSize 2048").await, "SUCCEED");

    let vm = backend.vm("web").unwrap();
    assert_eq!(vm.cpus, 4);
    assert_eq!(vm.ram_mib, 2048);
}

#[tokio::test]
async fn test_set_cpu_and_ram_fallbacks() {
    let backend = two_vm_backend();
    let mut interp = interpreter(&backend);
    send(&mut interp, "select search web").await;
    send(&mut interp, "set cpuCount 4").await;
    send(&mut interp, "set ramSize 4096").await;

    assert_eq!(send(&mut interp, "set cpuCount lots").await, "SUCCEED");
    assert_eq!(send(&mut interp, "set ramSize").await, "SUCCEED");

    let vm = backend.vm("web").unwrap();
    assert_eq!(vm.cpus, 1);
    assert_eq!(vm.ram_mib, 512);
}

#[tokio::test]
async fn test_set_on_running_vm_is_ignored() {
    let backend = MockBackend::with_vms(vec![
        MockVm::new("web", "uuid-web").with_state(MachineState::Running)
    ]);
    let mut interp = interpreter(&backend);
    send(&mut interp, "select search web").await;

    assert_eq!(send(&mut interp, "set cpuCount 4").await, "SUCCEED");
    assert_eq!(backend.vm("web").unwrap().cpus, 1);
}

#[tokio::test]
async fn test_set_machine_name_joins_words() {
    let backend = two_vm_backend();
    let mut interp = interpreter(&backend);
    send(&mut interp, "select search web").await;

    assert_eq!(send(&mut interp, "set machineName web server 2").await, "SUCCEED");
    assert_eq!(send(&mut interp, "get machineName").await, "web server 2");
    assert_eq!(
        send(&mut interp, "set machineName \"front end\"").await,
        "SUCCEED"
    );
    assert!(backend.vm("front end").is_some());
    assert_eq!(
        send(&mut interp, "set machineName").await,
        "ERROR MissingArgument name"
    );
}

#[tokio::test]
async fn test_set_failure_is_optimistic_by_default() {
    let backend = two_vm_backend();
    backend.fail_on("set_ram_size");
    let mut interp = interpreter(&backend);
    send(&mut interp, "select search web").await;

    assert_eq!(send(&mut interp, "set ramSize 1024").await, "SUCCEED");
    assert_eq!(backend.vm("web").unwrap().ram_mib, 512);
}

#[tokio::test]
async fn test_set_failure_in_strict_mode() {
    let backend = two_vm_backend();
    backend.fail_on("set_ram_size");
    let settings = InterpreterConfig {
        strict_set: true,
        ..test_settings()
    };
    let mut interp = interpreter_with(&backend, settings);
    send(&mut interp, "select search web").await;

    assert_eq!(
        send(&mut interp, "set ramSize 1024").await,
        "ERROR PartialFailure set_ram_size failed"
    );
    assert_eq!(send(&mut interp, "set cpuCount 2").await, "SUCCEED");
}

#[tokio::test]
async fn test_set_fails_when_locked_elsewhere() {
    let backend = two_vm_backend();
    let settings = InterpreterConfig {
        strict_set: true,
        ..test_settings()
    };
    let mut interp = interpreter_with(&backend, settings);
    send(&mut interp, "select search web").await;

    let _held = backend.locks().acquire("uuid-web").unwrap();
    let reply = send(&mut interp, "set cpuCount 2").await;
    assert!(reply.starts_with("ERROR PartialFailure"), "got {reply}");
    assert_eq!(backend.vm("web").unwrap().cpus, 1);
}

#[tokio::test]
async fn test_port_forwarding_offline() {
    let backend = two_vm_backend();
    let mut interp = interpreter(&backend);
    send(&mut interp, "select search web").await;

    assert_eq!(send(&mut interp, "set addPortForwarding 80 8080").await, "SUCCEED");
    assert_eq!(backend.vm("web").unwrap().port_forwards.get(&80), Some(&8080));
    assert!(backend.calls().contains(&"add_port_forward uuid-web 80 8080 false".to_string()));

    assert_eq!(send(&mut interp, "set removePortForwarding 80").await, "SUCCEED");
    assert!(backend.vm("web").unwrap().port_forwards.is_empty());
}

#[tokio::test]
async fn test_port_forwarding_online_when_running() {
    let backend = MockBackend::with_vms(vec![
        MockVm::new("web", "uuid-web").with_state(MachineState::Running)
    ]);
    let mut interp = interpreter(&backend);
    send(&mut interp, "select search web").await;

    assert_eq!(send(&mut interp, "set addPortForwarding 22 2222").await, "SUCCEED");
    assert!(backend.calls().contains(&"add_port_forward uuid-web 22 2222 true".to_string()));
    assert_eq!(backend.vm("web").unwrap().port_forwards.get(&22), Some(&2222));
}

#[tokio::test]
async fn test_port_forwarding_argument_errors() {
    let backend = two_vm_backend();
    let mut interp = interpreter(&backend);
    send(&mut interp, "select search web").await;

    assert_eq!(
        send(&mut interp, "set addPortForwarding 80").await,
        "ERROR MissingArgument hostPort"
    );
    assert_eq!(
        send(&mut interp, "set addPortForwarding").await,
        "ERROR MissingArgument guestPort"
    );
    assert_eq!(
        send(&mut interp, "set addPortForwarding 0 8080").await,
        "ERROR InvalidArgument guestPort"
    );
    assert_eq!(
        send(&mut interp, "set removePortForwarding http").await,
        "ERROR InvalidArgument guestPort"
    );
    assert!(backend.vm("web").unwrap().port_forwards.is_empty());
}

#[tokio::test]
async fn test_control_output_exports() {
    let backend = two_vm_backend();
    let mut interp = interpreter(&backend);
    send(&mut interp, "select search db").await;

    assert_eq!(
        send(&mut interp, "control output /tmp/db.ova").await,
        "SUCCEED"
    );
    assert_eq!(backend.vm("db").unwrap().exports, vec!["/tmp/db.ova"]);
    assert_eq!(
        send(&mut interp, "control output").await,
        "ERROR MissingArgument path"
    );
}

#[tokio::test]
async fn test_control_output_failure() {
    let backend = two_vm_backend();
    backend.fail_on("export_to");
    let mut interp = interpreter(&backend);
    send(&mut interp, "select search db").await;

    assert_eq!(
        send(&mut interp, "control output /tmp/db.ova").await,
        "ERROR export_to failed"
    );
}

#[tokio::test]
async fn test_delete_missing_vm() {
    let backend = two_vm_backend();
    let mut interp = interpreter(&backend);

    assert_eq!(send(&mut interp, "del ghost").await, "ERROR vm not found: ghost");
    assert_eq!(send(&mut interp, "del").await, "ERROR MissingArgument target");
    assert_eq!(backend.vm_count(), 2);
}

#[tokio::test]
async fn test_delete_selected_vm_clears_selection() {
    let backend = two_vm_backend();
    let mut interp = interpreter(&backend);
    send(&mut interp, "select search web").await;

    assert_eq!(send(&mut interp, "del web").await, "SUCCEED");
    assert_eq!(backend.vm_count(), 1);
    assert_eq!(backend.refresh_count(), 1);
    assert!(!interp.session().has_selection());
    assert_eq!(send(&mut interp, "control start").await, "ERROR NoVmSelected");
}

#[tokio::test]
async fn test_delete_other_vm_keeps_selection() {
    let backend = two_vm_backend();
    let mut interp = interpreter(&backend);
    send(&mut interp, "select search web").await;

    assert_eq!(send(&mut interp, "del uuid-db").await, "SUCCEED");
    assert_eq!(send(&mut interp, "get machineName").await, "web");
}

#[tokio::test]
async fn test_delete_running_vm_fails() {
    let backend = MockBackend::with_vms(vec![
        MockVm::new("web", "uuid-web").with_state(MachineState::Running)
    ]);
    let mut interp = interpreter(&backend);

    let reply = send(&mut interp, "del web").await;
    assert!(reply.starts_with("ERROR invalid vm state"), "got {reply}");
    assert_eq!(backend.vm_count(), 1);
}

#[tokio::test]
async fn test_delete_without_auto_clear() {
    let backend = two_vm_backend();
    let settings = InterpreterConfig {
        clear_selection_on_delete: false,
        ..test_settings()
    };
    let mut interp = interpreter_with(&backend, settings);
    send(&mut interp, "select search web").await;

    assert_eq!(send(&mut interp, "del web").await, "SUCCEED");
    assert!(interp.session().has_selection());
    let reply = send(&mut interp, "get machineName").await;
    assert!(reply.starts_with("ERROR"), "got {reply}");
}

#[tokio::test]
async fn test_sessions_are_independent() {
    let backend = two_vm_backend();
    let mut first = interpreter(&backend);
    let mut second = interpreter(&backend);

    send(&mut first, "select search web").await;
    assert_eq!(send(&mut second, "get machineName").await, "ERROR UnknownCommand");
    send(&mut second, "select search db").await;
    assert_eq!(send(&mut first, "get machineName").await, "web");
}

#[tokio::test]
async fn test_apostrophes_in_names_are_literal() {
    let backend = MockBackend::with_vms(vec![MockVm::new("O'Brien", "uuid-ob")]);
    let mut interp = interpreter(&backend);

    assert_eq!(
        send(&mut interp, "select search O'Brien").await,
        "SUCCEED VmName O'Brien"
    );
    assert_eq!(
        send(&mut interp, "set machineName Bob's build box").await,
        "SUCCEED"
    );
    assert_eq!(backend.vm("uuid-ob").unwrap().name, "Bob's build box");
}

#[tokio::test]
async fn test_quoted_windows_locator_keeps_backslashes() {
    let backend = two_vm_backend();
    let mut interp = interpreter(&backend);

    assert_eq!(
        send(&mut interp, r#"import "C:\temp\new\vm.ova""#).await,
        "SUCCESS"
    );
    assert!(backend
        .calls()
        .contains(&r"begin_import C:\temp\new\vm.ova".to_string()));
    assert_eq!(send(&mut interp, "get importedNewName").await, "");
}
