//! Configuration loading integration tests.

use std::io::Write;

use pretty_assertions::assert_eq;
use tempfile::NamedTempFile;
use vmrelay::backend;
use vmrelay::config::{BackendKind, Config, PowerMode};
use vmrelay::interpreter::{Interpreter, RelayContext};

fn write_temp(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_missing_config_file_gives_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::load_from_file(&dir.path().join("absent.toml")).unwrap();

    assert_eq!(config.server.listen, "127.0.0.1:8998");
    assert_eq!(config.interpreter.power_mode, PowerMode::Background);
    assert_eq!(config.backend.kind, BackendKind::VBoxManage);
}

#[test]
fn test_invalid_config_names_the_file() {
    let file = write_temp("[server]\nlisten = 42\n");
    let err = Config::load_from_file(file.path()).unwrap_err();

    assert_eq!(err.category(), "Configuration Error");
    assert!(err.to_string().contains(&file.path().display().to_string()));
}

#[tokio::test]
async fn test_mock_backend_from_seed_file() {
    let config_file = write_temp(
        r#"
[interpreter]
strict_set = true
delete_settle_ms = 0

[backend]
kind = "mock"
"#,
    );
    let seed = write_temp(
        r#"
[[vm]]
name = "build agent"
uuid = "uuid-build"
cpus = 2

[[vm]]
name = "runner"
uuid = "uuid-runner"
state = "Running"
"#,
    );

    let config = Config::load_from_file(config_file.path()).unwrap();
    let backend = backend::from_config(&config.backend, Some(seed.path())).unwrap();
    assert_eq!(backend.label(), "Mock");

    let mut interp = Interpreter::new(RelayContext::new(backend, config.interpreter));
    assert_eq!(
        interp.run("select search \"build agent\"").await.to_string(),
        "SUCCEED VmName build agent"
    );
    assert_eq!(
        interp.run("select search runner").await.to_string(),
        "SUCCEED VmName runner"
    );
    assert_eq!(interp.run("get machineState").await.to_string(), "Running");
}

#[test]
fn test_unreadable_seed_file() {
    let config = Config {
        backend: vmrelay::config::BackendConfig {
            kind: BackendKind::Mock,
            ..Default::default()
        },
        ..Default::default()
    };
    let dir = tempfile::tempdir().unwrap();
    let result = backend::from_config(&config.backend, Some(&dir.path().join("none.toml")));
    assert!(result.is_err());
}
