//! Unit tests for configuration parsing.

use std::path::PathBuf;

use serial_test::serial;

use agent_bridge::config::GlobalConfig;
use agent_bridge::AppError;

/// An empty document yields the defaults.
#[test]
fn empty_config_uses_defaults() {
    let config = GlobalConfig::from_toml_str("").expect("empty config is valid");

    assert_eq!(config, GlobalConfig::default());
    assert_eq!(config.agent.command, "pi");
    assert_eq!(config.agent.args, vec!["--mode", "rpc"]);
    assert!(config.queue_notice);
    assert!(config.session_store.is_none());
}

/// Every documented key is honoured.
#[test]
fn full_config_is_parsed() {
    let raw = r#"
session_store = "/var/lib/bridge/sessions.json"
queue_notice = false

[agent]
command = "/opt/pi/bin/pi"
args = ["--mode", "rpc", "--no-color"]
env = { PI_LOG = "warn" }
edit_tools = ["edit", "write", "patch"]
"#;

    let config = GlobalConfig::from_toml_str(raw).expect("valid config");

    assert_eq!(config.agent.command, "/opt/pi/bin/pi");
    assert_eq!(config.agent.args.len(), 3);
    assert_eq!(config.agent.env.get("PI_LOG").map(String::as_str), Some("warn"));
    assert!(config.is_edit_tool("patch"));
    assert!(!config.is_edit_tool("read"));
    assert!(!config.queue_notice);
    assert_eq!(
        config.session_store,
        Some(PathBuf::from("/var/lib/bridge/sessions.json"))
    );
}

/// A blank agent command is rejected.
#[test]
fn blank_agent_command_is_rejected() {
    let err = GlobalConfig::from_toml_str("[agent]\ncommand = \"  \"\n").expect_err("must fail");

    assert!(matches!(err, AppError::Config(msg) if msg.contains("agent.command")));
}

/// Malformed TOML is a configuration error.
#[test]
fn malformed_toml_is_rejected() {
    let err = GlobalConfig::from_toml_str("queue_notice = ").expect_err("must fail");

    assert!(matches!(err, AppError::Config(_)));
}

/// A missing file is reported, not defaulted.
#[test]
fn missing_file_is_a_config_error() {
    let err = GlobalConfig::load_from_path("/definitely/not/here.toml").expect_err("must fail");

    assert!(matches!(err, AppError::Config(msg) if msg.contains("failed to read config")));
}

/// A `~/` store path is expanded against `HOME`.
#[test]
#[serial]
fn session_store_tilde_is_expanded() {
    let home = tempfile::tempdir().expect("tempdir");
    let previous = std::env::var_os("HOME");
    std::env::set_var("HOME", home.path());

    let config = GlobalConfig::from_toml_str("session_store = \"~/bridge/sessions.json\"\n");

    match previous {
        Some(value) => std::env::set_var("HOME", value),
        None => std::env::remove_var("HOME"),
    }

    let config = config.expect("valid config");
    assert_eq!(
        config.session_store,
        Some(home.path().join("bridge/sessions.json"))
    );
}
