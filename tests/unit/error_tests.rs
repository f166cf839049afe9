//! Unit tests for `AppError` formatting and conversions.

use agent_bridge::AppError;

/// Every variant renders as `kind: detail`.
#[test]
fn display_uses_kind_prefix() {
    assert_eq!(AppError::Config("bad".into()).to_string(), "config: bad");
    assert_eq!(AppError::Write("broken pipe".into()).to_string(), "write: broken pipe");
    assert_eq!(
        AppError::Command {
            command: "prompt".into(),
            message: "busy".into()
        }
        .to_string(),
        "command prompt: busy"
    );
    assert_eq!(AppError::Cancelled.to_string(), "cancelled");
}

/// Process exit prefers the exit code and falls back to the signal.
#[test]
fn process_exit_reports_code_or_signal() {
    let code = AppError::ProcessExited {
        code: Some(2),
        signal: None,
    };
    let signal = AppError::ProcessExited {
        code: None,
        signal: Some(9),
    };
    let unknown = AppError::ProcessExited {
        code: None,
        signal: None,
    };

    assert_eq!(code.to_string(), "process exited: code 2");
    assert_eq!(signal.to_string(), "process exited: signal 9");
    assert_eq!(unknown.to_string(), "process exited: status unknown");
}

/// Spawn errors carry the program and OS error kind.
#[test]
fn spawn_error_display_and_classification() {
    let err = AppError::Spawn {
        program: "pi".into(),
        code: "NotFound/2".into(),
        message: "No such file or directory".into(),
    };

    assert!(err.is_not_installed());
    assert_eq!(
        err.to_string(),
        "spawn: pi (NotFound/2): No such file or directory"
    );
    assert!(!AppError::Io("x".into()).is_not_installed());
}

/// TOML parse failures become configuration errors.
#[test]
fn toml_errors_convert_to_config() {
    let err: AppError = toml::from_str::<toml::Value>("= nope")
        .expect_err("invalid toml")
        .into();

    assert!(matches!(err, AppError::Config(msg) if msg.starts_with("invalid config")));
}

/// JSON failures become protocol errors.
#[test]
fn json_errors_convert_to_protocol() {
    let err: AppError = serde_json::from_str::<serde_json::Value>("{")
        .expect_err("invalid json")
        .into();

    assert!(matches!(err, AppError::Protocol(msg) if msg.starts_with("json")));
}

/// I/O failures keep their message under the io kind.
#[test]
fn io_errors_convert_to_io() {
    let err: AppError = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed").into();

    assert_eq!(err, AppError::Io("pipe closed".into()));
    assert_eq!(err.to_string(), "io: pipe closed");
}
