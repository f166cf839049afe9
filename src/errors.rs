//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// The agent executable could not be launched.
    Spawn {
        /// Program that failed to start.
        program: String,
        /// OS error kind name (e.g. `NotFound`), plus the raw errno when known.
        code: String,
        /// Underlying OS message.
        message: String,
    },
    /// Writing a command line to the agent's stdin failed.
    Write(String),
    /// The agent process exited while calls were outstanding.
    ProcessExited {
        /// Exit code, if the process exited normally.
        code: Option<i32>,
        /// Terminating signal, if the process was killed by one.
        signal: Option<i32>,
    },
    /// The agent answered a command with `success: false`.
    Command {
        /// Name of the failed command.
        command: String,
        /// Error text reported by the agent.
        message: String,
    },
    /// A command failure that looks like missing or invalid credentials.
    AuthRequired(String),
    /// Framing or payload shape violation on either protocol.
    Protocol(String),
    /// File-system or I/O operation failure.
    Io(String),
    /// Requested entity does not exist.
    NotFound(String),
    /// Session store read or write failure.
    Persistence(String),
    /// The call was abandoned because its session shut down.
    Cancelled,
}

impl AppError {
    /// Whether this error was produced by a missing agent executable.
    #[must_use]
    pub fn is_not_installed(&self) -> bool {
        matches!(self, Self::Spawn { code, .. } if code.starts_with("NotFound"))
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Spawn {
                program,
                code,
                message,
            } => write!(f, "spawn: {program} ({code}): {message}"),
            Self::Write(msg) => write!(f, "write: {msg}"),
            Self::ProcessExited { code, signal } => match (code, signal) {
                (Some(code), _) => write!(f, "process exited: code {code}"),
                (None, Some(signal)) => write!(f, "process exited: signal {signal}"),
                (None, None) => write!(f, "process exited: status unknown"),
            },
            Self::Command { command, message } => write!(f, "command {command}: {message}"),
            Self::AuthRequired(msg) => write!(f, "auth required: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Persistence(msg) => write!(f, "persistence: {msg}"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(format!("json: {err}"))
    }
}
