//! Agent process spawner.
//!
//! Launches the agent with an explicit program, arguments, working
//! directory and environment, with all three stdio streams piped and
//! `kill_on_drop(true)` so the process never outlives its channel.
//!
//! Launch failures are reported as [`AppError::Spawn`] carrying the OS error
//! kind, which lets callers tell "not installed" apart from a failed command.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tracing::{debug, info};

use crate::config::AgentConfig;
use crate::{AppError, Result};

/// Everything needed to launch one agent process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnConfig {
    /// Executable to run.
    pub program: String,
    /// Arguments, typically selecting RPC mode.
    pub args: Vec<String>,
    /// Working directory of the agent (the session's project root).
    pub cwd: PathBuf,
    /// Variables added on top of the inherited environment.
    pub env: HashMap<String, String>,
}

impl SpawnConfig {
    /// Build a spawn configuration for `cwd` from the agent settings.
    #[must_use]
    pub fn from_agent(agent: &AgentConfig, cwd: PathBuf) -> Self {
        Self {
            program: agent.command.clone(),
            args: agent.args.clone(),
            cwd,
            env: agent.env.clone(),
        }
    }
}

/// How the agent process ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExitInfo {
    /// Exit code for a normal exit.
    pub code: Option<i32>,
    /// Signal number when killed by a signal (unix only).
    pub signal: Option<i32>,
}

impl ExitInfo {
    /// Convert into the error every outstanding call is rejected with.
    #[must_use]
    pub fn into_error(self) -> AppError {
        AppError::ProcessExited {
            code: self.code,
            signal: self.signal,
        }
    }
}

impl From<ExitStatus> for ExitInfo {
    fn from(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = std::os::unix::process::ExitStatusExt::signal(&status);
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

/// Stdio handles of a freshly spawned agent.
#[derive(Debug)]
pub struct AgentProcess {
    /// Child handle; dropping it kills the process.
    pub child: Child,
    /// Agent stdin (commands).
    pub stdin: ChildStdin,
    /// Agent stdout (responses and events).
    pub stdout: ChildStdout,
    /// Agent stderr (diagnostics only).
    pub stderr: Option<ChildStderr>,
}

/// Spawn the agent process described by `config`.
///
/// # Errors
///
/// - [`AppError::Spawn`] when the OS refuses to start the executable; `code`
///   starts with the [`std::io::ErrorKind`] name (`NotFound`,
///   `PermissionDenied`, ...).
/// - [`AppError::Io`] when a stdio pipe could not be captured.
pub fn spawn_agent(config: &SpawnConfig) -> Result<AgentProcess> {
    let mut cmd = Command::new(&config.program);
    cmd.args(&config.args)
        .envs(&config.env)
        .current_dir(&config.cwd)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|err| spawn_error(&config.program, &err))?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| AppError::Io("failed to capture agent stdin".into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::Io("failed to capture agent stdout".into()))?;
    let stderr = child.stderr.take();

    info!(
        program = config.program,
        cwd = %config.cwd.display(),
        pid = child.id(),
        "agent process spawned"
    );

    Ok(AgentProcess {
        child,
        stdin,
        stdout,
        stderr,
    })
}

/// Classify an OS launch failure.
#[must_use]
pub fn spawn_error(program: &str, err: &std::io::Error) -> AppError {
    let kind = format!("{:?}", err.kind());
    let code = match err.raw_os_error() {
        Some(errno) => format!("{kind}/{errno}"),
        None => kind,
    };
    AppError::Spawn {
        program: program.to_owned(),
        code,
        message: err.to_string(),
    }
}

/// Forward agent stderr to the log at `DEBUG` until the pipe closes.
///
/// Bytes that are not UTF-8 are replaced rather than ending the forwarder,
/// so the pipe keeps draining. Returns the number of lines forwarded.
pub(crate) async fn forward_stderr<R>(label: String, stderr: R) -> usize
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stderr);
    let mut buf = Vec::new();
    let mut forwarded = 0;
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\n', '\r']);
                debug!(label, line, "agent stderr");
                forwarded += 1;
            }
            Err(err) => {
                debug!(label, %err, "agent stderr closed");
                break;
            }
        }
    }
    forwarded
}
