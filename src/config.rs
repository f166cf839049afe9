//! Global configuration parsing and validation.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{AppError, Result};

/// How to launch the agent subprocess.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AgentConfig {
    /// Agent executable (looked up on `PATH` when not absolute).
    #[serde(default = "default_command")]
    pub command: String,
    /// Arguments that put the agent into RPC mode.
    #[serde(default = "default_args")]
    pub args: Vec<String>,
    /// Extra environment variables layered over the inherited environment.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Tool names whose executions are snapshotted for diff synthesis.
    #[serde(default = "default_edit_tools")]
    pub edit_tools: Vec<String>,
}

fn default_command() -> String {
    "pi".into()
}

fn default_args() -> Vec<String> {
    vec!["--mode".into(), "rpc".into()]
}

fn default_edit_tools() -> Vec<String> {
    vec!["edit".into(), "write".into()]
}

fn default_true() -> bool {
    true
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            args: default_args(),
            env: HashMap::new(),
            edit_tools: default_edit_tools(),
        }
    }
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Agent subprocess settings.
    #[serde(default)]
    pub agent: AgentConfig,
    /// JSON file mapping session ids to agent state files; in-memory when unset.
    #[serde(default)]
    pub session_store: Option<PathBuf>,
    /// Emit a notice when a prompt is queued behind an active turn.
    #[serde(default = "default_true")]
    pub queue_notice: bool,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            agent: AgentConfig::default(),
            session_store: None,
            queue_notice: true,
        }
    }
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and normalize paths.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Whether `tool_name` is snapshotted around execution for diff synthesis.
    #[must_use]
    pub fn is_edit_tool(&self, tool_name: &str) -> bool {
        self.agent.edit_tools.iter().any(|name| name == tool_name)
    }

    fn validate(&mut self) -> Result<()> {
        if self.agent.command.trim().is_empty() {
            return Err(AppError::Config("agent.command must not be empty".into()));
        }

        if let Some(path) = self.session_store.take() {
            self.session_store = Some(expand_home(&path));
        }

        Ok(())
    }
}

/// Expand a leading `~/` against `HOME` (or `USERPROFILE` on Windows).
fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map_or_else(|| path.to_path_buf(), |home| PathBuf::from(home).join(rest))
}
