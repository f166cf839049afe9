#![forbid(unsafe_code)]

//! `agent-bridge` binary.
//!
//! Speaks the client protocol on stdin/stdout and runs one agent subprocess
//! per session. Logs go to stderr because stdout carries protocol traffic.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use agent_bridge::client::{self, ClientSink};
use agent_bridge::config::GlobalConfig;
use agent_bridge::orchestrator::{ProcessLauncher, SessionManager};
use agent_bridge::persistence::{JsonSessionStore, MemorySessionStore, SessionStore};
use agent_bridge::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "agent-bridge", about = "Client protocol bridge for an RPC-mode coding agent", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the agent executable.
    #[arg(long)]
    agent: Option<String>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("agent-bridge bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = match &args.config {
        Some(path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::default(),
    };
    if let Some(agent) = args.agent {
        if agent.trim().is_empty() {
            return Err(AppError::Config("--agent must not be empty".into()));
        }
        config.agent.command = agent;
    }
    let config = Arc::new(config);
    info!(agent = config.agent.command, "configuration loaded");

    // ── Session store ───────────────────────────────────
    let store: Arc<dyn SessionStore> = match &config.session_store {
        Some(path) => Arc::new(JsonSessionStore::open(path)?),
        None => Arc::new(MemorySessionStore::new()),
    };

    // ── Client endpoint ─────────────────────────────────
    let (sink, outbound_rx) = ClientSink::new();
    let manager = Arc::new(SessionManager::new(
        Arc::clone(&config),
        Arc::new(ProcessLauncher::new(config.agent.clone())),
        store,
        Arc::new(sink.clone()),
    ));

    let ct = CancellationToken::new();
    let signal_ct = ct.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        signal_ct.cancel();
    });

    let result = client::serve(
        manager,
        sink,
        tokio::io::stdin(),
        tokio::io::stdout(),
        outbound_rx,
        ct,
    )
    .await;
    if let Err(err) = &result {
        error!(%err, "client endpoint failed");
    }
    info!("agent-bridge shut down");
    result
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
