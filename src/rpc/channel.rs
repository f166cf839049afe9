//! Subprocess channel: correlated commands plus an event fan-out over one
//! agent process.
//!
//! A channel owns the agent's stdin/stdout pair. [`RpcChannel::send`]
//! registers a completion handle under a fresh correlation id, writes the
//! command as one line, and waits for the matching response. Every other
//! line goes to the channel's [`Subscription`]s.
//!
//! When the agent's stdout closes the channel waits for the exit status and
//! rejects every outstanding call with [`AppError::ProcessExited`]. Calls made
//! afterwards fail the same way without touching the pipe.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::rpc::protocol::{AgentState, RpcCommand};
use crate::rpc::reader::read_lines;
use crate::rpc::spawner::{forward_stderr, spawn_agent, ExitInfo, SpawnConfig};
use crate::rpc::writer::write_json_line;
use crate::{AppError, Result};

type Reply = oneshot::Sender<Result<Value>>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct Routing {
    pending: HashMap<String, Reply>,
    subscribers: Vec<(u64, mpsc::UnboundedSender<Value>)>,
    closed: Option<AppError>,
}

/// Routing state shared by the channel handle and its reader task.
#[derive(Default)]
pub(crate) struct Shared {
    routing: Mutex<Routing>,
    next_subscriber: AtomicU64,
}

impl Shared {
    /// Register a completion handle for `id`, unless the channel is closed.
    fn register(&self, id: &str) -> Result<oneshot::Receiver<Result<Value>>> {
        let mut routing = lock(&self.routing);
        if let Some(err) = &routing.closed {
            return Err(err.clone());
        }
        let (tx, rx) = oneshot::channel();
        routing.pending.insert(id.to_owned(), tx);
        Ok(rx)
    }

    pub(crate) fn take_pending(&self, id: &str) -> Option<Reply> {
        lock(&self.routing).pending.remove(id)
    }

    /// Deliver `value` to every live subscriber, pruning dropped ones.
    pub(crate) fn dispatch(&self, value: &Value) {
        lock(&self.routing)
            .subscribers
            .retain(|(_, tx)| tx.send(value.clone()).is_ok());
    }

    fn subscribe(&self) -> (u64, mpsc::UnboundedReceiver<Value>) {
        let id = self.next_subscriber.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        let mut routing = lock(&self.routing);
        // A closed channel hands out an already-finished subscription.
        if routing.closed.is_none() {
            routing.subscribers.push((id, tx));
        }
        (id, rx)
    }

    fn unsubscribe(&self, id: u64) {
        lock(&self.routing).subscribers.retain(|(sub, _)| *sub != id);
    }

    /// Reject every outstanding call with `err` and end all subscriptions.
    fn close(&self, err: AppError) -> usize {
        let (pending, subscribers) = {
            let mut routing = lock(&self.routing);
            if routing.closed.is_some() {
                return 0;
            }
            routing.closed = Some(err.clone());
            (
                std::mem::take(&mut routing.pending),
                std::mem::take(&mut routing.subscribers),
            )
        };
        drop(subscribers);
        let count = pending.len();
        for (_, reply) in pending {
            let _ = reply.send(Err(err.clone()));
        }
        count
    }

    fn closed(&self) -> Option<AppError> {
        lock(&self.routing).closed.clone()
    }
}

/// Ordered stream of every non-response line read from the agent.
///
/// Dropping the subscription unsubscribes it; [`Subscription::unsubscribe`]
/// does the same explicitly and may be called any number of times.
pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<Value>,
    shared: Weak<Shared>,
    active: bool,
}

impl Subscription {
    /// Next line, or `None` once unsubscribed or the agent is gone.
    pub async fn recv(&mut self) -> Option<Value> {
        self.rx.recv().await
    }

    /// Stop receiving lines. Idempotent.
    pub fn unsubscribe(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(shared) = self.shared.upgrade() {
            shared.unsubscribe(self.id);
        }
        self.rx.close();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

struct Inner {
    label: String,
    shared: Arc<Shared>,
    stdin: tokio::sync::Mutex<Option<BoxedWriter>>,
    next_id: AtomicU64,
    shutdown: CancellationToken,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Handle to one agent process. Cheap to clone; the process is killed when
/// the last handle is dropped.
#[derive(Clone)]
pub struct RpcChannel {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for RpcChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcChannel")
            .field("label", &self.inner.label)
            .finish_non_exhaustive()
    }
}

impl RpcChannel {
    /// Spawn the agent described by `config` and connect to it.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Spawn`] when the executable cannot be launched.
    pub fn spawn(label: impl Into<String>, config: &SpawnConfig) -> Result<Self> {
        let label = label.into();
        let process = spawn_agent(config)?;

        if let Some(stderr) = process.stderr {
            tokio::spawn(forward_stderr(label.clone(), stderr));
        }

        let mut child = process.child;
        let exit = async move {
            match child.wait().await {
                Ok(status) => ExitInfo::from(status),
                Err(err) => {
                    warn!(%err, "failed to wait for agent process");
                    ExitInfo::default()
                }
            }
        };

        Ok(Self::from_io(label, process.stdout, process.stdin, exit))
    }

    /// Build a channel over an arbitrary pipe pair.
    ///
    /// `exit` resolves with the process exit status; it is awaited once the
    /// read side reaches EOF. Dropping the last handle drops `exit` too, which
    /// for a real child (with `kill_on_drop`) terminates the process.
    pub fn from_io<R, W, E>(label: impl Into<String>, reader: R, writer: W, exit: E) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
        E: Future<Output = ExitInfo> + Send + 'static,
    {
        let label = label.into();
        let shared = Arc::new(Shared::default());
        let shutdown = CancellationToken::new();

        tokio::spawn(run_io(
            label.clone(),
            reader,
            exit,
            Arc::clone(&shared),
            shutdown.clone(),
        ));

        Self {
            inner: Arc::new(Inner {
                label,
                shared,
                stdin: tokio::sync::Mutex::new(Some(Box::new(writer))),
                next_id: AtomicU64::new(1),
                shutdown,
            }),
        }
    }

    /// Label used in logs (the bridge session id).
    #[must_use]
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// The error every call fails with once the agent is gone.
    #[must_use]
    pub fn closed(&self) -> Option<AppError> {
        self.inner.shared.closed()
    }

    /// Send `command` and wait for its response payload.
    ///
    /// # Errors
    ///
    /// - [`AppError::Write`] if the line could not be written.
    /// - [`AppError::ProcessExited`] if the agent exits before answering.
    /// - [`AppError::Command`] / [`AppError::AuthRequired`] for `success: false`.
    pub async fn send(&self, command: &RpcCommand) -> Result<Value> {
        let id = format!("req-{}", self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let mut line = serde_json::to_value(command)?;
        if let Value::Object(map) = &mut line {
            map.insert("id".into(), Value::String(id.clone()));
        }

        let rx = self.inner.shared.register(&id)?;

        if let Err(err) = self.write(&line).await {
            self.inner.shared.take_pending(&id);
            return Err(err);
        }
        debug!(label = self.inner.label, id, command = command.name(), "rpc: command sent");

        rx.await.unwrap_or(Err(AppError::Cancelled))
    }

    /// Subscribe to every non-response line, in arrival order.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        let (id, rx) = self.inner.shared.subscribe();
        Subscription {
            id,
            rx,
            shared: Arc::downgrade(&self.inner.shared),
            active: true,
        }
    }

    /// Post-spawn handshake: confirm liveness via `get_state` and make sure
    /// the directory of the agent's session file exists.
    ///
    /// # Errors
    ///
    /// Propagates the `get_state` failure; a directory that cannot be created
    /// is only logged.
    pub async fn handshake(&self) -> Result<AgentState> {
        let data = self.send(&RpcCommand::GetState).await?;
        let state: AgentState = serde_json::from_value(data).unwrap_or_default();

        if let Some(parent) = state.session_file.as_deref().and_then(std::path::Path::parent) {
            if let Err(err) = tokio::fs::create_dir_all(parent).await {
                warn!(
                    label = self.inner.label,
                    dir = %parent.display(),
                    %err,
                    "could not create session file directory"
                );
            }
        }

        info!(
            label = self.inner.label,
            session_file = ?state.session_file,
            model = ?state.model.as_ref().map(|m| m.id.as_str()),
            "agent handshake complete"
        );
        Ok(state)
    }

    /// Close the agent's stdin, asking it to exit.
    pub async fn shutdown(&self) {
        self.inner.stdin.lock().await.take();
    }

    async fn write(&self, line: &Value) -> Result<()> {
        let mut stdin = self.inner.stdin.lock().await;
        let Some(writer) = stdin.as_mut() else {
            return Err(AppError::Write("agent stdin is closed".into()));
        };
        write_json_line(writer, line)
            .await
            .map_err(|e| AppError::Write(e.to_string()))
    }
}

/// Drive the read side, then reject outstanding calls once the process ends.
async fn run_io<R, E>(
    label: String,
    reader: R,
    exit: E,
    shared: Arc<Shared>,
    shutdown: CancellationToken,
) where
    R: AsyncRead + Unpin,
    E: Future<Output = ExitInfo>,
{
    tokio::select! {
        biased;
        () = shutdown.cancelled() => {
            shared.close(AppError::Cancelled);
            return;
        }
        () = read_lines(&label, reader, &shared) => {}
    }

    let info = tokio::select! {
        biased;
        () = shutdown.cancelled() => {
            shared.close(AppError::Cancelled);
            return;
        }
        info = exit => info,
    };

    let rejected = shared.close(info.into_error());
    info!(
        label,
        code = ?info.code,
        signal = ?info.signal,
        rejected,
        "agent process exited"
    );
}
