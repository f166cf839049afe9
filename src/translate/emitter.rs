//! Emission chain: one ordered delivery queue per session.
//!
//! Updates are pushed onto a bounded queue drained by a single consumer task,
//! which awaits each [`UpdateSink::deliver`] before taking the next entry.
//! Delivery order therefore always equals generation order, however long an
//! individual delivery takes.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::models::update::{SessionNotification, SessionUpdate};
use crate::Result;

/// Outstanding emissions per session before producers wait.
const QUEUE_CAPACITY: usize = 256;

/// Destination of session update notifications (the client transport).
///
/// Delivery resolves once the transport has accepted the notification.
pub trait UpdateSink: Send + Sync {
    /// Deliver one notification.
    ///
    /// # Errors
    ///
    /// Returns an error when the transport rejected the notification; the
    /// emission chain logs it and moves on.
    fn deliver(
        &self,
        notification: SessionNotification,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

enum Emission {
    Update(SessionUpdate),
    Flush(oneshot::Sender<()>),
}

/// Producer handle of a session's emission chain. Cheap to clone; all
/// clones feed the same queue.
#[derive(Clone)]
pub struct Emitter {
    session_id: Arc<str>,
    queue_tx: mpsc::Sender<Emission>,
}

impl std::fmt::Debug for Emitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Emitter")
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

impl Emitter {
    /// Start the consumer task for `session_id` delivering into `sink`.
    ///
    /// The task ends once every [`Emitter`] clone has been dropped and the
    /// queue is drained.
    pub fn start(session_id: impl Into<String>, sink: Arc<dyn UpdateSink>) -> (Self, JoinHandle<()>) {
        let session_id: Arc<str> = Arc::from(session_id.into());
        let (queue_tx, queue_rx) = mpsc::channel(QUEUE_CAPACITY);
        let task = Self::spawn_worker(Arc::clone(&session_id), sink, queue_rx);
        (
            Self {
                session_id,
                queue_tx,
            },
            task,
        )
    }

    /// Session the emitted updates belong to.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Append `update` to the chain.
    pub async fn emit(&self, update: SessionUpdate) {
        if self.queue_tx.send(Emission::Update(update)).await.is_err() {
            debug!(session_id = %self.session_id, "emitter closed, update dropped");
        }
    }

    /// Append every update in order.
    pub async fn emit_all(&self, updates: impl IntoIterator<Item = SessionUpdate>) {
        for update in updates {
            self.emit(update).await;
        }
    }

    /// Wait until every update emitted before this call has been delivered.
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.queue_tx.send(Emission::Flush(ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
    }

    fn spawn_worker(
        session_id: Arc<str>,
        sink: Arc<dyn UpdateSink>,
        mut queue_rx: mpsc::Receiver<Emission>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(emission) = queue_rx.recv().await {
                match emission {
                    Emission::Update(update) => {
                        let notification = SessionNotification {
                            session_id: session_id.to_string(),
                            update,
                        };
                        if let Err(err) = sink.deliver(notification).await {
                            warn!(session_id = %session_id, %err, "update delivery failed");
                        }
                    }
                    Emission::Flush(ack) => {
                        let _ = ack.send(());
                    }
                }
            }
            debug!(session_id = %session_id, "emitter task exiting");
        })
    }
}
