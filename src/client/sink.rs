//! Outbound queue shared by responses and notifications.

use std::future::Future;
use std::pin::Pin;

use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::models::update::SessionNotification;
use crate::translate::UpdateSink;
use crate::{AppError, Result};

const OUTBOUND_CAPACITY: usize = 256;

/// Producer side of the client's stdout.
#[derive(Debug, Clone)]
pub struct ClientSink {
    outbound_tx: mpsc::Sender<Value>,
}

impl ClientSink {
    /// Create the sink and the receiver the writer task drains.
    #[must_use]
    pub fn new() -> (Self, mpsc::Receiver<Value>) {
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        (Self { outbound_tx }, outbound_rx)
    }

    /// Queue one message for the client.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Write` once the writer task has stopped.
    pub async fn send(&self, message: Value) -> Result<()> {
        self.outbound_tx
            .send(message)
            .await
            .map_err(|_| AppError::Write("client output closed".into()))
    }
}

impl UpdateSink for ClientSink {
    fn deliver(
        &self,
        notification: SessionNotification,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let params = serde_json::to_value(&notification)?;
            self.send(json!({
                "jsonrpc": "2.0",
                "method": "session/update",
                "params": params,
            }))
            .await
        })
    }
}
