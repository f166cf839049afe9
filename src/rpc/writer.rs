//! NDJSON writers.
//!
//! [`write_json_line`] serialises one value as a single line; [`run_writer`]
//! is a task that drains an [`mpsc`] queue of values onto a stream, used for
//! the client-facing stdout.

use serde_json::Value;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{AppError, Result};

/// Serialise `value` to compact JSON, append `\n`, write and flush.
///
/// # Errors
///
/// Returns the underlying I/O error if the write or flush fails.
pub async fn write_json_line<W>(writer: &mut W, value: &Value) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut bytes = serde_json::to_vec(value).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("json serialisation failed: {e}"),
        )
    })?;
    bytes.push(b'\n');
    writer.write_all(&bytes).await?;
    writer.flush().await
}

/// Writer task: receives values from `msg_rx` and writes each as one line.
///
/// Exits cleanly when `cancel` fires or every sender is dropped.
///
/// # Errors
///
/// Returns [`AppError::Write`] if a write fails (the peer went away).
pub async fn run_writer<W>(
    label: String,
    writer: W,
    mut msg_rx: mpsc::Receiver<Value>,
    cancel: CancellationToken,
) -> Result<()>
where
    W: AsyncWrite + Unpin + Send,
{
    let mut writer = writer;

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!(label, "writer: cancellation received, stopping");
                break;
            }

            msg = msg_rx.recv() => {
                let Some(value) = msg else {
                    debug!(label, "writer: message channel closed, stopping");
                    break;
                };
                write_json_line(&mut writer, &value).await.map_err(|e| {
                    warn!(label, error = %e, "writer: write failed");
                    AppError::Write(e.to_string())
                })?;
            }
        }
    }

    Ok(())
}
