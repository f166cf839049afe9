//! Agent stdout reader.
//!
//! Reads newline-delimited JSON from the agent in strict arrival order and
//! routes each line exactly once:
//!
//! | Line                                   | Routed to                          |
//! |----------------------------------------|------------------------------------|
//! | `type: "response"` with a pending `id` | the waiting [`send`] call          |
//! | any other JSON object                  | every live subscriber, in order    |
//! | invalid JSON / over-long line          | dropped; logged at `DEBUG`         |
//!
//! [`send`]: crate::rpc::channel::RpcChannel::send

use futures_util::StreamExt;
use serde_json::Value;
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;
use tracing::{debug, warn};

use crate::auth;
use crate::rpc::channel::Shared;
use crate::rpc::codec::NdjsonCodec;
use crate::rpc::protocol::{RpcResponse, RESPONSE_TYPE};
use crate::AppError;

/// What the reader did with one inbound line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineDisposition {
    /// Resolved an outstanding call.
    Resolved,
    /// Delivered to subscribers.
    Dispatched,
    /// Not JSON (or blank); dropped.
    Dropped,
}

/// Read lines from `stdout` until EOF or an I/O error, routing each one.
///
/// Malformed lines never end the loop; only the end of the stream does.
pub(crate) async fn read_lines<R>(label: &str, stdout: R, shared: &Shared)
where
    R: AsyncRead + Unpin,
{
    let mut framed = FramedRead::new(stdout, NdjsonCodec::new());
    // A decode error makes `FramedRead` yield one `None` before it resumes.
    let mut recovering = false;

    loop {
        match framed.next().await {
            None if recovering => recovering = false,
            None => break,
            Some(Ok(line)) => {
                recovering = false;
                route_line(label, &line, shared);
            }
            Some(Err(AppError::Protocol(msg))) => {
                debug!(label, error = msg.as_str(), "rpc reader: framing error, skipping");
                recovering = true;
            }
            Some(Err(e)) => {
                warn!(label, error = %e, "rpc reader: stream error, stopping");
                break;
            }
        }
    }

    debug!(label, "rpc reader: stdout closed");
}

/// Route a single raw line.
pub(crate) fn route_line(label: &str, line: &str, shared: &Shared) -> LineDisposition {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return LineDisposition::Dropped;
    }

    let value: Value = match serde_json::from_str(trimmed) {
        Ok(value) => value,
        Err(e) => {
            debug!(label, error = %e, "rpc reader: malformed line dropped");
            return LineDisposition::Dropped;
        }
    };

    if value.get("type").and_then(Value::as_str) == Some(RESPONSE_TYPE) {
        if let Some(id) = value.get("id").and_then(Value::as_str) {
            if let Some(reply) = shared.take_pending(id) {
                let _ = reply.send(response_result(&value));
                return LineDisposition::Resolved;
            }
            debug!(label, id, "rpc reader: response for unknown id");
        }
    }

    shared.dispatch(&value);
    LineDisposition::Dispatched
}

/// Turn a response line into the outcome of its call.
fn response_result(value: &Value) -> crate::Result<Value> {
    let response: RpcResponse = serde_json::from_value(value.clone())?;
    if response.success {
        return Ok(response.data.unwrap_or(Value::Null));
    }

    let err = AppError::Command {
        command: response.command.unwrap_or_default(),
        message: response
            .error
            .unwrap_or_else(|| "command failed without an error message".into()),
    };
    Err(auth::classify(err))
}
