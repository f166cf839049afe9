//! Stdio loop of the client endpoint.

use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::handler::{codes, handle, RpcError};
use crate::client::sink::ClientSink;
use crate::orchestrator::SessionManager;
use crate::rpc::codec::NdjsonCodec;
use crate::rpc::writer::run_writer;
use crate::{AppError, Result};

/// Serve client requests read from `reader` until EOF or `ct` fires.
///
/// `outbound_rx` is the receiver paired with `sink`; everything queued on
/// the sink (responses and session updates) is written to `writer` in order.
/// Live sessions are closed before this returns.
///
/// # Errors
///
/// Returns `AppError::Write` if the client's output stream fails.
pub async fn serve<R, W>(
    manager: Arc<SessionManager>,
    sink: ClientSink,
    reader: R,
    writer: W,
    outbound_rx: mpsc::Receiver<Value>,
    ct: CancellationToken,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let writer_ct = ct.child_token();
    let writer_task = tokio::spawn(run_writer(
        "client".into(),
        writer,
        outbound_rx,
        writer_ct.clone(),
    ));

    let mut framed = FramedRead::new(reader, NdjsonCodec::new());
    let mut recovering = false;
    let mut requests = tokio::task::JoinSet::new();

    info!("client endpoint ready");
    loop {
        tokio::select! {
            () = ct.cancelled() => {
                info!("client endpoint cancelled");
                break;
            }
            frame = framed.next() => match frame {
                None if recovering => recovering = false,
                None => {
                    info!("client input closed");
                    break;
                }
                Some(Ok(line)) => {
                    recovering = false;
                    if let Some(request) = dispatch_line(&manager, &sink, &line).await {
                        requests.spawn(request);
                    }
                }
                Some(Err(AppError::Protocol(msg))) => {
                    warn!(error = msg.as_str(), "client line rejected");
                    recovering = true;
                    send_error(&sink, Value::Null, &RpcError::new(codes::PARSE_ERROR, msg)).await;
                }
                Some(Err(err)) => {
                    warn!(%err, "client input failed");
                    break;
                }
            },
            Some(joined) = requests.join_next(), if !requests.is_empty() => {
                if let Err(err) = joined {
                    warn!(%err, "request task failed");
                }
            }
        }
    }

    manager.close_all().await;
    requests.abort_all();
    drop(sink);
    writer_ct.cancel();

    match writer_task.await {
        Ok(result) => result,
        Err(err) => Err(AppError::Io(format!("client writer task failed: {err}"))),
    }
}

/// Parse one request line; returns the task that answers it.
async fn dispatch_line(
    manager: &Arc<SessionManager>,
    sink: &ClientSink,
    line: &str,
) -> Option<impl std::future::Future<Output = ()> + Send + 'static> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    let message: Value = match serde_json::from_str(trimmed) {
        Ok(value) => value,
        Err(err) => {
            let error = RpcError::new(codes::PARSE_ERROR, format!("parse error: {err}"));
            send_error(sink, Value::Null, &error).await;
            return None;
        }
    };

    let id = message.get("id").cloned();
    let Some(method) = message.get("method").and_then(Value::as_str).map(str::to_owned) else {
        match id {
            // A response to a request we never make.
            Some(_) if message.get("result").is_some() || message.get("error").is_some() => {
                debug!("unexpected client response ignored");
            }
            Some(id) => {
                let error = RpcError::new(codes::INVALID_REQUEST, "missing method");
                send_error(sink, id, &error).await;
            }
            None => debug!("client message without method or id ignored"),
        }
        return None;
    };
    let params = message.get("params").cloned().unwrap_or(Value::Null);

    let manager = Arc::clone(manager);
    let sink = sink.clone();
    Some(async move {
        debug!(method = method.as_str(), "client request");
        let outcome = handle(&manager, &method, params).await;
        let Some(id) = id else {
            if let Err(err) = outcome {
                debug!(method = method.as_str(), error = err.message, "notification failed");
            }
            return;
        };
        let response = match outcome {
            Ok(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}),
            Err(error) => json!({"jsonrpc": "2.0", "id": id, "error": error.to_value()}),
        };
        if let Err(err) = sink.send(response).await {
            debug!(%err, "response dropped");
        }
    })
}

async fn send_error(sink: &ClientSink, id: Value, error: &RpcError) {
    let response = json!({"jsonrpc": "2.0", "id": id, "error": error.to_value()});
    if let Err(err) = sink.send(response).await {
        debug!(%err, "error response dropped");
    }
}
