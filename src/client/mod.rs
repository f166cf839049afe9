//! Client-facing JSON-RPC 2.0 endpoint over stdio.
//!
//! Each request line is handled on its own task so a long `session/prompt`
//! never blocks the `session/cancel` that follows it. Responses and
//! `session/update` notifications share one outbound queue drained by a
//! single writer task.
//!
//! | Method                        | Result                                |
//! |-------------------------------|---------------------------------------|
//! | `initialize`                  | protocol version and capabilities     |
//! | `authenticate`                | `{}`                                  |
//! | `session/new`                 | `{sessionId, models}`                 |
//! | `session/load`                | `{}` after the history replay         |
//! | `session/list`                | `{sessions}`, most recent first       |
//! | `session/prompt`              | `{stopReason}`                        |
//! | `session/cancel`              | notification, no result               |
//! | `session/set_model`           | `{}`                                  |
//! | `session/set_thinking_level`  | `{}`                                  |

pub mod handler;
pub mod server;
pub mod sink;

pub use handler::RpcError;
pub use server::serve;
pub use sink::ClientSink;
