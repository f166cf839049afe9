//! Agent subprocess protocol.
//!
//! The agent runs as a child process speaking newline-delimited JSON over
//! its stdio. Each bridge session owns one [`RpcChannel`](channel::RpcChannel).
//!
//! - `codec`: line framing with a 1 MiB limit.
//! - `protocol`: typed commands, responses and events.
//! - `spawner`: process launch and spawn-error classification.
//! - `reader`: strict-order routing of stdout lines.
//! - `writer`: single-line JSON writes.
//! - `channel`: correlated `send`, `subscribe`, handshake.

pub mod channel;
pub mod codec;
pub mod protocol;
pub mod reader;
pub mod spawner;
pub mod writer;

pub use channel::{RpcChannel, Subscription};
pub use protocol::{RpcCommand, RpcEvent};
