//! Event translation from the agent protocol to session updates.
//!
//! - `tool_calls`: monotonic tool-call status map.
//! - `tool_info`: titles, kinds and locations derived from tool arguments.
//! - `events`: the per-session [`EventTranslator`].
//! - `history`: replay of a stored conversation.
//! - `emitter`: the ordered emission chain and the [`UpdateSink`] seam.

pub mod emitter;
pub mod events;
pub mod history;
pub mod tool_calls;
pub mod tool_info;

pub use emitter::{Emitter, UpdateSink};
pub use events::EventTranslator;
pub use tool_calls::{ToolCallTracker, Transition};
