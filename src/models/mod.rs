//! Domain model module declarations.

pub mod prompt;
pub mod update;

pub use prompt::{PromptPayload, StopReason};
pub use update::{SessionNotification, SessionUpdate, ToolCallStatus};
