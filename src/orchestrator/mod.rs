//! Session orchestration.
//!
//! - `turn_controller`: per-session actor serialising prompts.
//! - `session_manager`: session registry, creation and resume.

pub mod session_manager;
pub mod turn_controller;

pub use session_manager::{AgentLauncher, LiveSession, ProcessLauncher, SessionInfo, SessionManager};
pub use turn_controller::{TurnController, TurnOptions, TurnSnapshot};
