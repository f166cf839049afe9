#![forbid(unsafe_code)]

//! Bridge between a line-delimited JSON-RPC client protocol and a coding
//! agent running as an RPC-mode subprocess.

pub mod auth;
pub mod client;
pub mod config;
pub mod diff;
pub mod errors;
pub mod models;
pub mod orchestrator;
pub mod persistence;
pub mod rpc;
pub mod translate;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
