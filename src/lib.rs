//! Stdio client and dispatch layer letting an AI agent call a Moodle tool-server worker.

#![forbid(unsafe_code)]

pub mod config;
pub mod dispatch;
pub mod errors;
pub mod events;
pub mod rpc;
pub mod worker;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
