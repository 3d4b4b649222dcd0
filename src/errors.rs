//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// The worker process could not be started.
    Spawn(String),
    /// Writing to or reading from the worker's stdio failed.
    Transport(String),
    /// A message on the reply stream could not be decoded.
    Decode {
        /// Why the message was rejected.
        reason: String,
        /// The offending bytes, lossily converted to UTF-8.
        raw: String,
    },
    /// A reply was well-formed JSON but violated the expected shape.
    Protocol(String),
    /// No reply arrived within the call's deadline.
    Timeout(String),
    /// The worker exited before the call was delivered to it.
    WorkerExited(String),
    /// The worker exited after receiving the call; its effect is unknown.
    Indeterminate(String),
    /// Caller-supplied arguments failed an operation contract.
    Validation(String),
    /// The worker reported a failure for the requested operation.
    Worker(String),
    /// Requested entity (operation, pending call) does not exist.
    NotFound(String),
    /// No credential was available for an operation that requires one.
    Unauthorized(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl AppError {
    /// Whether this error ends the connection it was raised on.
    ///
    /// Terminal errors are raised for every pending call when the worker
    /// goes away; the next call spawns a fresh worker.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::WorkerExited(_) | Self::Indeterminate(_))
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Spawn(msg) => write!(f, "spawn: {msg}"),
            Self::Transport(msg) => write!(f, "transport: {msg}"),
            Self::Decode { reason, raw } => write!(f, "decode: {reason} (raw: {raw})"),
            Self::Protocol(msg) => write!(f, "protocol: {msg}"),
            Self::Timeout(msg) => write!(f, "timeout: {msg}"),
            Self::WorkerExited(msg) => write!(f, "worker exited: {msg}"),
            Self::Indeterminate(msg) => write!(f, "indeterminate: {msg}"),
            Self::Validation(msg) => write!(f, "validation: {msg}"),
            Self::Worker(msg) => write!(f, "worker: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Unauthorized(msg) => write!(f, "unauthorized: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(format!("json: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
