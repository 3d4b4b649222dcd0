//! Tool-server worker: wire protocol, stdio codec, and process supervision.

pub mod codec;
pub mod protocol;
pub mod supervisor;

use std::future::Future;
use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::Result;

pub use supervisor::{ProcessLauncher, SpawnConfig, WorkerExit, WorkerProcess};

/// Byte streams of one worker connection.
pub struct WorkerIo {
    /// Worker output (replies and notifications).
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
    /// Worker input (calls and notifications).
    pub writer: Box<dyn AsyncWrite + Send + Unpin>,
    /// Backing process, `None` for in-memory transports.
    pub process: Option<WorkerProcess>,
}

impl std::fmt::Debug for WorkerIo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerIo")
            .field("process", &self.process)
            .finish_non_exhaustive()
    }
}

/// Source of worker connections.
///
/// The RPC client calls [`WorkerLauncher::launch`] once per connection:
/// lazily on the first call, and again after the previous worker died or
/// the client was shut down.
pub trait WorkerLauncher: Send + Sync {
    /// Start a worker and return its byte streams.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Spawn` if the worker cannot be started.
    fn launch(&self) -> Pin<Box<dyn Future<Output = Result<WorkerIo>> + Send + '_>>;
}
