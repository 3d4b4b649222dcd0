//! One live connection to a worker: reader and writer tasks, the pending
//! call table, and the backing process.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::events::{CallEvent, EventEmitter, EventType};
use crate::rpc::correlation::CorrelationTable;
use crate::rpc::reader::run_reader;
use crate::rpc::writer::{run_writer, Outbound};
use crate::worker::codec::WireCodec;
use crate::worker::protocol::{CallEnvelope, NotificationEnvelope};
use crate::worker::{WorkerExit, WorkerIo, WorkerProcess};
use crate::{AppError, Result};

/// Outbound messages buffered before callers wait for the writer.
const OUTBOUND_CAPACITY: usize = 64;

/// Time the reader gets to drain replies the worker wrote before exiting.
const EXIT_DRAIN_GRACE: Duration = Duration::from_millis(50);

/// Cheap, cloneable access to a connection for issuing calls.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: u64,
    table: CorrelationTable,
    outbound: mpsc::Sender<Outbound>,
    closed: CancellationToken,
    worker_gone: Arc<AtomicBool>,
}

impl ConnectionHandle {
    /// Connection number, unique within its client.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether the connection can still carry calls.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        !self.closed.is_cancelled() && !self.worker_gone.load(Ordering::Acquire)
    }

    /// Calls awaiting replies on this connection.
    #[must_use]
    pub fn pending_calls(&self) -> usize {
        self.table.len()
    }

    /// Send a call and wait for its reply.
    ///
    /// # Errors
    ///
    /// Returns the error that settled the call; see
    /// [`crate::rpc::correlation::PendingReply::wait`].
    pub async fn call(
        &self,
        method: &str,
        operation: &str,
        params: Value,
        deadline: Option<Duration>,
    ) -> Result<Value> {
        let pending = self.table.submit(operation);
        let envelope = CallEnvelope::new(pending.id(), method, params);
        debug!(connection = self.id, id = pending.id(), operation, "submitting call");

        if self.outbound.send(Outbound::Call(envelope)).await.is_err() {
            self.table.resolve(
                pending.id(),
                Err(AppError::WorkerExited(format!(
                    "{operation} (call {}) was not delivered: connection closed",
                    pending.id()
                ))),
            );
        }

        pending.wait(deadline).await
    }

    /// Queue a notification for the worker.
    ///
    /// # Errors
    ///
    /// Returns `AppError::WorkerExited` if the connection has closed.
    pub async fn notify(&self, method: &str, params: Value) -> Result<()> {
        self.outbound
            .send(Outbound::Notify(NotificationEnvelope::new(method, params)))
            .await
            .map_err(|_| AppError::WorkerExited(format!("{method} not delivered: connection closed")))
    }
}

/// Owner of a live connection.
#[derive(Debug)]
pub struct Connection {
    handle: ConnectionHandle,
    process: Option<WorkerProcess>,
    tasks: Vec<JoinHandle<()>>,
}

impl Connection {
    /// Start reader and writer tasks over `io`.
    ///
    /// Call identifiers come from `ids`, shared across the client's
    /// connections.
    #[must_use]
    pub fn open(
        id: u64,
        io: WorkerIo,
        ids: Arc<AtomicU64>,
        max_message_bytes: usize,
        events: &EventEmitter,
    ) -> Self {
        let table = CorrelationTable::with_id_source(ids);
        let closed = CancellationToken::new();
        let worker_gone = Arc::new(AtomicBool::new(false));
        let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);

        let WorkerIo {
            reader,
            writer,
            process,
        } = io;

        let tasks = vec![
            tokio::spawn(run_reader(
                id,
                reader,
                WireCodec::with_max_length(max_message_bytes),
                table.clone(),
                closed.clone(),
            )),
            tokio::spawn(run_writer(
                id,
                writer,
                outbound_rx,
                WireCodec::with_max_length(max_message_bytes),
                table.clone(),
                closed.clone(),
            )),
        ];

        if let Some(process) = &process {
            watch_exit(id, process, &table, &closed, &worker_gone, events.clone());
        }

        Self {
            handle: ConnectionHandle {
                id,
                table,
                outbound,
                closed,
                worker_gone,
            },
            process,
            tasks,
        }
    }

    /// Handle for issuing calls.
    #[must_use]
    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    /// Backing process, `None` for in-memory transports.
    #[must_use]
    pub fn process(&self) -> Option<&WorkerProcess> {
        self.process.as_ref()
    }

    /// Close the connection: stop both tasks, terminate the worker, and fail
    /// every call still pending with `reason`.
    pub async fn close(mut self, reason: &str) -> Option<WorkerExit> {
        self.handle.closed.cancel();
        self.handle.worker_gone.store(true, Ordering::Release);

        let exit = match self.process.as_mut() {
            Some(process) => process.kill().await,
            None => None,
        };

        let failed = self.handle.table.resolve_all(reason);
        if failed > 0 {
            warn!(connection = self.handle.id, failed, reason, "failed pending calls on close");
        }

        for task in self.tasks.drain(..) {
            task.abort();
        }

        debug!(connection = self.handle.id, ?exit, "connection closed");
        exit
    }
}

fn watch_exit(
    id: u64,
    process: &WorkerProcess,
    table: &CorrelationTable,
    closed: &CancellationToken,
    worker_gone: &Arc<AtomicBool>,
    events: EventEmitter,
) {
    let table = table.clone();
    let closed = closed.clone();
    let worker_gone = Arc::clone(worker_gone);

    process.on_exit(move |exit: &WorkerExit| {
        worker_gone.store(true, Ordering::Release);
        let summary = if exit.requested {
            format!("stopped on request: {}", exit.reason)
        } else {
            exit.reason.clone()
        };
        events.emit(
            CallEvent::new(EventType::WorkerExited)
                .with_exit_code(exit.exit_code)
                .with_summary(summary),
        );

        let reason = exit.reason.clone();
        tokio::spawn(async move {
            tokio::time::sleep(EXIT_DRAIN_GRACE).await;
            closed.cancel();
            let failed = table.resolve_all(&reason);
            if failed > 0 {
                info!(connection = id, failed, %reason, "failed pending calls after worker exit");
            }
        });
    });
}
