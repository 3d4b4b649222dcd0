//! Lazily connected RPC client for the tool-server worker.
//!
//! The client owns at most one live connection. The first call launches
//! the worker and runs the handshake; later calls reuse the connection
//! concurrently. When the worker dies, every pending call fails and the
//! next call launches a replacement. [`RpcClient::shutdown`] closes the
//! connection; a call after shutdown connects again.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::GlobalConfig;
use crate::events::{CallEvent, EventEmitter, EventSink, EventType};
use crate::rpc::connection::{Connection, ConnectionHandle};
use crate::rpc::handshake::perform_handshake;
use crate::worker::codec::MAX_MESSAGE_BYTES;
use crate::worker::protocol::{methods, strip_nulls, tool_call_params, ToolCallResult};
use crate::worker::{ProcessLauncher, SpawnConfig, WorkerExit, WorkerLauncher};
use crate::{AppError, Result};

/// Tunables for [`RpcClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// Default reply deadline; `None` waits indefinitely.
    pub request_timeout: Option<Duration>,
    /// Run the `initialize` handshake on each new connection.
    pub handshake: bool,
    /// Deadline for the handshake reply.
    pub startup_timeout: Duration,
    /// Largest inbound message accepted.
    pub max_message_bytes: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Some(Duration::from_secs(120)),
            handshake: true,
            startup_timeout: Duration::from_secs(30),
            max_message_bytes: MAX_MESSAGE_BYTES,
        }
    }
}

impl ClientOptions {
    /// Options derived from the `[rpc]` and `[worker]` config sections.
    #[must_use]
    pub fn from_config(config: &GlobalConfig) -> Self {
        Self {
            request_timeout: config.request_timeout(),
            handshake: config.rpc.handshake,
            startup_timeout: Duration::from_secs(config.worker.startup_timeout_seconds),
            max_message_bytes: config.rpc.max_message_bytes,
        }
    }
}

/// Client issuing named operations to the worker.
pub struct RpcClient {
    instance_id: Uuid,
    launcher: Arc<dyn WorkerLauncher>,
    options: ClientOptions,
    ids: Arc<AtomicU64>,
    launches: AtomicU64,
    connection: Mutex<Option<Connection>>,
    events: EventEmitter,
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("instance_id", &self.instance_id)
            .field("options", &self.options)
            .field("launches", &self.launches.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl RpcClient {
    /// Client launching workers through `launcher`. Nothing is started
    /// until the first call.
    #[must_use]
    pub fn new(launcher: Arc<dyn WorkerLauncher>, options: ClientOptions) -> Self {
        let instance_id = Uuid::new_v4();
        Self {
            instance_id,
            launcher,
            options,
            ids: Arc::new(AtomicU64::new(1)),
            launches: AtomicU64::new(0),
            connection: Mutex::new(None),
            events: EventEmitter::new(instance_id, None),
        }
    }

    /// Client spawning the worker process described by `config`.
    #[must_use]
    pub fn from_config(config: &GlobalConfig) -> Self {
        let launcher = ProcessLauncher::new(SpawnConfig::from_worker_config(&config.worker));
        Self::new(Arc::new(launcher), ClientOptions::from_config(config))
    }

    /// Record lifecycle and call events to `sink`.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = EventEmitter::new(self.instance_id, Some(sink));
        self
    }

    /// Identifier of this client instance (appears in logs and events).
    #[must_use]
    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    /// Options in effect.
    #[must_use]
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Number of workers launched so far.
    #[must_use]
    pub fn launch_count(&self) -> u64 {
        self.launches.load(Ordering::Relaxed)
    }

    /// Whether a live connection is currently held.
    pub async fn is_connected(&self) -> bool {
        self.connection
            .lock()
            .await
            .as_ref()
            .is_some_and(|conn| conn.handle().is_alive())
    }

    /// Exit record of the current worker, once it has exited.
    pub async fn worker_exit(&self) -> Option<WorkerExit> {
        self.connection
            .lock()
            .await
            .as_ref()
            .and_then(Connection::process)
            .and_then(crate::worker::WorkerProcess::exit_status)
    }

    /// Return the live connection, launching a worker if there is none.
    ///
    /// Concurrent callers share one launch: the connection slot stays locked
    /// until the new worker has finished its handshake.
    ///
    /// # Errors
    ///
    /// - `AppError::Spawn` if the worker cannot be started.
    /// - Any handshake failure; the half-started worker is torn down and
    ///   nothing is kept, so the next call retries from scratch.
    pub async fn ensure_connected(&self) -> Result<ConnectionHandle> {
        let mut slot = self.connection.lock().await;

        if let Some(conn) = slot.as_ref() {
            if conn.handle().is_alive() {
                return Ok(conn.handle().clone());
            }
        }

        if let Some(stale) = slot.take() {
            debug!(client = %self.instance_id, connection = stale.handle().id(), "discarding dead connection");
            stale.close("connection was replaced").await;
        }

        let io = self.launcher.launch().await?;
        let number = self.launches.fetch_add(1, Ordering::Relaxed) + 1;
        let conn = Connection::open(
            number,
            io,
            Arc::clone(&self.ids),
            self.options.max_message_bytes,
            &self.events,
        );
        info!(
            client = %self.instance_id,
            connection = number,
            pid = conn.process().and_then(crate::worker::WorkerProcess::pid),
            "worker connected"
        );
        self.events.emit(CallEvent::new(EventType::WorkerSpawned).with_connection(number));

        if self.options.handshake {
            if let Err(err) = perform_handshake(conn.handle(), self.options.startup_timeout).await {
                warn!(client = %self.instance_id, connection = number, %err, "worker handshake failed");
                conn.close("worker handshake failed").await;
                return Err(err);
            }
        }

        let handle = conn.handle().clone();
        *slot = Some(conn);
        Ok(handle)
    }

    /// Invoke `operation` with `payload`, using the default deadline.
    ///
    /// Returns the text of the worker's single text content item.
    ///
    /// # Errors
    ///
    /// See [`RpcClient::invoke_with_timeout`].
    pub async fn invoke(&self, operation: &str, payload: Value) -> Result<String> {
        self.invoke_with_timeout(operation, payload, self.options.request_timeout)
            .await
    }

    /// Invoke `operation` with `payload` and an explicit reply deadline.
    ///
    /// `null` members of an object payload are dropped before sending.
    ///
    /// # Errors
    ///
    /// - `AppError::Spawn` or a handshake error if no connection could be made.
    /// - `AppError::Worker` if the worker reported a failure.
    /// - `AppError::Protocol` / `AppError::Decode` for malformed replies.
    /// - `AppError::Timeout` if `deadline` elapsed first.
    /// - `AppError::WorkerExited` / `AppError::Indeterminate` if the worker
    ///   went away before replying.
    pub async fn invoke_with_timeout(
        &self,
        operation: &str,
        payload: Value,
        deadline: Option<Duration>,
    ) -> Result<String> {
        let span = info_span!("invoke", client = %self.instance_id, operation);

        async move {
            let started = Instant::now();
            self.events.emit(CallEvent::new(EventType::CallStarted).with_operation(operation));

            let outcome = self.call_tool(operation, payload, deadline).await;

            let elapsed = started.elapsed();
            match &outcome {
                Ok(text) => {
                    debug!(elapsed_ms = elapsed.as_millis(), bytes = text.len(), "call completed");
                    self.events.emit(
                        CallEvent::new(EventType::CallCompleted)
                            .with_operation(operation)
                            .with_duration(elapsed),
                    );
                }
                Err(err) => {
                    warn!(elapsed_ms = elapsed.as_millis(), %err, "call failed");
                    self.events.emit(
                        CallEvent::new(EventType::CallFailed)
                            .with_operation(operation)
                            .with_duration(elapsed)
                            .with_summary(err.to_string()),
                    );
                }
            }

            outcome
        }
        .instrument(span)
        .await
    }

    /// Close the current connection, if any.
    ///
    /// Pending calls fail; the worker is terminated (SIGTERM, then SIGKILL
    /// after the grace period). The client stays usable.
    pub async fn shutdown(&self) {
        let conn = self.connection.lock().await.take();
        if let Some(conn) = conn {
            let number = conn.handle().id();
            let exit = conn.close("client shut down").await;
            info!(client = %self.instance_id, connection = number, ?exit, "client shut down");
        }
    }

    async fn call_tool(&self, operation: &str, payload: Value, deadline: Option<Duration>) -> Result<String> {
        let handle = self.ensure_connected().await?;
        let params = tool_call_params(operation, strip_nulls(payload));
        let value = handle
            .call(methods::TOOLS_CALL, operation, params, deadline)
            .await?;
        let result: ToolCallResult = serde_json::from_value(value).map_err(|err| {
            AppError::Protocol(format!("{operation} returned an invalid tool result: {err}"))
        })?;
        result.into_text(operation)
    }
}
