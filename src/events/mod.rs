//! Structured call-event recording.
//!
//! Provides the [`EventSink`] trait and the [`CallEvent`] record. The primary
//! sink, [`JsonlEventWriter`], appends JSONL records to daily-rotating files.
//! Events complement `tracing` output with a durable, machine-readable trail
//! of worker lifecycles and tool calls.

pub mod writer;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

/// Event type classification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A worker process (or in-memory transport) was connected.
    WorkerSpawned,
    /// The worker went away.
    WorkerExited,
    /// A tool call was submitted.
    CallStarted,
    /// A tool call returned its text result.
    CallCompleted,
    /// A tool call failed.
    CallFailed,
}

/// One recorded event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallEvent {
    /// When the event was recorded.
    pub timestamp: DateTime<Utc>,
    /// RPC client instance that produced the event.
    pub client_id: Option<Uuid>,
    /// Event classification.
    pub event_type: EventType,
    /// Operation name (call events).
    pub operation: Option<String>,
    /// Connection number within the client.
    pub connection: Option<u64>,
    /// Wall-clock duration of the call in milliseconds.
    pub duration_ms: Option<u64>,
    /// Worker exit code (`worker_exited`).
    pub exit_code: Option<i32>,
    /// Brief description of the outcome.
    pub summary: Option<String>,
}

impl CallEvent {
    /// Minimal event of the given type, stamped now.
    #[must_use]
    pub fn new(event_type: EventType) -> Self {
        Self {
            timestamp: Utc::now(),
            client_id: None,
            event_type,
            operation: None,
            connection: None,
            duration_ms: None,
            exit_code: None,
            summary: None,
        }
    }

    /// Set the operation name.
    #[must_use]
    pub fn with_operation(mut self, operation: &str) -> Self {
        self.operation = Some(operation.to_owned());
        self
    }

    /// Set the connection number.
    #[must_use]
    pub fn with_connection(mut self, connection: u64) -> Self {
        self.connection = Some(connection);
        self
    }

    /// Set the call duration.
    #[must_use]
    pub fn with_duration(mut self, duration: std::time::Duration) -> Self {
        self.duration_ms = Some(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Set the worker exit code.
    #[must_use]
    pub fn with_exit_code(mut self, exit_code: Option<i32>) -> Self {
        self.exit_code = exit_code;
        self
    }

    /// Set the outcome summary.
    #[must_use]
    pub fn with_summary(mut self, summary: String) -> Self {
        self.summary = Some(summary);
        self
    }
}

/// Writes call events to a persistent store.
///
/// Implementations must be [`Send`] and [`Sync`] to allow sharing across
/// async task boundaries via [`Arc`].
pub trait EventSink: Send + Sync {
    /// Record a single event.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying write operation fails.
    fn record(&self, event: CallEvent) -> crate::Result<()>;
}

/// Stamps events with a client id and forwards them to an optional sink.
///
/// Recording failures are logged and never reach the caller.
#[derive(Clone, Default)]
pub struct EventEmitter {
    client_id: Option<Uuid>,
    sink: Option<Arc<dyn EventSink>>,
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("client_id", &self.client_id)
            .field("enabled", &self.sink.is_some())
            .finish()
    }
}

impl EventEmitter {
    /// Emitter for `client_id` writing to `sink`.
    #[must_use]
    pub fn new(client_id: Uuid, sink: Option<Arc<dyn EventSink>>) -> Self {
        Self {
            client_id: Some(client_id),
            sink,
        }
    }

    /// Whether events go anywhere.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    /// Record `event`, stamped with this emitter's client id.
    pub fn emit(&self, mut event: CallEvent) {
        let Some(sink) = &self.sink else {
            return;
        };
        event.client_id = self.client_id;
        if let Err(err) = sink.record(event) {
            warn!(%err, "failed to record call event");
        }
    }
}

pub use writer::JsonlEventWriter;
