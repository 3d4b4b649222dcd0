//! Pending-call table matching replies to calls by identifier.
//!
//! Each submitted call gets a fresh identifier from a monotonic counter and
//! a one-shot reply slot. A slot is settled exactly once: by its reply, by
//! its deadline, or by the connection going away. Whichever comes first
//! removes the entry, so later settlements for the same id are no-ops.
//! Dropping the caller's [`PendingReply`] unsettled removes the entry too.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

use crate::worker::protocol::CallId;
use crate::{AppError, Result};

/// A call awaiting its reply.
#[derive(Debug)]
struct PendingCall {
    operation: String,
    submitted_at: Instant,
    sent: bool,
    slot: oneshot::Sender<Result<Value>>,
}

/// Table of calls awaiting replies on one connection.
///
/// Cloning shares the table.
#[derive(Debug, Clone)]
pub struct CorrelationTable {
    pending: Arc<Mutex<HashMap<CallId, PendingCall>>>,
    ids: Arc<AtomicU64>,
}

impl Default for CorrelationTable {
    fn default() -> Self {
        Self::new()
    }
}

impl CorrelationTable {
    /// Empty table with its own identifier counter starting at 1.
    #[must_use]
    pub fn new() -> Self {
        Self::with_id_source(Arc::new(AtomicU64::new(1)))
    }

    /// Empty table drawing identifiers from a shared counter.
    ///
    /// The client shares one counter across reconnects so identifiers stay
    /// unique for its whole lifetime.
    #[must_use]
    pub fn with_id_source(ids: Arc<AtomicU64>) -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            ids,
        }
    }

    /// Register a new call and return the handle its caller awaits.
    #[must_use]
    pub fn submit(&self, operation: &str) -> PendingReply {
        let id = self.ids.fetch_add(1, Ordering::Relaxed);
        let (slot, rx) = oneshot::channel();
        self.lock().insert(
            id,
            PendingCall {
                operation: operation.to_owned(),
                submitted_at: Instant::now(),
                sent: false,
                slot,
            },
        );
        PendingReply {
            id,
            operation: operation.to_owned(),
            rx,
            table: self.clone(),
        }
    }

    /// Record that the call's bytes were handed to the worker.
    ///
    /// Returns `false` when the call is no longer pending.
    pub fn mark_sent(&self, id: CallId) -> bool {
        match self.lock().get_mut(&id) {
            Some(call) => {
                call.sent = true;
                true
            }
            None => false,
        }
    }

    /// Settle the call `id` with `outcome`.
    ///
    /// Returns `false` when no such call is pending (already settled, timed
    /// out, or never submitted).
    pub fn resolve(&self, id: CallId, outcome: Result<Value>) -> bool {
        let Some(call) = self.lock().remove(&id) else {
            return false;
        };
        if call.slot.send(outcome).is_err() {
            debug!(id, operation = %call.operation, "reply arrived after the caller gave up");
        }
        true
    }

    /// Fail every pending call because the connection ended.
    ///
    /// Calls already written to the worker fail with
    /// [`AppError::Indeterminate`]: the worker may have acted on them. Calls
    /// still queued fail with [`AppError::WorkerExited`]. Returns the number
    /// of calls failed.
    pub fn resolve_all(&self, reason: &str) -> usize {
        let drained: Vec<(CallId, PendingCall)> = self.lock().drain().collect();
        let count = drained.len();

        for (id, call) in drained {
            let err = if call.sent {
                AppError::Indeterminate(format!(
                    "{} (call {id}) was in flight when the connection ended ({reason}); \
                     its effect is unknown",
                    call.operation
                ))
            } else {
                AppError::WorkerExited(format!(
                    "{} (call {id}) was not delivered: {reason}",
                    call.operation
                ))
            };
            // A dropped receiver means the caller already gave up.
            let _ = call.slot.send(Err(err));
        }

        count
    }

    /// Fail the call `id` with a timeout.
    ///
    /// Returns `false` when the call was settled first.
    pub fn expire(&self, id: CallId) -> bool {
        let Some(call) = self.lock().remove(&id) else {
            return false;
        };
        let elapsed = call.submitted_at.elapsed();
        let _ = call.slot.send(Err(AppError::Timeout(format!(
            "{} (call {id}) got no reply within {elapsed:?}",
            call.operation
        ))));
        true
    }

    /// Forget the call `id` without settling it.
    fn abandon(&self, id: CallId) -> bool {
        self.lock().remove(&id).is_some()
    }

    /// Whether `id` is still awaiting a reply.
    #[must_use]
    pub fn contains(&self, id: CallId) -> bool {
        self.lock().contains_key(&id)
    }

    /// Number of calls awaiting replies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no calls are awaiting replies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CallId, PendingCall>> {
        self.pending
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Caller's side of a submitted call.
///
/// Dropping it before the call settles (the caller timed out or was
/// cancelled) removes the call from its table; a later reply for the id is
/// then treated as unknown.
#[derive(Debug)]
pub struct PendingReply {
    id: CallId,
    operation: String,
    rx: oneshot::Receiver<Result<Value>>,
    table: CorrelationTable,
}

impl PendingReply {
    /// Identifier assigned to the call.
    #[must_use]
    pub fn id(&self) -> CallId {
        self.id
    }

    /// Operation the call was submitted for.
    #[must_use]
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Wait for the call to settle.
    ///
    /// With a `deadline`, an unanswered call is expired once it elapses;
    /// other calls on the table are unaffected.
    ///
    /// # Errors
    ///
    /// Returns whatever error settled the call: the worker's error,
    /// [`AppError::Timeout`], [`AppError::WorkerExited`], or
    /// [`AppError::Indeterminate`].
    pub async fn wait(mut self, deadline: Option<Duration>) -> Result<Value> {
        let settled = match deadline {
            None => (&mut self.rx).await,
            Some(limit) => match tokio::time::timeout(limit, &mut self.rx).await {
                Ok(settled) => settled,
                Err(_elapsed) => {
                    // The reply may have won the race; expire is then a no-op
                    // and the slot already holds it.
                    self.table.expire(self.id);
                    (&mut self.rx).await
                }
            },
        };

        settled.unwrap_or_else(|_closed| {
            Err(AppError::WorkerExited(format!(
                "{} (call {}) was abandoned by the connection",
                self.operation, self.id
            )))
        })
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        if self.table.abandon(self.id) {
            debug!(id = self.id, operation = %self.operation, "caller dropped an unsettled call");
        }
    }
}
