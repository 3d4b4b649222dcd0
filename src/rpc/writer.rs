//! Call writer task.
//!
//! Receives outbound messages from an [`mpsc`] channel and writes each as
//! one NDJSON line to the worker's stdin. Calls are marked as sent just
//! before their bytes are written, so a later connection failure reports
//! them as indeterminate rather than undelivered.

use bytes::BytesMut;
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::codec::Encoder;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::rpc::correlation::CorrelationTable;
use crate::worker::codec::WireCodec;
use crate::worker::protocol::{CallEnvelope, CallId, NotificationEnvelope};
use crate::AppError;

/// Message queued for the worker.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Outbound {
    /// Call expecting a reply.
    Call(CallEnvelope),
    /// Fire-and-forget notification.
    Notify(NotificationEnvelope),
}

impl Outbound {
    fn call_id(&self) -> Option<CallId> {
        match self {
            Self::Call(envelope) => Some(envelope.id),
            Self::Notify(_) => None,
        }
    }
}

/// Write queued messages to `stdin` until the channel closes or `closed`
/// fires. Dropping `stdin` on return closes the worker's input.
pub async fn run_writer<W>(
    connection: u64,
    mut stdin: W,
    mut outbound: mpsc::Receiver<Outbound>,
    mut codec: WireCodec,
    table: CorrelationTable,
    closed: CancellationToken,
) where
    W: AsyncWrite + Unpin + Send,
{
    let mut buf = BytesMut::new();

    loop {
        let message = tokio::select! {
            biased;

            () = closed.cancelled() => {
                debug!(connection, "writer: connection closed, stopping");
                break;
            }

            message = outbound.recv() => match message {
                Some(message) => message,
                None => {
                    debug!(connection, "writer: outbound channel closed, stopping");
                    break;
                }
            },
        };

        let id = message.call_id();
        buf.clear();
        if let Err(err) = codec.encode(&message, &mut buf) {
            warn!(connection, ?id, %err, "writer: failed to encode message");
            if let Some(id) = id {
                table.resolve(id, Err(err));
            }
            continue;
        }

        if let Some(id) = id {
            if !table.mark_sent(id) {
                // Settled while queued (deadline elapsed); nothing to send.
                debug!(connection, id, "writer: dropping call settled before send");
                continue;
            }
        }

        let written = async {
            stdin.write_all(&buf).await?;
            stdin.flush().await
        }
        .await;

        if let Err(err) = written {
            warn!(connection, ?id, %err, "writer: write to worker stdin failed");
            if let Some(id) = id {
                table.resolve(
                    id,
                    Err(AppError::Transport(format!("write to worker failed: {err}"))),
                );
            }
            closed.cancel();
            table.resolve_all("worker stopped accepting input");
            break;
        }
    }

    if let Err(err) = stdin.shutdown().await {
        debug!(connection, %err, "writer: closing worker stdin failed");
    }
}
