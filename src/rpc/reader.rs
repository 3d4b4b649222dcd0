//! Reply reader task.
//!
//! Drives a [`FramedRead`] over the worker's stdout and settles pending
//! calls as replies arrive, in whatever order the worker sends them.
//!
//! | Inbound message                | Effect                                  |
//! |--------------------------------|-----------------------------------------|
//! | reply with a pending id        | call settled with its result or error   |
//! | reply with an unknown id       | logged at `WARN`, dropped               |
//! | notification                   | logged at `DEBUG`                       |
//! | request from the worker        | logged at `DEBUG`, not answered         |
//! | malformed, id recoverable      | that call fails with `AppError::Decode` |
//! | malformed, no id               | logged at `WARN`, skipped               |
//!
//! EOF or an I/O error ends the connection: `closed` is cancelled and every
//! pending call is failed.

use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::rpc::correlation::CorrelationTable;
use crate::worker::codec::{Inbound, WireCodec};
use crate::AppError;

/// Read replies from `stdout` until EOF, an I/O error, or `closed` fires.
pub async fn run_reader<R>(
    connection: u64,
    stdout: R,
    codec: WireCodec,
    table: CorrelationTable,
    closed: CancellationToken,
) where
    R: AsyncRead + Unpin + Send,
{
    let mut framed = FramedRead::new(stdout, codec);

    loop {
        tokio::select! {
            biased;

            () = closed.cancelled() => {
                debug!(connection, "reader: connection closed, stopping");
                return;
            }

            item = framed.next() => match item {
                None => {
                    debug!(connection, "reader: worker closed its output stream");
                    end_connection(connection, &table, &closed, "worker closed its output stream");
                    return;
                }
                Some(Err(err)) => {
                    warn!(connection, %err, "reader: stream error, stopping");
                    end_connection(connection, &table, &closed, &format!("worker output failed: {err}"));
                    return;
                }
                Some(Ok(message)) => route_inbound(connection, &table, message),
            }
        }
    }
}

fn route_inbound(connection: u64, table: &CorrelationTable, message: Inbound) {
    match message {
        Inbound::Reply(reply) => {
            let id = reply.id;
            if !table.resolve(id, reply.into_outcome()) {
                warn!(connection, id, "reader: reply for unknown call id, dropping");
            }
        }
        Inbound::Notification { method, .. } => {
            debug!(connection, method = %method, "reader: worker notification");
        }
        Inbound::Request { id, method } => {
            debug!(connection, %id, method = %method, "reader: ignoring request from worker");
        }
        Inbound::Malformed { id, reason, raw } => {
            warn!(connection, ?id, reason = reason.as_str(), raw = raw.as_str(), "reader: malformed message");
            if let Some(id) = id {
                table.resolve(id, Err(AppError::Decode { reason, raw }));
            }
        }
    }
}

fn end_connection(connection: u64, table: &CorrelationTable, closed: &CancellationToken, reason: &str) {
    closed.cancel();
    let failed = table.resolve_all(reason);
    if failed > 0 {
        warn!(connection, failed, reason, "reader: failed pending calls");
    }
}
