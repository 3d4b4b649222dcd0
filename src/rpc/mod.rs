//! Request/response client over the worker's stdio.
//!
//! - [`correlation`]: pending-call table keyed by call id.
//! - [`reader`] / [`writer`]: per-connection stream tasks.
//! - [`connection`]: one live worker connection.
//! - [`handshake`]: `initialize` exchange after connecting.
//! - [`client`]: lazily connected [`RpcClient`].

pub mod client;
pub mod connection;
pub mod correlation;
pub mod handshake;
pub mod reader;
pub mod writer;

pub use client::{ClientOptions, RpcClient};
pub use connection::ConnectionHandle;
pub use correlation::{CorrelationTable, PendingReply};
