//! Initialization handshake with a freshly connected worker.
//!
//! Sequence:
//! 1. `initialize` request carrying the protocol revision, empty client
//!    capabilities, and client info.
//! 2. Wait (bounded by the startup timeout) for the worker's result.
//! 3. `notifications/initialized` notification.
//!
//! Tool calls are only issued once all three steps succeed.

use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::rpc::connection::ConnectionHandle;
use crate::worker::protocol::{methods, PROTOCOL_VERSION};
use crate::{AppError, Result};

/// Client name announced in `clientInfo`.
pub const CLIENT_NAME: &str = "moodle-agent-bridge";

/// Identity the worker reported during the handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ServerInfo {
    /// Worker name.
    #[serde(default)]
    pub name: String,
    /// Worker version.
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Deserialize)]
struct InitializeResult {
    #[serde(rename = "protocolVersion", default)]
    protocol_version: Option<String>,
    #[serde(rename = "serverInfo", default)]
    server_info: ServerInfo,
}

/// `initialize` parameters sent by this client.
#[must_use]
pub fn initialize_params() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": CLIENT_NAME,
            "version": env!("CARGO_PKG_VERSION"),
        },
    })
}

/// Run the handshake over `handle`.
///
/// # Errors
///
/// - `AppError::Timeout` if the worker does not answer `initialize` within
///   `startup_timeout`.
/// - `AppError::Protocol` if the `initialize` result is not an object.
/// - Any error settling the `initialize` call (worker error, worker exit).
pub async fn perform_handshake(handle: &ConnectionHandle, startup_timeout: Duration) -> Result<ServerInfo> {
    let result = handle
        .call(
            methods::INITIALIZE,
            methods::INITIALIZE,
            initialize_params(),
            Some(startup_timeout),
        )
        .await
        .map_err(|err| match err {
            AppError::Timeout(msg) => AppError::Timeout(format!("worker handshake: {msg}")),
            other => other,
        })?;

    let init: InitializeResult = serde_json::from_value(result)
        .map_err(|err| AppError::Protocol(format!("invalid initialize result: {err}")))?;

    match init.protocol_version.as_deref() {
        Some(PROTOCOL_VERSION) | None => {}
        Some(other) => warn!(
            connection = handle.id(),
            offered = PROTOCOL_VERSION,
            accepted = other,
            "worker negotiated a different protocol revision"
        ),
    }

    handle.notify(methods::INITIALIZED, Value::Null).await?;

    info!(
        connection = handle.id(),
        server = %init.server_info.name,
        version = %init.server_info.version,
        "worker handshake complete"
    );

    Ok(init.server_info)
}
