//! Wire envelopes exchanged with the tool-server worker.
//!
//! Every message is one JSON-RPC 2.0 object on its own line. Outbound tool
//! calls use the `tools/call` method with `{ name, input }` parameters;
//! inbound replies carry either a `result` (the tool result) or an `error`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::{AppError, Result};

/// Identifier correlating a call with its reply.
pub type CallId = u64;

/// JSON-RPC version string written on every outbound message.
pub const JSONRPC_VERSION: &str = "2.0";

/// Protocol revision announced during the initialization handshake.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Method names used on the wire.
pub mod methods {
    /// Initialization request sent once per connection.
    pub const INITIALIZE: &str = "initialize";
    /// Notification confirming the handshake finished.
    pub const INITIALIZED: &str = "notifications/initialized";
    /// Invoke one named operation on the worker.
    pub const TOOLS_CALL: &str = "tools/call";
}

fn jsonrpc_version() -> String {
    JSONRPC_VERSION.to_owned()
}

/// Outbound request: `{ jsonrpc, id, method, params }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallEnvelope {
    /// Always `"2.0"`.
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    /// Correlation identifier.
    pub id: CallId,
    /// Wire method (`tools/call`, `initialize`).
    pub method: String,
    /// Method parameters.
    #[serde(default)]
    pub params: Value,
}

impl CallEnvelope {
    /// Build an envelope for an arbitrary method.
    #[must_use]
    pub fn new(id: CallId, method: &str, params: Value) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            id,
            method: method.to_owned(),
            params,
        }
    }

    /// Build a `tools/call` envelope for the named operation.
    #[must_use]
    pub fn tool_call(id: CallId, name: &str, input: Value) -> Self {
        Self::new(id, methods::TOOLS_CALL, tool_call_params(name, input))
    }

    /// Operation named by this envelope: the tool name for `tools/call`,
    /// the wire method otherwise.
    #[must_use]
    pub fn operation_name(&self) -> &str {
        if self.method == methods::TOOLS_CALL {
            if let Some(name) = self.params.get("name").and_then(Value::as_str) {
                return name;
            }
        }
        &self.method
    }

    /// Tool input carried by a `tools/call` envelope.
    #[must_use]
    pub fn tool_input(&self) -> Option<&Value> {
        self.params.get("input")
    }
}

/// `tools/call` parameters: `{ name, input }`.
#[must_use]
pub fn tool_call_params(name: &str, input: Value) -> Value {
    json!({ "name": name, "input": input })
}

/// Outbound notification (no reply expected).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEnvelope {
    /// Always `"2.0"`.
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    /// Notification method.
    pub method: String,
    /// Optional parameters.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

impl NotificationEnvelope {
    /// Build a notification envelope.
    #[must_use]
    pub fn new(method: &str, params: Value) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            method: method.to_owned(),
            params,
        }
    }
}

/// Error object of a failed JSON-RPC reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    /// JSON-RPC error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Optional structured detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Inbound reply: `{ jsonrpc, id, result | error }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyEnvelope {
    /// Always `"2.0"`.
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    /// Identifier of the call this reply answers.
    pub id: CallId,
    /// Success payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl ReplyEnvelope {
    /// Successful reply carrying `result`.
    #[must_use]
    pub fn success(id: CallId, result: Value) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Successful tool reply with a single text content item.
    #[must_use]
    pub fn text(id: CallId, text: &str) -> Self {
        Self::success(id, json!({ "content": [{ "type": "text", "text": text }] }))
    }

    /// Failed reply carrying a JSON-RPC error object.
    #[must_use]
    pub fn failure(id: CallId, code: i64, message: &str) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.to_owned(),
                data: None,
            }),
        }
    }

    /// Split the reply into the value or error it settles its call with.
    ///
    /// # Errors
    ///
    /// - [`AppError::Worker`] when the worker answered with an error object.
    /// - [`AppError::Protocol`] when the reply carries both or neither of
    ///   `result` and `error`.
    pub fn into_outcome(self) -> Result<Value> {
        match (self.result, self.error) {
            (Some(result), None) => Ok(result),
            (None, Some(error)) => Err(AppError::Worker(format!(
                "{} (code {})",
                error.message, error.code
            ))),
            (Some(_), Some(_)) => Err(AppError::Protocol(format!(
                "reply {} carries both result and error",
                self.id
            ))),
            (None, None) => Err(AppError::Protocol(format!(
                "reply {} carries neither result nor error",
                self.id
            ))),
        }
    }
}

/// One item of a tool result's `content` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    /// Content kind; only `text` is recognized.
    #[serde(rename = "type")]
    pub kind: String,
    /// Text payload for `text` items.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Result object of a `tools/call` reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    /// Content items; a valid reply has exactly one text item.
    #[serde(default)]
    pub content: Vec<ContentItem>,
    /// Set by the worker when the tool itself failed.
    #[serde(rename = "isError", default, skip_serializing_if = "is_false")]
    pub is_error: bool,
}

#[allow(clippy::trivially_copy_pass_by_ref)] // serde's skip_serializing_if passes a reference.
fn is_false(value: &bool) -> bool {
    !*value
}

impl ToolCallResult {
    /// Extract the single text payload of the result.
    ///
    /// # Errors
    ///
    /// - [`AppError::Worker`] when `isError` is set; the message is the
    ///   text the worker supplied.
    /// - [`AppError::Protocol`] when the content is empty, has more than
    ///   one item, or its item is not recognized text.
    pub fn into_text(self, operation: &str) -> Result<String> {
        if self.is_error {
            let detail: Vec<String> = self.content.into_iter().filter_map(|c| c.text).collect();
            let detail = if detail.is_empty() {
                "worker reported an error without detail".to_owned()
            } else {
                detail.join("\n")
            };
            return Err(AppError::Worker(detail));
        }

        let count = self.content.len();
        let mut items = self.content.into_iter();
        let (Some(item), None) = (items.next(), items.next()) else {
            return Err(AppError::Protocol(format!(
                "{operation} returned {count} content items; expected exactly one"
            )));
        };

        if item.kind != "text" {
            return Err(AppError::Protocol(format!(
                "{operation} returned unrecognized content kind '{}'",
                item.kind
            )));
        }

        item.text.ok_or_else(|| {
            AppError::Protocol(format!("{operation} returned a text item without text"))
        })
    }
}

/// Drop top-level `null` members of an object payload.
///
/// Optional arguments left unset by the caller are omitted from the wire
/// rather than sent as explicit nulls.
#[must_use]
pub fn strip_nulls(payload: Value) -> Value {
    match payload {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .collect::<Map<String, Value>>(),
        ),
        Value::Null => Value::Object(Map::new()),
        other => other,
    }
}
