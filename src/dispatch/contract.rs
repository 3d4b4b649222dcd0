//! Operation contracts and argument parsing helpers.

use std::fmt;

use serde::de::{self, DeserializeOwned, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::{AppError, Result};

/// Static description of one named operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationContract {
    /// Operation name as exposed to the calling agent and the worker.
    pub name: &'static str,
    /// Human-readable description for the calling agent.
    pub description: &'static str,
    /// JSON schema of the caller-supplied arguments.
    pub input_schema: Value,
    /// Whether the call fails without a user credential in context.
    pub requires_credential: bool,
}

/// Build a JSON schema object from properties and required fields.
#[must_use]
pub fn schema(properties: &Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

/// Parse caller-supplied `args` into the operation's typed input.
///
/// `null` is treated as an empty object.
///
/// # Errors
///
/// Returns `AppError::Validation` naming `operation` when `args` is not an
/// object or does not match the input shape.
pub fn parse_args<T: DeserializeOwned>(operation: &str, args: Value) -> Result<T> {
    let object = match args {
        Value::Null => Value::Object(Map::new()),
        Value::Object(map) => Value::Object(map),
        other => {
            return Err(AppError::Validation(format!(
                "{operation} expects an object of arguments, got {}",
                json_kind(&other)
            )))
        }
    };

    serde_json::from_value(object)
        .map_err(|err| AppError::Validation(format!("invalid arguments for {operation}: {err}")))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Platform entity identifier.
///
/// Accepts a non-negative JSON integer, an integral float such as `6.0`,
/// or a numeric string; always sent to the worker as an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityId(pub u64);

impl EntityId {
    /// Raw identifier.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for EntityId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.0)
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(EntityIdVisitor)
    }
}

struct EntityIdVisitor;

impl Visitor<'_> for EntityIdVisitor {
    type Value = EntityId;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a non-negative integer id or a numeric string")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<EntityId, E> {
        Ok(EntityId(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<EntityId, E> {
        u64::try_from(v)
            .map(EntityId)
            .map_err(|_| E::custom(format!("id must not be negative, got {v}")))
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::float_cmp)]
    fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<EntityId, E> {
        if v.is_finite() && v >= 0.0 && v.fract() == 0.0 && v <= 9_007_199_254_740_992.0 {
            Ok(EntityId(v as u64))
        } else {
            Err(E::custom(format!("id must be a whole non-negative number, got {v}")))
        }
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<EntityId, E> {
        v.trim()
            .parse::<u64>()
            .map(EntityId)
            .map_err(|_| E::custom(format!("id must be numeric, got '{v}'")))
    }
}
