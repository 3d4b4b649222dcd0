//! Shared utilities for tool adapters.

use serde_json::{Map, Value};

/// Argument keys whose values never appear in logs.
const SECRET_KEYS: &[&str] = &["moodle_token", "token", "wstoken"];

/// Truncate `text` to at most `max_len` bytes, breaking at the nearest
/// preceding char boundary so the result is always valid UTF-8.
/// Appends `"..."` when truncation occurs and `max_len >= 3`.
#[must_use]
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.len() <= max_len {
        return text.to_owned();
    }

    let limit = if max_len < 3 { max_len } else { max_len - 3 };
    let boundary = text
        .char_indices()
        .map(|(i, _)| i)
        .take_while(|&i| i <= limit)
        .last()
        .unwrap_or(0);

    if max_len < 3 {
        text[..boundary].to_owned()
    } else {
        format!("{}...", &text[..boundary])
    }
}

/// Compact, log-safe rendering of call arguments.
///
/// Secret-looking keys are masked and the result is truncated to
/// `max_len` bytes.
#[must_use]
pub fn args_preview(args: &Value, max_len: usize) -> String {
    let masked = match args {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| {
                    let value = if SECRET_KEYS.contains(&key.as_str()) {
                        Value::String("***".into())
                    } else {
                        value.clone()
                    };
                    (key.clone(), value)
                })
                .collect::<Map<String, Value>>(),
        ),
        other => other.clone(),
    };
    truncate_text(&masked.to_string(), max_len)
}

/// Trimmed copy of `text`, or `None` when nothing but whitespace remains.
#[must_use]
pub fn non_blank(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_owned()).filter(|t| !t.is_empty())
}
