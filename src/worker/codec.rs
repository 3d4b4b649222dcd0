//! NDJSON codec for the worker's stdio streams.
//!
//! Wraps [`tokio_util::codec::AnyDelimiterCodec`] with a configurable maximum
//! message length so a misbehaving worker cannot make the client buffer an
//! unbounded line.
//!
//! # Decoding
//!
//! Each `\n`-terminated chunk is classified into an [`Inbound`] message.
//! A chunk that is not valid JSON, is not an object, or exceeds the length
//! limit decodes to [`Inbound::Malformed`] instead of an error, because
//! [`tokio_util::codec::FramedRead`] ends the stream after the first decoder
//! error. Only I/O failures surface as errors. Blank lines and trailing
//! `\r` are ignored.
//!
//! An oversized line is skipped without buffering it. Its first and last
//! bytes are kept so the reply id can still be recovered: JSON-RPC peers put
//! `"id"` either before or after the (large) `result`. The `Malformed` item
//! is produced once the whole line has gone past.
//!
//! # Encoding
//!
//! Any [`Serialize`] value is written as compact JSON followed by `\n`.

use bytes::{Buf, BytesMut};
use serde::Serialize;
use serde_json::Value;
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, Decoder, Encoder};

use crate::worker::protocol::{CallId, ReplyEnvelope};
use crate::{AppError, Result};

/// Maximum message length accepted from the worker: 4 MiB.
pub const MAX_MESSAGE_BYTES: usize = 4 * 1024 * 1024;

/// Bytes of an offending message kept for diagnostics.
const RAW_PREVIEW_BYTES: usize = 512;

/// Trailing bytes of an oversized line kept for id recovery.
const TAIL_BYTES: usize = 128;

/// One classified message from the worker's stdout.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Reply to an outstanding call.
    Reply(ReplyEnvelope),
    /// Message with a `method` and no `id`.
    Notification {
        /// Notification method.
        method: String,
        /// Notification parameters (`null` if absent).
        params: Value,
    },
    /// Message with both `method` and `id`; the client serves no requests.
    Request {
        /// Request identifier as sent.
        id: Value,
        /// Request method.
        method: String,
    },
    /// Message that could not be decoded.
    Malformed {
        /// Call identifier, when one could be recovered from the message.
        id: Option<CallId>,
        /// Why the message was rejected.
        reason: String,
        /// Leading bytes of the message, lossily converted to UTF-8.
        raw: String,
    },
}

impl Inbound {
    /// Error describing a malformed message, `None` for every other kind.
    #[must_use]
    pub fn decode_error(&self) -> Option<AppError> {
        match self {
            Self::Malformed { reason, raw, .. } => Some(AppError::Decode {
                reason: reason.clone(),
                raw: raw.clone(),
            }),
            _ => None,
        }
    }
}

/// NDJSON codec for worker stdio.
#[derive(Debug)]
pub struct WireCodec {
    inner: AnyDelimiterCodec,
    max_length: usize,
    skipping: Option<OversizedLine>,
}

impl WireCodec {
    /// Codec with the default [`MAX_MESSAGE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_length(MAX_MESSAGE_BYTES)
    }

    /// Codec rejecting inbound messages longer than `max_length` bytes.
    #[must_use]
    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            inner: line_codec(max_length),
            max_length,
            skipping: None,
        }
    }

    /// Largest inbound message this codec accepts.
    #[must_use]
    pub fn max_length(&self) -> usize {
        self.max_length
    }

    fn decode_line(&mut self, src: &mut BytesMut, eof: bool) -> Result<Option<Inbound>> {
        loop {
            if self.skipping.is_some() {
                return Ok(self.skip_oversized(src, eof));
            }

            let chunk = if eof {
                self.inner.decode_eof(src)
            } else {
                self.inner.decode(src)
            };

            match chunk {
                Ok(Some(chunk)) => {
                    if let Some(message) = classify_message(&chunk) {
                        return Ok(Some(message));
                    }
                }
                Ok(None) => return Ok(None),
                Err(AnyDelimiterCodecError::MaxChunkLengthExceeded) => {
                    // The inner codec would discard the rest of the line
                    // itself; reset it and skip here so the tail is seen.
                    self.inner = line_codec(self.max_length);
                    self.skipping = Some(OversizedLine::starting_at(src));
                }
                Err(AnyDelimiterCodecError::Io(err)) => {
                    return Err(AppError::Transport(format!("read failed: {err}")));
                }
            }
        }
    }

    /// Consume the oversized line in `src`; yields its `Malformed` item once
    /// the delimiter (or EOF) is reached.
    fn skip_oversized(&mut self, src: &mut BytesMut, eof: bool) -> Option<Inbound> {
        let line = self.skipping.as_mut()?;

        match src.iter().position(|&b| b == b'\n') {
            Some(end) => {
                line.consume(&src[..end]);
                src.advance(end + 1);
            }
            None => {
                line.consume(src);
                src.clear();
                if !eof {
                    return None;
                }
            }
        }

        self.skipping
            .take()
            .map(|line| line.into_malformed(self.max_length))
    }
}

impl Default for WireCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for WireCodec {
    type Item = Inbound;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Inbound>> {
        self.decode_line(src, false)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Inbound>> {
        self.decode_line(src, true)
    }
}

fn line_codec(max_length: usize) -> AnyDelimiterCodec {
    AnyDelimiterCodec::new_with_max_length(b"\n".to_vec(), b"\n".to_vec(), max_length)
}

/// Line being skipped because it exceeds the length limit.
#[derive(Debug)]
struct OversizedLine {
    head: Vec<u8>,
    tail: Vec<u8>,
    len: usize,
}

impl OversizedLine {
    fn starting_at(src: &[u8]) -> Self {
        let window = &src[..src.len().min(RAW_PREVIEW_BYTES)];
        let end = window.iter().position(|&b| b == b'\n').unwrap_or(window.len());
        Self {
            head: window[..end].to_vec(),
            tail: Vec::with_capacity(TAIL_BYTES),
            len: 0,
        }
    }

    fn consume(&mut self, bytes: &[u8]) {
        self.len += bytes.len();
        self.tail
            .extend_from_slice(&bytes[bytes.len().saturating_sub(TAIL_BYTES)..]);
        let excess = self.tail.len().saturating_sub(TAIL_BYTES);
        self.tail.drain(..excess);
    }

    fn into_malformed(self, max_length: usize) -> Inbound {
        let is_request = key_value(&self.head, b"\"method\"").is_some()
            || key_value(&self.tail, b"\"method\"").is_some();
        let id = if is_request {
            None
        } else {
            leading_id(&self.head).or_else(|| trailing_id(&self.tail))
        };

        let mut raw = String::from_utf8_lossy(&self.head).into_owned();
        raw.push('…');

        Inbound::Malformed {
            id,
            reason: format!("message of {} bytes exceeds {max_length} bytes", self.len),
            raw,
        }
    }
}

/// Bytes following the first unescaped `key` that is followed by `:`.
fn key_value<'a>(window: &'a [u8], key: &'static [u8]) -> Option<&'a [u8]> {
    key_values(window, key).next()
}

fn key_values<'a>(window: &'a [u8], key: &'static [u8]) -> impl Iterator<Item = &'a [u8]> + 'a {
    window
        .windows(key.len())
        .enumerate()
        .filter(move |&(at, candidate)| candidate == key && (at == 0 || window[at - 1] != b'\\'))
        .filter_map(move |(at, _)| {
            match window[at + key.len()..].trim_ascii_start().split_first() {
                Some((b':', value)) => Some(value.trim_ascii_start()),
                _ => None,
            }
        })
}

/// Integer id whose digits end inside `value`, so it was not cut off.
fn parse_id(value: &[u8]) -> Option<CallId> {
    let digits = value.iter().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 || digits == value.len() {
        return None;
    }
    std::str::from_utf8(&value[..digits]).ok()?.parse().ok()
}

fn leading_id(head: &[u8]) -> Option<CallId> {
    key_value(head, b"\"id\"").and_then(parse_id)
}

fn trailing_id(tail: &[u8]) -> Option<CallId> {
    key_values(tail, b"\"id\"").last().and_then(parse_id)
}

impl<T: Serialize> Encoder<T> for WireCodec {
    type Error = AppError;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<()> {
        let line = serde_json::to_string(&item).map_err(|err| {
            AppError::Protocol(format!("failed to serialise outbound message: {err}"))
        })?;
        self.inner
            .encode(line, dst)
            .map_err(|err| AppError::Transport(format!("encode failed: {err}")))
    }
}

/// Classify one line received from the worker.
///
/// Returns `None` for blank lines.
#[must_use]
pub fn classify_message(line: &[u8]) -> Option<Inbound> {
    let line = line.trim_ascii();
    if line.is_empty() {
        return None;
    }

    let value: Value = match serde_json::from_slice(line) {
        Ok(value) => value,
        Err(err) => return Some(malformed(None, format!("malformed json: {err}"), line)),
    };

    let Value::Object(map) = &value else {
        return Some(malformed(None, "message is not a JSON object".into(), line));
    };

    let method = map.get("method").and_then(Value::as_str).map(str::to_owned);
    let id = map.get("id").filter(|id| !id.is_null()).cloned();

    let message = match (method, id) {
        (Some(method), None) => Inbound::Notification {
            method,
            params: map.get("params").cloned().unwrap_or(Value::Null),
        },
        (Some(method), Some(id)) => Inbound::Request { id, method },
        (None, Some(id)) => {
            let call_id = id.as_u64();
            match serde_json::from_value::<ReplyEnvelope>(value) {
                Ok(reply) => Inbound::Reply(reply),
                Err(err) => malformed(call_id, format!("invalid reply envelope: {err}"), line),
            }
        }
        (None, None) => malformed(None, "message has neither id nor method".into(), line),
    };

    Some(message)
}

fn malformed(id: Option<CallId>, reason: String, raw: &[u8]) -> Inbound {
    Inbound::Malformed {
        id,
        reason,
        raw: raw_preview(raw),
    }
}

fn raw_preview(raw: &[u8]) -> String {
    let end = raw.len().min(RAW_PREVIEW_BYTES);
    let mut preview = String::from_utf8_lossy(&raw[..end]).into_owned();
    if raw.len() > end {
        preview.push('…');
    }
    preview
}
