//! JSON line codec for the device link and the browser-facing payloads.
//!
//! Wire format (device side):
//! ```text
//! device → bridge:  <JSON object>\n          one telemetry snapshot per line
//! bridge → device:  <JSON command>\n         one command per line
//! ```
//!
//! Framing (finding the `\n`) is the job of
//! [`LineFramer`](crate::protocol::framer::LineFramer); the functions here
//! work on one complete record at a time.

use serde_json::Value;
use thiserror::Error;

use crate::protocol::messages::{CommandMessage, Snapshot};

/// Errors that can occur while decoding or encoding a JSON record.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The record is not valid JSON.
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The record is valid JSON but not an object.
    #[error("expected a JSON object, got {0}")]
    NotAnObject(&'static str),
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Decodes one device line into a [`Snapshot`].
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidJson`] for malformed input and
/// [`ProtocolError::NotAnObject`] for valid JSON that is not an object
/// (`42`, `"text"`, `[...]`).
///
/// # Examples
///
/// ```rust
/// use electrolyzer_core::decode_device_line;
///
/// let snapshot = decode_device_line(r#"{"water":55.2}"#).unwrap();
/// assert_eq!(snapshot.len(), 1);
/// assert!(decode_device_line("{bad json").is_err());
/// ```
pub fn decode_device_line(line: &str) -> Result<Snapshot, ProtocolError> {
    match serde_json::from_str::<Value>(line)? {
        Value::Object(fields) => Ok(Snapshot::new(fields)),
        other => Err(ProtocolError::NotAnObject(json_kind(&other))),
    }
}

/// Decodes one browser message into a [`CommandMessage`].
///
/// Any JSON value is accepted; the device firmware is the authority on what
/// a valid command looks like.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidJson`] if the text does not parse.
pub fn decode_command(text: &str) -> Result<CommandMessage, ProtocolError> {
    let value: Value = serde_json::from_str(text)?;
    Ok(CommandMessage::new(value))
}

/// Encodes a command as compact JSON followed by a single `\n`.
///
/// Compact encoding never contains a raw newline (newlines inside strings are
/// escaped), so the device can frame commands the same way the bridge frames
/// telemetry.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidJson`] if serialization fails.
///
/// # Examples
///
/// ```rust
/// use electrolyzer_core::{decode_command, encode_command_line};
///
/// let cmd = decode_command(r#"{"command":"stop"}"#).unwrap();
/// assert_eq!(encode_command_line(&cmd).unwrap(), b"{\"command\":\"stop\"}\n");
/// ```
pub fn encode_command_line(command: &CommandMessage) -> Result<Vec<u8>, ProtocolError> {
    let mut line = serde_json::to_vec(command)?;
    line.push(b'\n');
    Ok(line)
}

/// Encodes a snapshot as compact JSON text (no terminator).
///
/// Used for WebSocket text frames, where the transport provides the message
/// boundary.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidJson`] if serialization fails.
pub fn encode_snapshot(snapshot: &Snapshot) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(snapshot)?)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
