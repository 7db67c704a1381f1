//! Telemetry and command value types.
//!
//! Both types are deliberately schema-free.  The controller firmware decides
//! which sensor fields exist (`water`, `production`, `temperature`, ...) and
//! the dashboard decides how to render them; the bridge only relays.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ── Snapshot ──────────────────────────────────────────────────────────────────

/// The most recent telemetry object received from the device.
///
/// A snapshot is always a JSON *object*.  Field order from the device line is
/// preserved, so re-encoding a snapshot yields the same key order the
/// firmware sent.
///
/// # Serde representation
///
/// Transparent: a `Snapshot` serializes as the bare object.
///
/// ```json
/// {"water":55.2,"production":80,"mode":"auto"}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot(Map<String, Value>);

impl Snapshot {
    /// Wraps an already-parsed JSON object.
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// `true` when the object has no fields.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of top-level fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Looks up a top-level field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Borrows the underlying JSON object.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for Snapshot {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

// ── CommandMessage ────────────────────────────────────────────────────────────

/// An instruction sent by a dashboard client for the device.
///
/// The conventional shape is
///
/// ```json
/// {"command":"setProduction","value":75,"timestamp":"2024-05-01T10:00:00Z"}
/// ```
///
/// but the bridge only requires that the message parses as JSON.  Whatever
/// the client sent is forwarded to the device unchanged, so the accessors
/// below are informational (logging) and return `None` for absent fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandMessage(Value);

impl CommandMessage {
    /// Wraps an already-parsed JSON value.
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// The `command` field, when present and a string.
    pub fn command(&self) -> Option<&str> {
        self.0.get("command").and_then(Value::as_str)
    }

    /// The optional `value` argument (number or string).
    pub fn value(&self) -> Option<&Value> {
        self.0.get("value")
    }

    /// The client-side `timestamp` field, when present and a string.
    pub fn timestamp(&self) -> Option<&str> {
        self.0.get("timestamp").and_then(Value::as_str)
    }

    /// Short label for log lines; never includes argument values.
    pub fn label(&self) -> &str {
        self.command().unwrap_or("<unnamed>")
    }

    /// Borrows the raw JSON value.
    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

impl From<Value> for CommandMessage {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
