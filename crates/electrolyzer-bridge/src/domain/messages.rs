//! JSON payloads the bridge itself originates.
//!
//! Telemetry snapshots are relayed verbatim and are defined in
//! `electrolyzer-core`.  The two types here are the bridge's own voice:
//!
//! - [`ClientNotice`]: a failure report sent to a single dashboard client.
//! - [`StatusReport`]: the body of `GET /status`.
//!
//! # JSON shapes
//!
//! ```json
//! {"type":"error","code":"device_not_connected","message":"no device is connected"}
//! {"deviceConnected":true,"clientCount":2,"snapshot":{"water":55.2}}
//! ```

use serde::{Deserialize, Serialize};

use electrolyzer_core::Snapshot;

// ── ClientNotice ──────────────────────────────────────────────────────────────

/// Machine-readable reason carried by a [`ClientNotice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeCode {
    /// A command arrived while no device was connected.
    DeviceNotConnected,
    /// The device's outbound queue is full; the command was not forwarded.
    DeviceBusy,
    /// The client message did not parse as JSON.
    InvalidJson,
}

impl NoticeCode {
    /// Default human-readable text for this code.
    pub fn default_message(self) -> &'static str {
        match self {
            Self::DeviceNotConnected => "no device is connected",
            Self::DeviceBusy => "device is busy; command not forwarded",
            Self::InvalidJson => "message is not valid JSON",
        }
    }
}

/// A message from the bridge to one client, outside the telemetry stream.
///
/// Dashboards tell notices apart from snapshots by the `"type"` field; the
/// controller firmware does not emit a top-level `type` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientNotice {
    /// A recoverable failure tied to the client's last message.
    Error { code: NoticeCode, message: String },
}

impl ClientNotice {
    /// Builds an error notice with the code's default text.
    pub fn error(code: NoticeCode) -> Self {
        Self::Error {
            code,
            message: code.default_message().to_string(),
        }
    }
}

// ── StatusReport ──────────────────────────────────────────────────────────────

/// Live bridge state as reported by the status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    /// `true` while a device connection is live.
    pub device_connected: bool,
    /// Number of registered dashboard clients.
    pub client_count: usize,
    /// Last snapshot received from the device; `{}` before the first one.
    pub snapshot: Snapshot,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
