//! # electrolyzer-core
//!
//! Shared library for the electrolyzer bridge containing the wire-level
//! pieces that have no I/O of their own: the newline line framer, the JSON
//! line codec, and the telemetry/command value types.
//!
//! # Architecture overview
//!
//! The electrolyzer controller streams one JSON object per line over a raw TCP
//! socket.  Browsers talk to the bridge over WebSocket.  This crate is the
//! shared foundation for the device-facing half of that conversation:
//!
//! - **`protocol::framer`** – Turns an arbitrary sequence of byte chunks into
//!   complete, newline-terminated records.  TCP gives no message boundaries,
//!   so a single read may carry half a line or several lines at once.
//!
//! - **`protocol::codec`** – Decodes a record into a [`Snapshot`] and encodes a
//!   [`CommandMessage`] back into a newline-terminated line for the device.
//!
//! - **`protocol::messages`** – The opaque value types themselves.  No sensor
//!   schema is enforced: fields the bridge has never heard of are passed
//!   through untouched.
//!
//! This crate has zero dependencies on sockets, async runtimes, or threads.

pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `electrolyzer_core::Snapshot` instead of the full module path.
pub use protocol::codec::{
    decode_command, decode_device_line, encode_command_line, encode_snapshot, ProtocolError,
};
pub use protocol::framer::{FrameError, LineFramer, DEFAULT_MAX_LINE_BYTES, MIN_RECORD_CHARS};
pub use protocol::messages::{CommandMessage, Snapshot};
