//! Device channel: the single controller connection.
//!
//! The channel holds at most one [`DeviceLink`].  A link bundles everything
//! the bridge knows about one TCP connection from the controller:
//!
//! - a unique [`DeviceId`], so late notifications from a connection that has
//!   already been replaced can be recognised and ignored,
//! - the sending end of the queue drained by that connection's writer task,
//! - a one-shot signal that tells the connection's reader task to stop,
//! - the [`LineFramer`] holding any partial line received so far.
//!
//! # State machine
//!
//! ```text
//! DISCONNECTED ──on_connect──► CONNECTED ──on_disconnect──► DISCONNECTED
//! ```
//!
//! There are no intermediate states.  What happens when `on_connect` is
//! called while CONNECTED is decided by [`DevicePolicy`].

use std::net::SocketAddr;

use thiserror::Error;
use tokio::sync::{
    mpsc::{self, error::TrySendError},
    oneshot,
};
use tracing::{debug, warn};
use uuid::Uuid;

use electrolyzer_core::{
    decode_device_line, encode_command_line, CommandMessage, LineFramer, ProtocolError, Snapshot,
};

use crate::domain::DevicePolicy;

/// Identity of one device connection.
pub type DeviceId = Uuid;

/// Failures of device channel operations.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// No device connection is live.
    #[error("no device connected")]
    NotConnected,

    /// A device is already connected and the policy is `reject`.
    #[error("device {existing} already connected; refused {refused}")]
    AlreadyConnected {
        existing: SocketAddr,
        refused: SocketAddr,
    },

    /// The device writer is not keeping up.
    #[error("device write queue is full")]
    Busy,

    /// The command could not be serialized.
    #[error("failed to encode command: {0}")]
    Encode(#[from] ProtocolError),
}

/// One live connection from the controller.
#[derive(Debug)]
pub struct DeviceLink {
    id: DeviceId,
    peer: SocketAddr,
    outbound: mpsc::Sender<Vec<u8>>,
    shutdown: Option<oneshot::Sender<()>>,
    framer: LineFramer,
}

impl DeviceLink {
    /// Creates a link with a fresh random id.
    ///
    /// - `outbound` feeds the connection's writer task.
    /// - `shutdown` is fired when the link is force-closed.
    pub fn new(
        peer: SocketAddr,
        outbound: mpsc::Sender<Vec<u8>>,
        shutdown: oneshot::Sender<()>,
        max_line_bytes: usize,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            peer,
            outbound,
            shutdown: Some(shutdown),
            framer: LineFramer::with_max_line_bytes(max_line_bytes),
        }
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Signals the reader task to stop and drops the writer queue.
    fn close(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            // The reader may already be gone; nothing to do then.
            let _ = shutdown.send(());
        }
    }
}

/// Result of a successful [`DeviceChannel::on_connect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// No device was connected before.
    Accepted,
    /// A previous connection was force-closed.
    Replaced { previous: SocketAddr },
}

/// Owner of the single device connection.
#[derive(Debug, Default)]
pub struct DeviceChannel {
    link: Option<DeviceLink>,
}

impl DeviceChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` while a connection is live.
    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    /// Id and address of the live connection, if any.
    pub fn current(&self) -> Option<(DeviceId, SocketAddr)> {
        self.link.as_ref().map(|link| (link.id, link.peer))
    }

    /// Adopts a new connection according to `policy`.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::AlreadyConnected`] under [`DevicePolicy::Reject`]
    /// when a device is already live.  The refused link is closed.
    pub fn on_connect(
        &mut self,
        link: DeviceLink,
        policy: DevicePolicy,
    ) -> Result<ConnectOutcome, DeviceError> {
        match (self.link.take(), policy) {
            (None, _) => {
                self.link = Some(link);
                Ok(ConnectOutcome::Accepted)
            }
            (Some(existing), DevicePolicy::Reject) => {
                let err = DeviceError::AlreadyConnected {
                    existing: existing.peer,
                    refused: link.peer,
                };
                self.link = Some(existing);
                link.close();
                Err(err)
            }
            (Some(previous), DevicePolicy::Replace) => {
                let previous_peer = previous.peer;
                previous.close();
                self.link = Some(link);
                Ok(ConnectOutcome::Replaced {
                    previous: previous_peer,
                })
            }
        }
    }

    /// Feeds a chunk from connection `id` through its framer and returns the
    /// snapshots it completed, in arrival order.
    ///
    /// Malformed records are logged and dropped.  Chunks from a connection
    /// that is no longer current yield nothing.
    pub fn on_data(&mut self, id: DeviceId, chunk: &[u8]) -> Vec<Snapshot> {
        let Some(link) = self.link.as_mut().filter(|link| link.id == id) else {
            debug!("ignoring {} bytes from stale device connection {id}", chunk.len());
            return Vec::new();
        };

        let mut snapshots = Vec::new();
        for record in link.framer.push(chunk) {
            let line = match record {
                Ok(line) => line,
                Err(e) => {
                    warn!("device {}: framing error: {e}", link.peer);
                    continue;
                }
            };
            match decode_device_line(&line) {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(e) => warn!("device {}: dropped line: {e}", link.peer),
            }
        }
        snapshots
    }

    /// Clears connection `id` if it is the current one.
    ///
    /// Returns `false` for a stale or unknown id, leaving any newer
    /// connection untouched.
    pub fn on_disconnect(&mut self, id: DeviceId) -> bool {
        if self.link.as_ref().is_some_and(|link| link.id == id) {
            self.link = None;
            true
        } else {
            false
        }
    }

    /// Queues `command` as one JSON line for the device.
    ///
    /// # Errors
    ///
    /// - [`DeviceError::NotConnected`] when no device is live.
    /// - [`DeviceError::Busy`] when the writer queue is full.
    /// - [`DeviceError::Encode`] when serialization fails.
    pub fn send(&mut self, command: &CommandMessage) -> Result<(), DeviceError> {
        let link = self.link.as_ref().ok_or(DeviceError::NotConnected)?;
        let line = encode_command_line(command)?;
        match link.outbound.try_send(line) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(DeviceError::Busy),
            Err(TrySendError::Closed(_)) => {
                // Writer is gone; the reader will report the disconnect shortly.
                self.link = None;
                Err(DeviceError::NotConnected)
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
