//! Client registry: the set of connected dashboard sessions.
//!
//! Each [`ClientSession`] owns the sending end of a bounded queue.  The
//! receiving end belongs to that session's WebSocket writer task, which turns
//! queued payloads into text frames.  Registry operations therefore never
//! touch a socket and never await: delivering a payload is a `try_send`.
//!
//! # Delivery outcomes
//!
//! ```text
//! try_send ──► Ok          delivered
//!          ──► Full        slow client: this payload is skipped, session kept
//!          ──► Closed      writer task gone: session pruned from the registry
//! ```
//!
//! One slow or dead client never affects delivery to the others.

use std::collections::HashMap;
use std::net::SocketAddr;

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;
use uuid::Uuid;

/// Identity of a client session.
pub type SessionId = Uuid;

/// Why a payload could not be queued for one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    /// The session's outbound queue is full.
    Full,
    /// The session's writer has gone away.
    Closed,
    /// No session with that id is registered.
    UnknownSession,
}

/// One connected dashboard client.
#[derive(Debug)]
pub struct ClientSession {
    id: SessionId,
    peer: SocketAddr,
    outbound: mpsc::Sender<String>,
}

impl ClientSession {
    /// Creates a session with a fresh random id.
    pub fn new(peer: SocketAddr, outbound: mpsc::Sender<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            peer,
            outbound,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Queues one payload without waiting.
    pub fn deliver(&self, payload: String) -> Result<(), DeliveryError> {
        self.outbound.try_send(payload).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::Full,
            TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

/// Per-broadcast delivery tally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Sessions that received the payload.
    pub delivered: usize,
    /// Sessions that were too far behind and skipped it.
    pub lagged: usize,
    /// Closed sessions removed during this broadcast.
    pub pruned: usize,
}

/// In-memory set of connected sessions, keyed by [`SessionId`].
///
/// Iteration order is unspecified; there is no ordering relationship between
/// sessions.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    sessions: HashMap<SessionId, ClientSession>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a session, returning its id.
    pub fn add(&mut self, session: ClientSession) -> SessionId {
        let id = session.id;
        self.sessions.insert(id, session);
        id
    }

    /// Removes a session.
    ///
    /// Idempotent: removing an absent id is a no-op returning `None`, since a
    /// close and an error for the same session may both report it.
    pub fn remove(&mut self, id: SessionId) -> Option<ClientSession> {
        self.sessions.remove(&id)
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Queues a payload for one session.
    ///
    /// A session found closed is pruned.
    pub fn send_to(&mut self, id: SessionId, payload: String) -> Result<(), DeliveryError> {
        let session = self
            .sessions
            .get(&id)
            .ok_or(DeliveryError::UnknownSession)?;
        let result = session.deliver(payload);
        if result == Err(DeliveryError::Closed) {
            self.sessions.remove(&id);
        }
        result
    }

    /// Queues `payload` for every open session.
    ///
    /// Closed sessions are removed; full queues are skipped.  Never fails as
    /// a whole.
    pub fn broadcast_all(&mut self, payload: &str) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        let mut closed = Vec::new();

        for (id, session) in &self.sessions {
            match session.deliver(payload.to_owned()) {
                Ok(()) => report.delivered += 1,
                Err(DeliveryError::Full) => {
                    debug!("client {} ({id}) is lagging; payload skipped", session.peer);
                    report.lagged += 1;
                }
                Err(DeliveryError::Closed | DeliveryError::UnknownSession) => closed.push(*id),
            }
        }

        for id in closed {
            if let Some(session) = self.sessions.remove(&id) {
                debug!("pruned closed client {} ({id})", session.peer);
                report.pruned += 1;
            }
        }

        report
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
