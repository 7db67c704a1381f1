//! Bridge coordinator: the single owner of all cross-transport state.
//!
//! The coordinator holds the device channel, the client registry and the
//! last snapshot.  Transport tasks in the infrastructure layer call its entry
//! points while holding the [`SharedCoordinator`] lock:
//!
//! | Trigger                       | Entry point                  |
//! |-------------------------------|------------------------------|
//! | device connected              | [`on_device_connected`]      |
//! | bytes read from the device    | [`on_device_data`]           |
//! | device connection ended       | [`on_device_disconnected`]   |
//! | browser connected             | [`on_client_connected`]      |
//! | browser sent a message        | [`on_client_message`]        |
//! | browser connection ended      | [`on_client_disconnected`]   |
//! | `GET /status`                 | [`status`]                   |
//!
//! Every entry point is synchronous.  Outbound traffic is only queued (see
//! [`ClientRegistry`] and [`DeviceChannel`]), so holding the lock never spans
//! socket I/O and entry points cannot interleave.
//!
//! [`on_device_connected`]: BridgeCoordinator::on_device_connected
//! [`on_device_data`]: BridgeCoordinator::on_device_data
//! [`on_device_disconnected`]: BridgeCoordinator::on_device_disconnected
//! [`on_client_connected`]: BridgeCoordinator::on_client_connected
//! [`on_client_message`]: BridgeCoordinator::on_client_message
//! [`on_client_disconnected`]: BridgeCoordinator::on_client_disconnected
//! [`status`]: BridgeCoordinator::status

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use electrolyzer_core::{decode_command, encode_snapshot, ProtocolError, Snapshot};

use crate::application::client_registry::{ClientRegistry, ClientSession, SessionId};
use crate::application::device_channel::{
    ConnectOutcome, DeviceChannel, DeviceError, DeviceId, DeviceLink,
};
use crate::domain::{ClientNotice, DevicePolicy, NoticeCode, StatusReport};

/// The coordinator as shared between connection tasks.
pub type SharedCoordinator = Arc<Mutex<BridgeCoordinator>>;

/// Why a client message was not forwarded to the device.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("client message is not valid JSON: {0}")]
    InvalidJson(#[source] ProtocolError),

    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// Central state machine of the bridge.
#[derive(Debug)]
pub struct BridgeCoordinator {
    policy: DevicePolicy,
    device: DeviceChannel,
    clients: ClientRegistry,
    snapshot: Option<Snapshot>,
}

impl BridgeCoordinator {
    /// Creates an empty coordinator: no device, no clients, no snapshot.
    pub fn new(policy: DevicePolicy) -> Self {
        Self {
            policy,
            device: DeviceChannel::new(),
            clients: ClientRegistry::new(),
            snapshot: None,
        }
    }

    /// Wraps the coordinator for use from many tasks.
    pub fn shared(self) -> SharedCoordinator {
        Arc::new(Mutex::new(self))
    }

    // ── Device side ───────────────────────────────────────────────────────────

    /// Adopts a new device connection according to the configured policy.
    ///
    /// # Errors
    ///
    /// [`DeviceError::AlreadyConnected`] when the policy is `reject` and a
    /// device is live.  The caller should close the new socket.
    pub fn on_device_connected(&mut self, link: DeviceLink) -> Result<ConnectOutcome, DeviceError> {
        let peer = link.peer();
        match self.device.on_connect(link, self.policy) {
            Ok(ConnectOutcome::Accepted) => {
                info!("device connected from {peer}");
                Ok(ConnectOutcome::Accepted)
            }
            Ok(ConnectOutcome::Replaced { previous }) => {
                warn!("device {peer} replaced existing connection from {previous}");
                Ok(ConnectOutcome::Replaced { previous })
            }
            Err(e) => {
                warn!("{e}");
                Err(e)
            }
        }
    }

    /// Feeds bytes from device connection `id` and broadcasts every snapshot
    /// they complete, in order.
    ///
    /// Returns the number of snapshots published.
    pub fn on_device_data(&mut self, id: DeviceId, chunk: &[u8]) -> usize {
        let snapshots = self.device.on_data(id, chunk);
        let published = snapshots.len();
        for snapshot in snapshots {
            self.publish(snapshot);
        }
        published
    }

    /// Marks device connection `id` as gone.
    ///
    /// Returns `false` when `id` was already replaced, in which case nothing
    /// changes.  The last snapshot is kept.
    pub fn on_device_disconnected(&mut self, id: DeviceId) -> bool {
        let peer = self.device.current().map(|(_, peer)| peer);
        let cleared = self.device.on_disconnect(id);
        match peer {
            Some(peer) if cleared => info!("device {peer} disconnected"),
            _ => debug!("stale device connection {id} ended"),
        }
        cleared
    }

    fn publish(&mut self, snapshot: Snapshot) {
        match encode_snapshot(&snapshot) {
            Ok(payload) => {
                let report = self.clients.broadcast_all(&payload);
                debug!(
                    "snapshot broadcast: delivered={} lagged={} pruned={}",
                    report.delivered, report.lagged, report.pruned
                );
            }
            Err(e) => error!("failed to encode snapshot: {e}"),
        }
        self.snapshot = Some(snapshot);
    }

    // ── Client side ───────────────────────────────────────────────────────────

    /// Registers a client and sends it the current snapshot, if any.
    pub fn on_client_connected(&mut self, session: ClientSession) -> SessionId {
        let peer = session.peer();
        let id = self.clients.add(session);
        info!("client {peer} ({id}) connected; {} total", self.clients.len());

        if let Some(snapshot) = &self.snapshot {
            match encode_snapshot(snapshot) {
                Ok(payload) => {
                    if let Err(e) = self.clients.send_to(id, payload) {
                        debug!("catch-up snapshot for {id} not delivered: {e:?}");
                    }
                }
                Err(e) => error!("failed to encode snapshot: {e}"),
            }
        }
        id
    }

    /// Unregisters a client.  Safe to call more than once.
    pub fn on_client_disconnected(&mut self, id: SessionId) -> bool {
        let removed = self.clients.remove(id).is_some();
        if removed {
            info!("client {id} disconnected; {} remaining", self.clients.len());
        }
        removed
    }

    /// Decodes a message from client `id` and forwards it to the device.
    ///
    /// Failures are reported to that client alone as a [`ClientNotice`] and
    /// returned to the caller for logging; the session stays open.
    pub fn on_client_message(&mut self, id: SessionId, text: &str) -> Result<(), CommandError> {
        let command = match decode_command(text) {
            Ok(command) => command,
            Err(e) => {
                self.notify_client(id, &ClientNotice::error(NoticeCode::InvalidJson));
                return Err(CommandError::InvalidJson(e));
            }
        };

        if !self.device.is_connected() {
            self.notify_client(id, &ClientNotice::error(NoticeCode::DeviceNotConnected));
            return Err(DeviceError::NotConnected.into());
        }

        match self.device.send(&command) {
            Ok(()) => {
                debug!("client {id} → device: {}", command.label());
                Ok(())
            }
            Err(e) => {
                let code = match e {
                    DeviceError::NotConnected => Some(NoticeCode::DeviceNotConnected),
                    DeviceError::Busy => Some(NoticeCode::DeviceBusy),
                    DeviceError::AlreadyConnected { .. } | DeviceError::Encode(_) => None,
                };
                if let Some(code) = code {
                    self.notify_client(id, &ClientNotice::error(code));
                }
                Err(e.into())
            }
        }
    }

    /// Queues `notice` for client `id` only.
    pub fn notify_client(&mut self, id: SessionId, notice: &ClientNotice) {
        let payload = match serde_json::to_string(notice) {
            Ok(payload) => payload,
            Err(e) => {
                error!("failed to encode client notice: {e}");
                return;
            }
        };
        if let Err(e) = self.clients.send_to(id, payload) {
            debug!("notice for client {id} not delivered: {e:?}");
        }
    }

    // ── Introspection ─────────────────────────────────────────────────────────

    /// Live view of the bridge state.
    pub fn status(&self) -> StatusReport {
        StatusReport {
            device_connected: self.device.is_connected(),
            client_count: self.clients.len(),
            snapshot: self.snapshot.clone().unwrap_or_default(),
        }
    }

    pub fn device_connected(&self) -> bool {
        self.device.is_connected()
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Last snapshot received, if any.
    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    use serde_json::{json, Value};
    use tokio::sync::{mpsc, oneshot};

    struct TestDevice {
        link: DeviceLink,
        rx: mpsc::Receiver<Vec<u8>>,
        _shutdown: oneshot::Receiver<()>,
    }

    fn make_device() -> TestDevice {
        let (tx, rx) = mpsc::channel(8);
        let (shutdown, shutdown_rx) = oneshot::channel();
        TestDevice {
            link: DeviceLink::new(SocketAddr::from(([10, 0, 0, 2], 50000)), tx, shutdown, 4096),
            rx,
            _shutdown: shutdown_rx,
        }
    }

    fn make_client() -> (ClientSession, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(8);
        (ClientSession::new(SocketAddr::from(([127, 0, 0, 1], 40000)), tx), rx)
    }

    fn parse(text: &str) -> Value {
        serde_json::from_str(text).unwrap()
    }

    /// Connects a device and returns its id plus the queue it writes from.
    fn connect_device(coord: &mut BridgeCoordinator) -> (DeviceId, mpsc::Receiver<Vec<u8>>) {
        let dev = make_device();
        let id = dev.link.id();
        coord.on_device_connected(dev.link).unwrap();
        (id, dev.rx)
    }

    #[test]
    fn test_new_coordinator_is_empty() {
        let coord = BridgeCoordinator::new(DevicePolicy::Replace);
        let status = coord.status();
        assert!(!status.device_connected);
        assert_eq!(status.client_count, 0);
        assert!(status.snapshot.is_empty());
        assert!(coord.snapshot().is_none());
    }

    #[test]
    fn test_device_data_updates_snapshot_and_broadcasts() {
        // Arrange
        let mut coord = BridgeCoordinator::new(DevicePolicy::Replace);
        let (a, mut ra) = make_client();
        let (b, mut rb) = make_client();
        coord.on_client_connected(a);
        coord.on_client_connected(b);
        let (dev_id, _dev_rx) = connect_device(&mut coord);

        // Act
        let published = coord.on_device_data(dev_id, b"{\"water\":55.2}\n");

        // Assert
        assert_eq!(published, 1);
        assert_eq!(coord.snapshot().unwrap().get("water"), Some(&json!(55.2)));
        assert_eq!(parse(&ra.try_recv().unwrap()), json!({"water": 55.2}));
        assert_eq!(parse(&rb.try_recv().unwrap()), json!({"water": 55.2}));
    }

    #[test]
    fn test_malformed_device_line_never_updates_snapshot() {
        // Arrange
        let mut coord = BridgeCoordinator::new(DevicePolicy::Replace);
        let (dev_id, _dev_rx) = connect_device(&mut coord);
        coord.on_device_data(dev_id, b"{\"water\":10}\n");

        // Act: a bad line, then a good one in a later chunk
        let bad = coord.on_device_data(dev_id, b"{bad json\n");
        let snapshot_after_bad = coord.snapshot().cloned();
        let good = coord.on_device_data(dev_id, b"{\"water\":11}\n");

        // Assert
        assert_eq!(bad, 0);
        assert_eq!(snapshot_after_bad.unwrap().get("water"), Some(&json!(10)));
        assert_eq!(good, 1);
        assert_eq!(coord.snapshot().unwrap().get("water"), Some(&json!(11)));
    }

    #[test]
    fn test_snapshot_is_replaced_wholesale() {
        let mut coord = BridgeCoordinator::new(DevicePolicy::Replace);
        let (dev_id, _dev_rx) = connect_device(&mut coord);

        coord.on_device_data(dev_id, b"{\"water\":1,\"mode\":\"auto\"}\n{\"water\":2}\n");

        let snapshot = coord.snapshot().unwrap();
        assert_eq!(snapshot.get("water"), Some(&json!(2)));
        assert!(snapshot.get("mode").is_none());
    }

    #[test]
    fn test_device_lines_broadcast_in_arrival_order() {
        let mut coord = BridgeCoordinator::new(DevicePolicy::Replace);
        let (client, mut rx) = make_client();
        coord.on_client_connected(client);
        let (dev_id, _dev_rx) = connect_device(&mut coord);

        coord.on_device_data(dev_id, b"{\"n\":1}\n{\"n\"");
        coord.on_device_data(dev_id, b":2}\n{\"n\":3}\n");

        for n in 1..=3 {
            assert_eq!(parse(&rx.try_recv().unwrap()), json!({"n": n}));
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_new_client_receives_current_snapshot_first() {
        // Arrange
        let mut coord = BridgeCoordinator::new(DevicePolicy::Replace);
        let (dev_id, _dev_rx) = connect_device(&mut coord);
        coord.on_device_data(dev_id, b"{\"water\":55.2}\n");

        // Act: connect with no further device data
        let (client, mut rx) = make_client();
        coord.on_client_connected(client);

        // Assert
        assert_eq!(rx.try_recv().unwrap(), r#"{"water":55.2}"#);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_new_client_gets_nothing_before_first_snapshot() {
        let mut coord = BridgeCoordinator::new(DevicePolicy::Replace);
        let (client, mut rx) = make_client();
        coord.on_client_connected(client);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_command_without_device_notifies_only_sender() {
        // Arrange
        let mut coord = BridgeCoordinator::new(DevicePolicy::Replace);
        let (sender, mut sender_rx) = make_client();
        let (other, mut other_rx) = make_client();
        let sender_id = coord.on_client_connected(sender);
        coord.on_client_connected(other);

        // Act
        let result = coord.on_client_message(sender_id, r#"{"command":"start"}"#);

        // Assert
        assert!(matches!(
            result,
            Err(CommandError::Device(DeviceError::NotConnected))
        ));
        let notice = parse(&sender_rx.try_recv().unwrap());
        assert_eq!(notice["type"], "error");
        assert_eq!(notice["code"], "device_not_connected");
        assert!(other_rx.try_recv().is_err());
        assert_eq!(coord.client_count(), 2);
    }

    #[test]
    fn test_command_without_device_is_not_queued_for_later() {
        let mut coord = BridgeCoordinator::new(DevicePolicy::Replace);
        let (client, _rx) = make_client();
        let id = coord.on_client_connected(client);
        let _ = coord.on_client_message(id, r#"{"command":"start"}"#);

        let (_dev_id, mut dev_rx) = connect_device(&mut coord);

        assert!(dev_rx.try_recv().is_err());
    }

    #[test]
    fn test_command_after_device_disconnect_is_refused() {
        // Arrange: a device that has come and gone
        let mut coord = BridgeCoordinator::new(DevicePolicy::Replace);
        let (client, mut client_rx) = make_client();
        let id = coord.on_client_connected(client);
        let (dev_id, mut dev_rx) = connect_device(&mut coord);
        coord.on_device_disconnected(dev_id);

        // Act
        let result = coord.on_client_message(id, r#"{"command":"start"}"#);

        // Assert: nothing reached the old writer queue
        assert!(matches!(
            result,
            Err(CommandError::Device(DeviceError::NotConnected))
        ));
        assert_eq!(parse(&client_rx.try_recv().unwrap())["code"], "device_not_connected");
        assert!(dev_rx.try_recv().is_err());
    }

    #[test]
    fn test_command_is_forwarded_as_json_line() {
        // Arrange
        let mut coord = BridgeCoordinator::new(DevicePolicy::Replace);
        let (client, mut client_rx) = make_client();
        let id = coord.on_client_connected(client);
        let (_dev_id, mut dev_rx) = connect_device(&mut coord);
        let text = r#"{"command":"setProduction","value":75,"timestamp":"2024-05-01T10:00:00Z"}"#;

        // Act
        coord.on_client_message(id, text).unwrap();

        // Assert: byte-for-byte JSON plus newline, no notice to the client
        let line = dev_rx.try_recv().unwrap();
        assert_eq!(line, format!("{text}\n").into_bytes());
        assert!(client_rx.try_recv().is_err());
    }

    #[test]
    fn test_invalid_client_json_notifies_sender() {
        let mut coord = BridgeCoordinator::new(DevicePolicy::Replace);
        let (client, mut rx) = make_client();
        let id = coord.on_client_connected(client);
        let (_dev_id, mut dev_rx) = connect_device(&mut coord);

        let result = coord.on_client_message(id, "{not json");

        assert!(matches!(result, Err(CommandError::InvalidJson(_))));
        assert_eq!(parse(&rx.try_recv().unwrap())["code"], "invalid_json");
        assert!(dev_rx.try_recv().is_err());
    }

    #[test]
    fn test_full_device_queue_reports_busy() {
        let mut coord = BridgeCoordinator::new(DevicePolicy::Replace);
        let (client, mut rx) = make_client();
        let id = coord.on_client_connected(client);
        let (_dev_id, _dev_rx) = connect_device(&mut coord);

        for _ in 0..8 {
            coord.on_client_message(id, r#"{"command":"ping"}"#).unwrap();
        }
        let result = coord.on_client_message(id, r#"{"command":"ping"}"#);

        assert!(matches!(result, Err(CommandError::Device(DeviceError::Busy))));
        assert_eq!(parse(&rx.try_recv().unwrap())["code"], "device_busy");
    }

    #[test]
    fn test_broadcast_prunes_closed_client_silently() {
        // Arrange: three clients, one with its writer gone
        let mut coord = BridgeCoordinator::new(DevicePolicy::Replace);
        let (a, mut ra) = make_client();
        let (b, mut rb) = make_client();
        let (c, rc) = make_client();
        coord.on_client_connected(a);
        coord.on_client_connected(b);
        coord.on_client_connected(c);
        drop(rc);
        let (dev_id, _dev_rx) = connect_device(&mut coord);

        // Act
        coord.on_device_data(dev_id, b"{\"water\":1}\n");

        // Assert
        assert_eq!(coord.client_count(), 2);
        assert!(ra.try_recv().is_ok());
        assert!(rb.try_recv().is_ok());
        assert!(ra.try_recv().is_err());
        assert!(rb.try_recv().is_err());
    }

    #[test]
    fn test_status_after_device_disconnect_keeps_last_snapshot() {
        // Arrange
        let mut coord = BridgeCoordinator::new(DevicePolicy::Replace);
        let (a, _ra) = make_client();
        let (b, _rb) = make_client();
        coord.on_client_connected(a);
        coord.on_client_connected(b);
        let (dev_id, _dev_rx) = connect_device(&mut coord);
        coord.on_device_data(dev_id, b"{\"water\":55.2}\n");

        // Act
        assert!(coord.on_device_disconnected(dev_id));
        let status = coord.status();

        // Assert
        assert_eq!(
            serde_json::to_value(&status).unwrap(),
            json!({"deviceConnected": false, "clientCount": 2, "snapshot": {"water": 55.2}})
        );
    }

    #[test]
    fn test_stale_device_disconnect_keeps_replacement_connected() {
        let mut coord = BridgeCoordinator::new(DevicePolicy::Replace);
        let (old_id, _old_rx) = connect_device(&mut coord);
        let (_new_id, _new_rx) = connect_device(&mut coord);

        assert!(!coord.on_device_disconnected(old_id));
        assert!(coord.device_connected());
    }

    #[test]
    fn test_reject_policy_refuses_second_device() {
        let mut coord = BridgeCoordinator::new(DevicePolicy::Reject);
        let (first_id, _rx) = connect_device(&mut coord);

        let second = make_device();
        let result = coord.on_device_connected(second.link);

        assert!(matches!(result, Err(DeviceError::AlreadyConnected { .. })));
        assert!(coord.device_connected());
        assert_eq!(coord.on_device_data(first_id, b"{\"ok\":1}\n"), 1);
    }

    #[test]
    fn test_client_disconnect_is_idempotent() {
        let mut coord = BridgeCoordinator::new(DevicePolicy::Replace);
        let (client, _rx) = make_client();
        let id = coord.on_client_connected(client);

        assert!(coord.on_client_disconnected(id));
        assert!(!coord.on_client_disconnected(id));
        assert_eq!(coord.client_count(), 0);
    }

    #[tokio::test]
    async fn test_shared_coordinator_locks() {
        let shared = BridgeCoordinator::new(DevicePolicy::Replace).shared();
        let (client, _rx) = make_client();
        shared.lock().await.on_client_connected(client);
        assert_eq!(shared.lock().await.status().client_count, 1);
    }
}
