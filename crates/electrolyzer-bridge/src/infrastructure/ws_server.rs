//! WebSocket server for dashboard clients.
//!
//! Each accepted TCP connection is upgraded to a WebSocket session and
//! registered with the coordinator.  A session runs two tasks:
//!
//! - **Writer**: drains the session's outbound queue (snapshots and notices)
//!   into text frames.
//! - **Reader**: hands every inbound text frame to
//!   [`BridgeCoordinator::on_client_message`].
//!
//! The session ends when either task finishes.  The client is then removed
//! from the registry, which closes its queue and lets the writer send a
//! Close frame.
//!
//! [`BridgeCoordinator::on_client_message`]: crate::application::BridgeCoordinator::on_client_message

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, Stream, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{
    accept_async,
    tungstenite::{Error as WsError, Message as WsMessage},
};
use tracing::{debug, error, info, warn};

use crate::application::{ClientSession, SessionId, SharedCoordinator};
use crate::domain::{BridgeConfig, ClientNotice, NoticeCode};

/// How long a finished session waits for its writer to send the Close frame.
const WRITER_GRACE: Duration = Duration::from_millis(500);

// ── Accept loop ───────────────────────────────────────────────────────────────

/// Accepts browser connections until `running` is cleared.
///
/// Each connection is handed to its own task so that one slow handshake
/// never blocks others.
pub async fn accept_clients(
    listener: TcpListener,
    config: Arc<BridgeConfig>,
    coordinator: SharedCoordinator,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping client accept loop");
            break;
        }

        match timeout(Duration::from_millis(200), listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                debug!("browser TCP connection from {peer_addr}");
                let cfg = Arc::clone(&config);
                let coord = Arc::clone(&coordinator);
                tokio::spawn(async move {
                    handle_client_session(stream, peer_addr, cfg, coord).await;
                });
            }
            Ok(Err(e)) => error!("client accept error: {e}"),
            Err(_) => {}
        }
    }

    Ok(())
}

// ── Per-session handler ───────────────────────────────────────────────────────

async fn handle_client_session(
    raw_stream: TcpStream,
    peer_addr: SocketAddr,
    config: Arc<BridgeConfig>,
    coordinator: SharedCoordinator,
) {
    match run_client_session(raw_stream, peer_addr, config, coordinator).await {
        Ok(()) => info!("client session {peer_addr} closed normally"),
        Err(e) => warn!("client session {peer_addr} closed with error: {e:#}"),
    }
}

/// Runs the complete lifecycle of a single browser session.
///
/// # Errors
///
/// Returns an error if the WebSocket handshake fails or the socket reports
/// an unexpected transport error.
async fn run_client_session(
    raw_stream: TcpStream,
    peer_addr: SocketAddr,
    config: Arc<BridgeConfig>,
    coordinator: SharedCoordinator,
) -> anyhow::Result<()> {
    // ── Step 1: Complete the WebSocket handshake ─────────────────────────────
    let ws_stream = accept_async(raw_stream)
        .await
        .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;
    let (mut ws_tx, ws_rx) = ws_stream.split();

    // ── Step 2: Register the session ─────────────────────────────────────────
    // Registration also queues the latest snapshot, if any.
    let (out_tx, mut out_rx) = mpsc::channel::<String>(config.client_queue_depth.max(1));
    let session_id = coordinator
        .lock()
        .await
        .on_client_connected(ClientSession::new(peer_addr, out_tx));

    // ── Step 3: Spawn the writer ─────────────────────────────────────────────
    // Drains the session queue into the socket; closes it when the queue ends.
    let mut writer = tokio::spawn(async move {
        while let Some(payload) = out_rx.recv().await {
            if ws_tx.send(WsMessage::Text(payload)).await.is_err() {
                debug!("client {peer_addr}: WebSocket send failed (browser disconnected)");
                return;
            }
        }
        let _ = ws_tx.close().await;
    });
    let mut writer_done = false;

    // ── Step 4: Read until either side goes away ─────────────────────────────
    let outcome = tokio::select! {
        result = read_client_messages(ws_rx, session_id, peer_addr, &coordinator) => result,
        _ = &mut writer => {
            writer_done = true;
            Ok(())
        }
    };

    // ── Step 5: Tear down ────────────────────────────────────────────────────
    // Removal drops the queue sender, which lets the writer finish.
    coordinator.lock().await.on_client_disconnected(session_id);

    if !writer_done && timeout(WRITER_GRACE, &mut writer).await.is_err() {
        writer.abort();
    }

    outcome
}

/// Forwards inbound frames to the coordinator until the browser goes away.
async fn read_client_messages<S>(
    mut ws_rx: S,
    session_id: SessionId,
    peer_addr: SocketAddr,
    coordinator: &SharedCoordinator,
) -> anyhow::Result<()>
where
    S: Stream<Item = Result<WsMessage, WsError>> + Unpin,
{
    while let Some(frame) = ws_rx.next().await {
        let ws_msg = match frame {
            Ok(msg) => msg,
            Err(WsError::ConnectionClosed | WsError::Protocol(_)) => {
                debug!("client {peer_addr}: WebSocket closed");
                return Ok(());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("WebSocket error from {peer_addr}"));
            }
        };

        let text = match ws_msg {
            WsMessage::Text(text) => text,
            WsMessage::Binary(bytes) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(_) => {
                    warn!("client {peer_addr}: binary frame is not UTF-8");
                    coordinator
                        .lock()
                        .await
                        .notify_client(session_id, &ClientNotice::error(NoticeCode::InvalidJson));
                    continue;
                }
            },
            WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => continue,
            WsMessage::Close(_) => {
                debug!("client {peer_addr}: Close frame received");
                return Ok(());
            }
        };

        if let Err(e) = coordinator.lock().await.on_client_message(session_id, &text) {
            warn!("client {peer_addr}: command not forwarded: {e}");
        }
    }

    debug!("client {peer_addr}: stream ended");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
