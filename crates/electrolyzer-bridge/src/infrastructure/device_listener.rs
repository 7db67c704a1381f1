//! Raw TCP listener for the electrolyzer controller.
//!
//! Each accepted connection becomes one device session:
//!
//! ```text
//!            ┌─────────── reader ───────────┐
//! socket ──► │ read() → coordinator.on_device_data │ ◄── shutdown (replaced)
//!            └──────────────────────────────┘
//!            ┌─────────── writer ───────────┐
//! socket ◄── │ queue.recv() → write_all()   │ ◄── coordinator.send()
//!            └──────────────────────────────┘
//! ```
//!
//! TCP is a stream protocol, so reads arrive in arbitrary chunks; line
//! reassembly happens in the device channel's framer, not here.  The session
//! ends when the peer closes, a read or write fails, or the coordinator
//! signals that a newer device connection has replaced this one.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::application::{DeviceId, DeviceLink, SharedCoordinator};
use crate::domain::BridgeConfig;

/// Size of the temporary buffer for each `read()` call.
const READ_CHUNK: usize = 4096;

/// How long a finished session waits for its writer to flush queued lines.
const WRITER_GRACE: Duration = Duration::from_millis(500);

// ── Accept loop ───────────────────────────────────────────────────────────────

/// Accepts device connections until `running` is cleared.
///
/// # Errors
///
/// Currently never fails after binding; transient accept errors are logged
/// and the loop continues.
pub async fn accept_devices(
    listener: TcpListener,
    config: Arc<BridgeConfig>,
    coordinator: SharedCoordinator,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping device accept loop");
            break;
        }

        // Short timeout so the loop can observe `running` while idle.
        match timeout(Duration::from_millis(200), listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                debug!("device TCP connection from {peer_addr}");
                let cfg = Arc::clone(&config);
                let coord = Arc::clone(&coordinator);
                tokio::spawn(async move {
                    handle_device_session(stream, peer_addr, cfg, coord).await;
                });
            }
            Ok(Err(e)) => error!("device accept error: {e}"),
            Err(_) => {}
        }
    }

    Ok(())
}

// ── Per-session handler ───────────────────────────────────────────────────────

async fn handle_device_session(
    stream: TcpStream,
    peer_addr: SocketAddr,
    config: Arc<BridgeConfig>,
    coordinator: SharedCoordinator,
) {
    match run_device_session(stream, peer_addr, config, coordinator).await {
        Ok(()) => info!("device session {peer_addr} closed"),
        Err(e) => warn!("device session {peer_addr} closed with error: {e:#}"),
    }
}

/// Registers the connection with the coordinator and pumps bytes both ways
/// until either direction ends.
async fn run_device_session(
    stream: TcpStream,
    peer_addr: SocketAddr,
    config: Arc<BridgeConfig>,
    coordinator: SharedCoordinator,
) -> anyhow::Result<()> {
    // ── Step 1: Prepare the socket ───────────────────────────────────────────
    // Commands are small and latency sensitive.
    if let Err(e) = stream.set_nodelay(true) {
        debug!("device {peer_addr}: could not set TCP_NODELAY: {e}");
    }
    let (read_half, write_half) = stream.into_split();

    // ── Step 2: Build the link and register it ───────────────────────────────
    let (out_tx, out_rx) = mpsc::channel(config.device_queue_depth.max(1));
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let link = DeviceLink::new(peer_addr, out_tx, shutdown_tx, config.max_line_bytes);
    let device_id = link.id();

    if coordinator.lock().await.on_device_connected(link).is_err() {
        // Refused by policy; dropping the halves closes the socket.
        return Ok(());
    }

    // ── Step 3: Spawn the command writer ─────────────────────────────────────
    let mut writer = tokio::spawn(write_device_lines(write_half, out_rx, peer_addr));
    let mut writer_done = false;

    // ── Step 4: Read until the connection ends ───────────────────────────────
    // A dead writer means the socket is unusable, so it ends the session too.
    let outcome = tokio::select! {
        result = read_device_stream(read_half, device_id, peer_addr, &coordinator, shutdown_rx) => result,
        _ = &mut writer => {
            writer_done = true;
            Ok(())
        }
    };

    // ── Step 5: Tear down ────────────────────────────────────────────────────
    // Ignored by the coordinator if this link was already replaced.
    coordinator.lock().await.on_device_disconnected(device_id);

    // The link is gone, so the writer's queue is closed; let it drain.
    if !writer_done && timeout(WRITER_GRACE, &mut writer).await.is_err() {
        writer.abort();
    }

    outcome
}

/// Reads chunks and hands them to the coordinator in arrival order.
///
/// Returns `Ok(())` on EOF or when the coordinator closes this connection.
async fn read_device_stream(
    mut read_half: OwnedReadHalf,
    device_id: DeviceId,
    peer_addr: SocketAddr,
    coordinator: &SharedCoordinator,
    mut shutdown: oneshot::Receiver<()>,
) -> anyhow::Result<()> {
    let mut read_tmp = vec![0u8; READ_CHUNK];

    loop {
        tokio::select! {
            // Fires on an explicit close and when the link is dropped.
            _ = &mut shutdown => {
                info!("device {peer_addr}: connection closed by bridge");
                return Ok(());
            }
            read = read_half.read(&mut read_tmp) => {
                let n = read.with_context(|| format!("read from device {peer_addr} failed"))?;
                if n == 0 {
                    debug!("device {peer_addr}: connection closed (EOF)");
                    return Ok(());
                }
                let published = coordinator.lock().await.on_device_data(device_id, &read_tmp[..n]);
                debug!("device {peer_addr}: {n} bytes, {published} snapshot(s)");
            }
        }
    }
}

/// Writes queued command lines to the device until the queue closes.
async fn write_device_lines(
    mut write_half: OwnedWriteHalf,
    mut lines: mpsc::Receiver<Vec<u8>>,
    peer_addr: SocketAddr,
) {
    while let Some(line) = lines.recv().await {
        if let Err(e) = write_half.write_all(&line).await {
            warn!("write to device {peer_addr} failed: {e}");
            return;
        }
    }
    let _ = write_half.shutdown().await;
}

// ── Tests ─────────────────────────────────────────────────────────────────────
