//! Infrastructure layer for electrolyzer-bridge.
//!
//! Handles all I/O:
//!
//! - [`device_listener`]: raw TCP listener for the controller
//! - [`ws_server`]: WebSocket listener for dashboard clients
//! - [`status_http`]: `GET /status` and optional static assets
//! - [`config_file`]: the optional TOML configuration file
//!
//! Relay decisions live in the application layer; configuration merging
//! happens in `main.rs`.

pub mod config_file;
pub mod device_listener;
pub mod status_http;
pub mod ws_server;

use std::net::SocketAddr;
use std::sync::{atomic::AtomicBool, Arc};

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;

use crate::application::{BridgeCoordinator, SharedCoordinator};
use crate::domain::BridgeConfig;

/// The three bound listening sockets.
///
/// Binding is separated from serving so that a port conflict aborts startup
/// before any connection is accepted, and so that tests can bind port `0`
/// and read back the actual addresses.
#[derive(Debug)]
pub struct BridgeListeners {
    device: TcpListener,
    client: TcpListener,
    status: TcpListener,
    device_addr: SocketAddr,
    client_addr: SocketAddr,
    status_addr: SocketAddr,
}

impl BridgeListeners {
    /// Binds the device, client and status ports from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error naming the address if any port cannot be bound.
    pub async fn bind(config: &BridgeConfig) -> anyhow::Result<Self> {
        let (device, device_addr) = bind_one(config.device_bind_addr, "device").await?;
        let (client, client_addr) = bind_one(config.client_bind_addr, "WebSocket").await?;
        let (status, status_addr) = bind_one(config.status_bind_addr, "status HTTP").await?;

        Ok(Self {
            device,
            client,
            status,
            device_addr,
            client_addr,
            status_addr,
        })
    }

    pub fn device_addr(&self) -> SocketAddr {
        self.device_addr
    }

    pub fn client_addr(&self) -> SocketAddr {
        self.client_addr
    }

    pub fn status_addr(&self) -> SocketAddr {
        self.status_addr
    }
}

async fn bind_one(addr: SocketAddr, role: &str) -> anyhow::Result<(TcpListener, SocketAddr)> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {role} listener on {addr}"))?;
    let local = listener
        .local_addr()
        .with_context(|| format!("failed to read local address of {role} listener"))?;
    info!("{role} listener on {local}");
    Ok((listener, local))
}

/// Runs all three servers on already-bound listeners until `running` is
/// cleared.
///
/// # Errors
///
/// Returns the first server error.
pub async fn serve(
    listeners: BridgeListeners,
    config: BridgeConfig,
    coordinator: SharedCoordinator,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let config = Arc::new(config);

    tokio::try_join!(
        device_listener::accept_devices(
            listeners.device,
            Arc::clone(&config),
            Arc::clone(&coordinator),
            Arc::clone(&running),
        ),
        ws_server::accept_clients(
            listeners.client,
            Arc::clone(&config),
            Arc::clone(&coordinator),
            Arc::clone(&running),
        ),
        status_http::serve_status(listeners.status, config, coordinator, running),
    )?;

    Ok(())
}

/// Binds all listeners and runs the bridge with a fresh coordinator.
///
/// # Errors
///
/// Returns an error if binding fails or a server fails while running.
pub async fn run_bridge(config: BridgeConfig, running: Arc<AtomicBool>) -> anyhow::Result<()> {
    let listeners = BridgeListeners::bind(&config).await?;
    let coordinator = BridgeCoordinator::new(config.device_policy).shared();
    serve(listeners, config, coordinator, running).await
}

// ── Tests ─────────────────────────────────────────────────────────────────────
