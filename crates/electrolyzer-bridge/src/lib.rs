//! electrolyzer-bridge library crate.
//!
//! Relays telemetry from one electrolyzer controller to many browser
//! dashboards, and dashboard commands back to the controller.
//!
//! # Architecture
//!
//! ```text
//! Controller (JSON lines over TCP :8080)
//!         ↕
//! [electrolyzer-bridge]
//!   ├── domain/           BridgeConfig, DevicePolicy, ClientNotice, StatusReport
//!   ├── application/      DeviceChannel, ClientRegistry, BridgeCoordinator
//!   └── infrastructure/
//!         ├── device_listener/  TCP accept loop, per-device reader/writer
//!         ├── ws_server/        WebSocket accept loop (tokio-tungstenite)
//!         ├── status_http/      GET /status (axum)
//!         └── config_file/      optional TOML file
//!         ↕
//! Browsers (JSON over WebSocket :5000, GET /status on :5001)
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` depends on `domain` and `electrolyzer-core`; it queues
//!   outbound traffic but never touches a socket.
//! - `infrastructure` owns sockets, tasks and the HTTP server.

/// Domain layer: configuration and the bridge's own payload types.
pub mod domain;

/// Application layer: relay state machine.
pub mod application;

/// Infrastructure layer: listeners, sessions and config file.
pub mod infrastructure;
