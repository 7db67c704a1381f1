//! Bridge configuration types.
//!
//! [`BridgeConfig`] is the single source of truth for all runtime settings.
//! It is assembled in `main.rs` from CLI arguments, environment variables and
//! an optional TOML file, or taken from [`BridgeConfig::default`] in tests.
//!
//! The domain layer never reads the environment or the filesystem itself;
//! the struct is plain data.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use electrolyzer_core::DEFAULT_MAX_LINE_BYTES;

/// Default TCP port the controller connects to.
pub const DEFAULT_DEVICE_PORT: u16 = 8080;
/// Default WebSocket port for dashboard clients.
pub const DEFAULT_CLIENT_PORT: u16 = 5000;
/// Default HTTP port for `GET /status` and static assets.
pub const DEFAULT_STATUS_PORT: u16 = 5001;
/// Default per-client outbound queue depth (payloads).
pub const DEFAULT_CLIENT_QUEUE_DEPTH: usize = 32;
/// Default device outbound queue depth (command lines).
pub const DEFAULT_DEVICE_QUEUE_DEPTH: usize = 64;

// ── DevicePolicy ──────────────────────────────────────────────────────────────

/// What to do when a second device connects while one is already live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DevicePolicy {
    /// Force-close the current connection and adopt the new one.
    ///
    /// Suits controllers that reconnect after a Wi-Fi drop before the old
    /// socket has timed out on the bridge side.
    #[default]
    Replace,
    /// Refuse the new connection and keep the current one.
    Reject,
}

/// Error returned when a string names no [`DevicePolicy`].
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown device policy '{0}' (expected 'replace' or 'reject')")]
pub struct ParsePolicyError(pub String);

impl FromStr for DevicePolicy {
    type Err = ParsePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "replace" => Ok(Self::Replace),
            "reject" => Ok(Self::Reject),
            _ => Err(ParsePolicyError(s.to_string())),
        }
    }
}

impl fmt::Display for DevicePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Replace => "replace",
            Self::Reject => "reject",
        })
    }
}

// ── BridgeConfig ──────────────────────────────────────────────────────────────

/// All runtime configuration for the bridge.
///
/// Build this struct once at startup and wrap it in an `Arc` so it can be
/// shared cheaply across all connection tasks.
///
/// # Example
///
/// ```rust
/// use electrolyzer_bridge::domain::BridgeConfig;
///
/// let cfg = BridgeConfig::default();
/// assert_eq!(cfg.device_bind_addr.port(), 8080);
/// assert_eq!(cfg.client_bind_addr.port(), 5000);
/// ```
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Raw TCP listener for the controller.
    pub device_bind_addr: SocketAddr,

    /// WebSocket listener for dashboard clients.
    pub client_bind_addr: SocketAddr,

    /// HTTP listener for `GET /status` (and static assets, if configured).
    pub status_bind_addr: SocketAddr,

    /// Handling of a second concurrent device connection.
    pub device_policy: DevicePolicy,

    /// Directory served as-is by the HTTP listener for paths other than
    /// `/status`.  `None` disables static serving.
    pub static_dir: Option<PathBuf>,

    /// Payloads buffered per client before that client starts missing
    /// broadcasts.
    pub client_queue_depth: usize,

    /// Command lines buffered for the device before forwards are refused.
    pub device_queue_depth: usize,

    /// Longest device line accepted, in bytes.
    pub max_line_bytes: usize,
}

impl Default for BridgeConfig {
    /// | Field              | Default          |
    /// |--------------------|------------------|
    /// | device_bind_addr   | `0.0.0.0:8080`   |
    /// | client_bind_addr   | `0.0.0.0:5000`   |
    /// | status_bind_addr   | `0.0.0.0:5001`   |
    /// | device_policy      | `replace`        |
    /// | static_dir         | none             |
    /// | client_queue_depth | 32               |
    /// | device_queue_depth | 64               |
    /// | max_line_bytes     | 65536            |
    fn default() -> Self {
        let any = Ipv4Addr::UNSPECIFIED;
        Self {
            device_bind_addr: SocketAddr::from((any, DEFAULT_DEVICE_PORT)),
            client_bind_addr: SocketAddr::from((any, DEFAULT_CLIENT_PORT)),
            status_bind_addr: SocketAddr::from((any, DEFAULT_STATUS_PORT)),
            device_policy: DevicePolicy::default(),
            static_dir: None,
            client_queue_depth: DEFAULT_CLIENT_QUEUE_DEPTH,
            device_queue_depth: DEFAULT_DEVICE_QUEUE_DEPTH,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
