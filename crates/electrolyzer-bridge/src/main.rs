//! Electrolyzer bridge: entry point.
//!
//! Accepts one controller connection over raw TCP and any number of browser
//! dashboards over WebSocket.  Every telemetry line from the controller is
//! broadcast to all dashboards; every dashboard message is forwarded to the
//! controller.
//!
//! # Usage
//!
//! ```text
//! electrolyzer-bridge [OPTIONS]
//!
//! Options:
//!   --bind <IP>               Address for all listeners [default: 0.0.0.0]
//!   --device-port <PORT>      Controller TCP port [default: 8080]
//!   --client-port <PORT>      Dashboard WebSocket port [default: 5000]
//!   --status-port <PORT>      HTTP status port [default: 5001]
//!   --device-policy <POLICY>  replace | reject [default: replace]
//!   --static-dir <DIR>        Serve this directory over HTTP
//!   --client-queue <N>        Per-client outbound queue depth [default: 32]
//!   --device-queue <N>        Device command queue depth [default: 64]
//!   --max-line-bytes <N>      Longest accepted device line [default: 65536]
//!   --config <FILE>           Optional TOML configuration file
//! ```
//!
//! # Precedence
//!
//! CLI flag, then environment variable, then config file, then built-in
//! default.
//!
//! | Variable                     | Flag               |
//! |------------------------------|--------------------|
//! | `ELECTROLYZER_BIND`          | `--bind`           |
//! | `ELECTROLYZER_DEVICE_PORT`   | `--device-port`    |
//! | `ELECTROLYZER_CLIENT_PORT`   | `--client-port`    |
//! | `ELECTROLYZER_STATUS_PORT`   | `--status-port`    |
//! | `ELECTROLYZER_DEVICE_POLICY` | `--device-policy`  |
//! | `ELECTROLYZER_STATIC_DIR`    | `--static-dir`     |
//! | `ELECTROLYZER_CLIENT_QUEUE`  | `--client-queue`   |
//! | `ELECTROLYZER_DEVICE_QUEUE`  | `--device-queue`   |
//! | `ELECTROLYZER_MAX_LINE`      | `--max-line-bytes` |
//! | `ELECTROLYZER_CONFIG`        | `--config`         |
//!
//! The log filter comes from `RUST_LOG`, else the file's `[logging] level`,
//! else `info`.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use electrolyzer_bridge::domain::config::{
    DEFAULT_CLIENT_PORT, DEFAULT_CLIENT_QUEUE_DEPTH, DEFAULT_DEVICE_PORT,
    DEFAULT_DEVICE_QUEUE_DEPTH, DEFAULT_STATUS_PORT,
};
use electrolyzer_bridge::domain::{BridgeConfig, DevicePolicy};
use electrolyzer_bridge::infrastructure::config_file::{load_config, FileConfig};
use electrolyzer_bridge::infrastructure::run_bridge;
use electrolyzer_core::DEFAULT_MAX_LINE_BYTES;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Relay between one electrolyzer controller and many browser dashboards.
///
/// Every option is optional so that an unset flag can fall through to the
/// config file.
#[derive(Debug, Default, Parser)]
#[command(
    name = "electrolyzer-bridge",
    about = "Relay between one electrolyzer controller (TCP) and many browser dashboards (WebSocket)",
    version
)]
struct Cli {
    /// IP address to bind all listeners to.
    #[arg(long, env = "ELECTROLYZER_BIND")]
    bind: Option<IpAddr>,

    /// TCP port the controller connects to.
    #[arg(long, env = "ELECTROLYZER_DEVICE_PORT")]
    device_port: Option<u16>,

    /// WebSocket port for dashboards.
    #[arg(long, env = "ELECTROLYZER_CLIENT_PORT")]
    client_port: Option<u16>,

    /// HTTP port for `GET /status`.
    #[arg(long, env = "ELECTROLYZER_STATUS_PORT")]
    status_port: Option<u16>,

    /// What to do when a second controller connects: `replace` or `reject`.
    #[arg(long, env = "ELECTROLYZER_DEVICE_POLICY")]
    device_policy: Option<DevicePolicy>,

    /// Directory of dashboard assets served on the status port.
    #[arg(long, env = "ELECTROLYZER_STATIC_DIR")]
    static_dir: Option<PathBuf>,

    /// Payloads buffered per dashboard before it starts missing updates.
    #[arg(long, env = "ELECTROLYZER_CLIENT_QUEUE")]
    client_queue: Option<usize>,

    /// Commands buffered for the controller before forwards are refused.
    #[arg(long, env = "ELECTROLYZER_DEVICE_QUEUE")]
    device_queue: Option<usize>,

    /// Longest controller line accepted, in bytes.
    #[arg(long, env = "ELECTROLYZER_MAX_LINE")]
    max_line_bytes: Option<usize>,

    /// Optional TOML configuration file.
    #[arg(long, env = "ELECTROLYZER_CONFIG")]
    config: Option<PathBuf>,
}

impl Cli {
    /// Merges the CLI arguments over `file` into a [`BridgeConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown device policy in the file or a zero
    /// queue depth or line limit.
    fn into_bridge_config(self, file: &FileConfig) -> anyhow::Result<BridgeConfig> {
        let bind = self
            .bind
            .or(file.network.bind)
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

        let device_port = self
            .device_port
            .or(file.network.device_port)
            .unwrap_or(DEFAULT_DEVICE_PORT);
        let client_port = self
            .client_port
            .or(file.network.client_port)
            .unwrap_or(DEFAULT_CLIENT_PORT);
        let status_port = self
            .status_port
            .or(file.network.status_port)
            .unwrap_or(DEFAULT_STATUS_PORT);

        let device_policy = match (self.device_policy, file.device.policy.as_deref()) {
            (Some(policy), _) => policy,
            (None, Some(name)) => name
                .parse()
                .context("invalid [device] policy in config file")?,
            (None, None) => DevicePolicy::default(),
        };

        let client_queue_depth = positive(
            "client queue depth",
            self.client_queue
                .or(file.clients.queue_depth)
                .unwrap_or(DEFAULT_CLIENT_QUEUE_DEPTH),
        )?;
        let device_queue_depth = positive(
            "device queue depth",
            self.device_queue
                .or(file.device.queue_depth)
                .unwrap_or(DEFAULT_DEVICE_QUEUE_DEPTH),
        )?;
        let max_line_bytes = positive(
            "max line bytes",
            self.max_line_bytes
                .or(file.device.max_line_bytes)
                .unwrap_or(DEFAULT_MAX_LINE_BYTES),
        )?;

        Ok(BridgeConfig {
            device_bind_addr: SocketAddr::new(bind, device_port),
            client_bind_addr: SocketAddr::new(bind, client_port),
            status_bind_addr: SocketAddr::new(bind, status_port),
            device_policy,
            static_dir: self.static_dir.or_else(|| file.network.static_dir.clone()),
            client_queue_depth,
            device_queue_depth,
            max_line_bytes,
        })
    }
}

fn positive(name: &str, value: usize) -> anyhow::Result<usize> {
    if value == 0 {
        anyhow::bail!("{name} must be at least 1");
    }
    Ok(value)
}

/// `RUST_LOG` wins; otherwise the file's level; otherwise `info`.
fn build_env_filter(file_level: Option<&str>) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(file_level.unwrap_or("info")))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let file = match &cli.config {
        Some(path) => load_config(path)
            .with_context(|| format!("failed to load config file {}", path.display()))?,
        None => FileConfig::default(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(build_env_filter(file.logging.level.as_deref()))
        .init();

    let config = cli.into_bridge_config(&file)?;

    info!(
        "electrolyzer bridge starting: device={}, clients={}, status={}, policy={}",
        config.device_bind_addr,
        config.client_bind_addr,
        config.status_bind_addr,
        config.device_policy
    );

    // ── Graceful shutdown flag ────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; initiating graceful shutdown");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    run_bridge(config, running).await?;

    info!("electrolyzer bridge stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use electrolyzer_bridge::infrastructure::config_file::parse_config;

    #[test]
    fn test_cli_defaults_produce_default_ports() {
        // Arrange: no flags, no file
        let cli = Cli::default();

        // Act
        let config = cli.into_bridge_config(&FileConfig::default()).unwrap();

        // Assert
        assert_eq!(config.device_bind_addr.port(), 8080);
        assert_eq!(config.client_bind_addr.port(), 5000);
        assert_eq!(config.status_bind_addr.port(), 5001);
        assert!(config.device_bind_addr.ip().is_unspecified());
    }

    #[test]
    fn test_cli_defaults_produce_default_limits() {
        let config = Cli::default()
            .into_bridge_config(&FileConfig::default())
            .unwrap();
        assert_eq!(config.device_policy, DevicePolicy::Replace);
        assert_eq!(config.client_queue_depth, 32);
        assert_eq!(config.device_queue_depth, 64);
        assert_eq!(config.max_line_bytes, 65536);
        assert!(config.static_dir.is_none());
    }

    #[test]
    fn test_cli_port_overrides() {
        let cli = Cli::parse_from([
            "electrolyzer-bridge",
            "--device-port",
            "9000",
            "--client-port",
            "9001",
            "--status-port",
            "9002",
        ]);
        assert_eq!(cli.device_port, Some(9000));
        assert_eq!(cli.client_port, Some(9001));
        assert_eq!(cli.status_port, Some(9002));
    }

    #[test]
    fn test_cli_bind_override_applies_to_all_listeners() {
        let cli = Cli::parse_from(["electrolyzer-bridge", "--bind", "127.0.0.1"]);
        let config = cli.into_bridge_config(&FileConfig::default()).unwrap();
        assert_eq!(config.device_bind_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(config.client_bind_addr.to_string(), "127.0.0.1:5000");
        assert_eq!(config.status_bind_addr.to_string(), "127.0.0.1:5001");
    }

    #[test]
    fn test_cli_rejects_invalid_bind() {
        let result = Cli::try_parse_from(["electrolyzer-bridge", "--bind", "not.an.ip"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_parses_device_policy() {
        let cli = Cli::parse_from(["electrolyzer-bridge", "--device-policy", "reject"]);
        assert_eq!(cli.device_policy, Some(DevicePolicy::Reject));
    }

    #[test]
    fn test_cli_rejects_unknown_device_policy() {
        let result = Cli::try_parse_from(["electrolyzer-bridge", "--device-policy", "drop"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_file_values_apply_when_flags_absent() {
        // Arrange
        let file = parse_config(
            r#"
[network]
device_port = 7000
static_dir = "public"

[device]
policy = "reject"

[clients]
queue_depth = 4
"#,
        )
        .unwrap();

        // Act
        let config = Cli::default().into_bridge_config(&file).unwrap();

        // Assert
        assert_eq!(config.device_bind_addr.port(), 7000);
        assert_eq!(config.client_bind_addr.port(), 5000);
        assert_eq!(config.device_policy, DevicePolicy::Reject);
        assert_eq!(config.client_queue_depth, 4);
        assert_eq!(config.static_dir, Some(PathBuf::from("public")));
    }

    #[test]
    fn test_flags_override_file_values() {
        let file = parse_config("[network]\ndevice_port = 7000\n[device]\npolicy = \"reject\"\n")
            .unwrap();
        let cli = Cli {
            device_port: Some(7100),
            device_policy: Some(DevicePolicy::Replace),
            ..Cli::default()
        };

        let config = cli.into_bridge_config(&file).unwrap();

        assert_eq!(config.device_bind_addr.port(), 7100);
        assert_eq!(config.device_policy, DevicePolicy::Replace);
    }

    #[test]
    fn test_invalid_policy_in_file_returns_error() {
        let file = parse_config("[device]\npolicy = \"sometimes\"\n").unwrap();
        let result = Cli::default().into_bridge_config(&file);
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_queue_depth_returns_error() {
        let cli = Cli {
            client_queue: Some(0),
            ..Cli::default()
        };
        let result = cli.into_bridge_config(&FileConfig::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_line_limit_in_file_returns_error() {
        let file = parse_config("[device]\nmax_line_bytes = 0\n").unwrap();
        assert!(Cli::default().into_bridge_config(&file).is_err());
    }
}
