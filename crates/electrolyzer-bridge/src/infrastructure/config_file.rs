//! Optional TOML configuration file.
//!
//! Every field is optional.  A value present here overrides the built-in
//! default but is itself overridden by an environment variable or a CLI
//! flag (the merge happens in `main.rs`).
//!
//! ```toml
//! [network]
//! bind = "0.0.0.0"
//! device_port = 8080
//! client_port = 5000
//! status_port = 5001
//! static_dir = "public"
//!
//! [device]
//! policy = "replace"
//! queue_depth = 64
//! max_line_bytes = 65536
//!
//! [clients]
//! queue_depth = 32
//!
//! [logging]
//! level = "info"
//! ```
//!
//! Unknown keys are rejected so that a typo does not silently fall back to a
//! default.

use std::net::IpAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level file layout.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub network: NetworkSection,
    pub device: DeviceSection,
    pub clients: ClientsSection,
    pub logging: LoggingSection,
}

/// Listener addresses and the static asset directory.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkSection {
    pub bind: Option<IpAddr>,
    pub device_port: Option<u16>,
    pub client_port: Option<u16>,
    pub status_port: Option<u16>,
    pub static_dir: Option<PathBuf>,
}

/// Device connection handling.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DeviceSection {
    /// `"replace"` or `"reject"`; parsed when the config is resolved.
    pub policy: Option<String>,
    pub queue_depth: Option<usize>,
    pub max_line_bytes: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ClientsSection {
    pub queue_depth: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSection {
    /// `tracing` filter directive, e.g. `"info"` or `"electrolyzer_bridge=debug"`.
    pub level: Option<String>,
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Parses TOML text into a [`FileConfig`].
///
/// # Errors
///
/// [`ConfigError::Parse`] for malformed TOML, wrong value types or unknown
/// keys.
pub fn parse_config(content: &str) -> Result<FileConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Reads and parses the file at `path`.
///
/// Unlike a settings store, an explicitly named file that does not exist is
/// an error.
///
/// # Errors
///
/// [`ConfigError::Io`] when the file cannot be read, [`ConfigError::Parse`]
/// when its content is invalid.
pub fn load_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
