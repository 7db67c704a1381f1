//! Domain layer for electrolyzer-bridge.
//!
//! Pure types with no dependencies on I/O, networking, or async runtimes.
//!
//! - Configuration structures and the device conflict policy
//! - The bridge's own JSON payloads (client notices, status report)

pub mod config;
pub mod messages;

// Re-export so callers can write `domain::BridgeConfig`.
pub use config::{BridgeConfig, DevicePolicy, ParsePolicyError};
pub use messages::{ClientNotice, NoticeCode, StatusReport};
