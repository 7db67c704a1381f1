//! Application layer for electrolyzer-bridge.
//!
//! Owns the relay logic without touching sockets:
//!
//! - [`device_channel`]: the single controller connection and its framer
//! - [`client_registry`]: connected dashboard sessions and broadcast
//! - [`coordinator`]: the state machine tying both sides together
//!
//! Outbound traffic leaves this layer through bounded queues; the
//! infrastructure layer owns the tasks that drain them.

pub mod client_registry;
pub mod coordinator;
pub mod device_channel;

pub use client_registry::{BroadcastReport, ClientRegistry, ClientSession, DeliveryError, SessionId};
pub use coordinator::{BridgeCoordinator, CommandError, SharedCoordinator};
pub use device_channel::{ConnectOutcome, DeviceChannel, DeviceError, DeviceId, DeviceLink};
