//! Protocol module containing the line framer, the JSON line codec, and the
//! message types.

pub mod codec;
pub mod framer;
pub mod messages;

pub use codec::{
    decode_command, decode_device_line, encode_command_line, encode_snapshot, ProtocolError,
};
pub use framer::{FrameError, LineFramer};
pub use messages::*;
