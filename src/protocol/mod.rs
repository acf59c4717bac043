//! Wire formats
//!
//! - [`checksum`]: XOR fold shared by every fixed-layout structure
//! - [`packets`]: the two convoy packets exchanged over the peer radio
//! - [`link_frame`]: framing on the UART to the radio/UI co-processor

pub mod checksum;
pub mod link_frame;
pub mod packets;

pub use packets::{DecodeError, FollowerHeartbeat, MacAddress, MotionCommand, PacketKind};
