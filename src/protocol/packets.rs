//! Convoy packets
//!
//! Two fixed-layout packets travel over the peer radio:
//!
//! ```text
//! MotionCommand (leader -> broadcast), 14 bytes
//!   0..4   L_duty     f32 LE, -1.0..=1.0
//!   4..8   R_duty     f32 LE, -1.0..=1.0
//!   8..12  timestamp  u32 LE, sender uptime in ms
//!   12     group_id   u8
//!   13     checksum   u8, XOR of bytes 0..13
//!
//! FollowerHeartbeat (follower -> leader), 13 bytes
//!   0..6   follower_mac
//!   6      group_id   u8
//!   7..11  timestamp  u32 LE
//!   11     battery    u8, 0..=100
//!   12     checksum   u8, XOR of bytes 0..12
//! ```
//!
//! Receivers tell the two apart purely by payload length, so the sizes must
//! never be equal. There is no type tag on the wire.

use super::checksum;

/// Encoded size of a [`MotionCommand`]
pub const MOTION_COMMAND_LEN: usize = 14;

/// Encoded size of a [`FollowerHeartbeat`]
pub const FOLLOWER_HEARTBEAT_LEN: usize = 13;

const _: () = assert!(
    MOTION_COMMAND_LEN != FOLLOWER_HEARTBEAT_LEN,
    "convoy packets are dispatched by length and must differ in size"
);

/// 6-byte hardware address of a radio peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    /// Broadcast address, used by the leader for motion commands
    pub const BROADCAST: Self = Self([0xFF; 6]);

    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }
}

#[cfg(target_os = "none")]
impl defmt::Format for MacAddress {
    fn format(&self, f: defmt::Formatter) {
        let m = self.0;
        defmt::write!(
            f,
            "{=u8:02X}:{=u8:02X}:{=u8:02X}:{=u8:02X}:{=u8:02X}:{=u8:02X}",
            m[0],
            m[1],
            m[2],
            m[3],
            m[4],
            m[5]
        );
    }
}

/// Why a received payload was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum DecodeError {
    /// Payload size does not match the packet layout
    Length { expected: usize, actual: usize },
    /// Trailing checksum byte does not match the payload
    Checksum,
}

/// Packet kind, derived from the payload length alone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum PacketKind {
    Motion,
    Heartbeat,
}

impl PacketKind {
    /// Classifies a payload by its exact length; anything else is not a convoy packet
    pub fn from_len(len: usize) -> Option<Self> {
        match len {
            MOTION_COMMAND_LEN => Some(Self::Motion),
            FOLLOWER_HEARTBEAT_LEN => Some(Self::Heartbeat),
            _ => None,
        }
    }
}

/// Motor duty command broadcast by the leader every control tick
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub struct MotionCommand {
    pub left_duty: f32,
    pub right_duty: f32,
    pub timestamp: u32,
    pub group_id: u8,
}

impl MotionCommand {
    pub fn encode(&self) -> [u8; MOTION_COMMAND_LEN] {
        let mut buf = [0u8; MOTION_COMMAND_LEN];
        buf[0..4].copy_from_slice(&self.left_duty.to_le_bytes());
        buf[4..8].copy_from_slice(&self.right_duty.to_le_bytes());
        buf[8..12].copy_from_slice(&self.timestamp.to_le_bytes());
        buf[12] = self.group_id;
        checksum::seal(&mut buf);
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        check_layout(bytes, MOTION_COMMAND_LEN)?;
        Ok(Self {
            left_duty: f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            right_duty: f32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            timestamp: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
            group_id: bytes[12],
        })
    }
}

/// Liveness report sent by each follower to its leader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub struct FollowerHeartbeat {
    pub follower_mac: MacAddress,
    pub group_id: u8,
    pub timestamp: u32,
    pub battery_level: u8,
}

impl FollowerHeartbeat {
    pub fn encode(&self) -> [u8; FOLLOWER_HEARTBEAT_LEN] {
        let mut buf = [0u8; FOLLOWER_HEARTBEAT_LEN];
        buf[0..6].copy_from_slice(&self.follower_mac.octets());
        buf[6] = self.group_id;
        buf[7..11].copy_from_slice(&self.timestamp.to_le_bytes());
        buf[11] = self.battery_level;
        checksum::seal(&mut buf);
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        check_layout(bytes, FOLLOWER_HEARTBEAT_LEN)?;
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&bytes[0..6]);
        Ok(Self {
            follower_mac: MacAddress(mac),
            group_id: bytes[6],
            timestamp: u32::from_le_bytes([bytes[7], bytes[8], bytes[9], bytes[10]]),
            battery_level: bytes[11],
        })
    }
}

fn check_layout(bytes: &[u8], expected: usize) -> Result<(), DecodeError> {
    if bytes.len() != expected {
        return Err(DecodeError::Length {
            expected,
            actual: bytes.len(),
        });
    }
    if !checksum::verify(bytes) {
        return Err(DecodeError::Checksum);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_command() -> MotionCommand {
        MotionCommand {
            left_duty: 0.5,
            right_duty: -0.5,
            timestamp: 0x0102_0304,
            group_id: 3,
        }
    }

    #[test]
    fn packet_sizes_stay_distinct() {
        assert_ne!(MOTION_COMMAND_LEN, FOLLOWER_HEARTBEAT_LEN);
        assert_eq!(PacketKind::from_len(MOTION_COMMAND_LEN), Some(PacketKind::Motion));
        assert_eq!(PacketKind::from_len(FOLLOWER_HEARTBEAT_LEN), Some(PacketKind::Heartbeat));
        assert_eq!(PacketKind::from_len(12), None);
        assert_eq!(PacketKind::from_len(0), None);
    }

    #[test]
    fn motion_command_layout_is_little_endian_and_packed() {
        let bytes = sample_command().encode();
        assert_eq!(&bytes[0..4], &0.5f32.to_le_bytes());
        assert_eq!(&bytes[4..8], &(-0.5f32).to_le_bytes());
        assert_eq!(&bytes[8..12], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(bytes[12], 3);
        assert_eq!(bytes[13], checksum::xor_fold(&bytes[..13]));
        assert_eq!(MotionCommand::decode(&bytes), Ok(sample_command()));
    }

    #[test]
    fn corrupted_motion_command_is_rejected() {
        let bytes = sample_command().encode();
        for byte in 0..MOTION_COMMAND_LEN - 1 {
            for bit in 0..8 {
                let mut corrupted = bytes;
                corrupted[byte] ^= 1 << bit;
                assert_eq!(MotionCommand::decode(&corrupted), Err(DecodeError::Checksum));
            }
        }
    }

    #[test]
    fn heartbeat_layout() {
        let heartbeat = FollowerHeartbeat {
            follower_mac: MacAddress::new([0x24, 0x6F, 0x28, 0xAA, 0xBB, 0xCC]),
            group_id: 7,
            timestamp: 1000,
            battery_level: 0,
        };
        let bytes = heartbeat.encode();
        assert_eq!(&bytes[0..6], &[0x24, 0x6F, 0x28, 0xAA, 0xBB, 0xCC]);
        assert_eq!(bytes[6], 7);
        assert_eq!(&bytes[7..11], &1000u32.to_le_bytes());
        assert_eq!(FollowerHeartbeat::decode(&bytes), Ok(heartbeat));
    }

    #[test]
    fn wrong_length_is_reported() {
        let bytes = sample_command().encode();
        assert_eq!(
            FollowerHeartbeat::decode(&bytes),
            Err(DecodeError::Length {
                expected: FOLLOWER_HEARTBEAT_LEN,
                actual: MOTION_COMMAND_LEN
            })
        );
    }
}
