//! Convoy group configuration
//!
//! Persisted in flash and loaded at boot. A missing or unreadable record falls
//! back to [`GroupConfig::standalone`].

use crate::protocol::MacAddress;

/// Convoy role of this robot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
#[repr(u8)]
pub enum Role {
    /// Balances on its own, radio unused
    Standalone = 0,
    /// Driven directly by the joystick, broadcasts its duty to the group
    Leader = 1,
    /// Replays the duty received from its leader
    Follower = 2,
}

impl Role {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Standalone),
            1 => Some(Self::Leader),
            2 => Some(Self::Follower),
            _ => None,
        }
    }
}

/// Role, group and radio settings
///
/// `leader_mac` only means something for [`Role::Follower`]. The radio is never
/// enabled for [`Role::Standalone`]; the constructors enforce that.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub struct GroupConfig {
    pub role: Role,
    pub leader_mac: MacAddress,
    pub group_id: u8,
    pub espnow_enabled: bool,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self::standalone()
    }
}

impl GroupConfig {
    /// Size of the flash record
    pub const STORED_LEN: usize = 9;

    pub const fn standalone() -> Self {
        Self {
            role: Role::Standalone,
            leader_mac: MacAddress::BROADCAST,
            group_id: 0,
            espnow_enabled: false,
        }
    }

    pub fn new(role: Role, leader_mac: MacAddress, group_id: u8, espnow_enabled: bool) -> Self {
        Self {
            role,
            leader_mac,
            group_id,
            espnow_enabled: espnow_enabled && role != Role::Standalone,
        }
    }

    /// Switches role, keeping group and radio settings
    ///
    /// The leader address is only replaced when one is given.
    pub fn with_role(self, role: Role, leader_mac: Option<MacAddress>) -> Self {
        Self::new(
            role,
            leader_mac.unwrap_or(self.leader_mac),
            self.group_id,
            self.espnow_enabled,
        )
    }

    /// Whether this configuration asks for the convoy radio at all
    pub fn link_requested(&self) -> bool {
        self.espnow_enabled && self.role != Role::Standalone
    }

    pub fn to_bytes(&self) -> [u8; Self::STORED_LEN] {
        let mut buf = [0u8; Self::STORED_LEN];
        buf[0] = self.role as u8;
        buf[1..7].copy_from_slice(&self.leader_mac.octets());
        buf[7] = self.group_id;
        buf[8] = self.espnow_enabled as u8;
        buf
    }

    /// Decodes a flash record; an unknown role byte rejects the whole record
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::STORED_LEN {
            return None;
        }
        let role = Role::from_u8(bytes[0])?;
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&bytes[1..7]);
        Some(Self::new(role, MacAddress(mac), bytes[7], bytes[8] != 0))
    }
}
