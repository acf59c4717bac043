//! Convoy link
//!
//! Sends and receives the two convoy packets and keeps track of who is alive.
//!
//! # Contexts
//!
//! The link is shared between the control task, which sends commands and
//! heartbeats every tick, and the radio receive task, which feeds incoming
//! datagrams into [`ConvoyLink::on_packet_received`]. Everything the receive
//! path writes (received duty, last command time, follower registry) sits
//! behind one critical-section mutex that is only held for a few field copies.
//!
//! # Timing
//!
//! All timestamps are `u32` milliseconds of uptime and wrap after ~49 days.
//! Elapsed times are computed with wrapping subtraction, never by comparing
//! timestamps directly.

use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::{raw::CriticalSectionRawMutex, Mutex};
use heapless::Vec;

use super::config::{GroupConfig, Role};
use super::radio::ConvoyRadio;
use crate::protocol::packets::{FollowerHeartbeat, MacAddress, MotionCommand, PacketKind};
use crate::protocol::DecodeError;
use crate::state::MotorDuty;

/// A follower stops when no valid command arrived for this long (ms)
pub const COMMAND_TIMEOUT_MS: u32 = 500;

/// Minimum spacing between two follower heartbeats (ms)
pub const HEARTBEAT_INTERVAL_MS: u32 = 1000;

/// A follower without heartbeat for this long is shown offline (ms)
pub const FOLLOWER_OFFLINE_TIMEOUT_MS: u32 = 3000;

/// Capacity of the leader's follower registry
pub const MAX_FOLLOWERS: usize = 10;

/// Battery level reported in heartbeats
///
/// Followers have no battery gauge wired into the convoy yet, so this is a
/// fixed placeholder the leader must not interpret.
pub const HEARTBEAT_BATTERY_PLACEHOLDER: u8 = 0;

/// Leader-side registry entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub struct FollowerInfo {
    pub mac: MacAddress,
    /// Receive time of the latest heartbeat (ms)
    pub last_seen: u32,
    pub online: bool,
}

/// Link setup failures; either one leaves the convoy disabled for this boot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum LinkError {
    /// The radio itself could not be brought up
    RadioInit,
    /// The broadcast or leader peer could not be registered
    PeerRegistration,
}

/// What happened to a received datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum ReceiveOutcome {
    /// Valid packet, state updated
    Accepted(PacketKind),
    /// Length matches neither packet
    UnknownLength,
    /// Packet of a kind this role does not consume
    NotForRole(PacketKind),
    /// Checksum mismatch
    Corrupted(PacketKind),
    /// Valid packet from another convoy
    ForeignGroup(PacketKind),
    /// Heartbeat from a new follower while the registry is full
    RegistryFull,
}

/// Fields written by the radio receive context
struct Shared {
    /// Duty of the latest accepted motion command
    received_duty: MotorDuty,
    /// Receive time of the latest accepted motion command
    last_command_time: u32,
    /// Last successful heartbeat transmission; `None` until the first one
    last_heartbeat_sent: Option<u32>,
    followers: Vec<FollowerInfo, MAX_FOLLOWERS>,
}

/// Convoy state shared between the control tick and the radio receive path
pub struct ConvoyLink {
    config: GroupConfig,
    /// Cleared when link setup fails, so the robot runs standalone-safe
    enabled: AtomicBool,
    ready: AtomicBool,
    local: Mutex<CriticalSectionRawMutex, RefCell<MacAddress>>,
    shared: Mutex<CriticalSectionRawMutex, RefCell<Shared>>,
}

impl ConvoyLink {
    /// Creates the link for a loaded configuration
    ///
    /// The command clock starts at `now`, so a follower gets one full timeout
    /// window to hear from its leader before the failsafe trips.
    pub fn new(config: GroupConfig, now: u32) -> Self {
        info!(
            "Convoy role {}, group {}, radio {}",
            config.role, config.group_id, config.espnow_enabled
        );
        Self {
            config,
            enabled: AtomicBool::new(config.link_requested()),
            ready: AtomicBool::new(false),
            local: Mutex::new(RefCell::new(MacAddress::default())),
            shared: Mutex::new(RefCell::new(Shared {
                received_duty: MotorDuty::ZERO,
                last_command_time: now,
                last_heartbeat_sent: None,
                followers: Vec::new(),
            })),
        }
    }

    /// Configuration as loaded at boot
    ///
    /// A failed setup does not change it; see [`Self::is_enabled`].
    pub fn config(&self) -> GroupConfig {
        self.config
    }

    pub fn role(&self) -> Role {
        self.config.role
    }

    /// Configuration to persist for a role change
    ///
    /// Roles never switch live: the running link keeps its boot configuration
    /// and the returned one takes effect after a reboot.
    pub fn set_role(&self, role: Role, leader_mac: Option<MacAddress>) -> GroupConfig {
        let next = self.config.with_role(role, leader_mac);
        info!("Role {} -> {} stored for next boot", self.config.role, next.role);
        next
    }

    /// Convoy mode is in effect: radio requested by config and not disabled by a setup failure
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Radio initialized and peer registered
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn local_address(&self) -> MacAddress {
        self.local.lock(|local| *local.borrow())
    }

    /// Brings up the radio and registers the single peer this role talks to
    ///
    /// Does nothing when already initialized, when standalone or when the radio
    /// is disabled. On failure the convoy is disabled for the rest of this boot.
    pub fn initialize<R: ConvoyRadio>(&self, radio: &mut R) -> Result<(), LinkError> {
        if self.is_ready() || !self.is_enabled() {
            return Ok(());
        }

        let result = self.register_peer(radio);
        match result {
            Ok(()) => {
                let local = radio.local_address();
                self.local.lock(|cell| {
                    cell.replace(local);
                });
                self.ready.store(true, Ordering::Release);
                info!("Convoy link ready, local address {}", local);
            }
            Err(e) => {
                self.enabled.store(false, Ordering::Release);
                error!("Convoy link setup failed: {}, running standalone-safe", e);
            }
        }
        result
    }

    fn register_peer<R: ConvoyRadio>(&self, radio: &mut R) -> Result<(), LinkError> {
        radio.init().map_err(|_| LinkError::RadioInit)?;
        let peer = match self.config.role {
            Role::Leader => MacAddress::BROADCAST,
            Role::Follower => self.config.leader_mac,
            Role::Standalone => return Ok(()),
        };
        radio.add_peer(peer).map_err(|_| LinkError::PeerRegistration)?;
        debug!("Registered convoy peer {}", peer);
        Ok(())
    }

    fn link_up_as(&self, role: Role) -> bool {
        self.config.role == role && self.is_ready() && self.is_enabled()
    }

    /// Broadcasts the leader's duty; no-op unless leader with a ready link
    ///
    /// A failed transmission is not retried, the next tick sends fresh values.
    pub fn send_command<R: ConvoyRadio>(&self, radio: &mut R, left_duty: f32, right_duty: f32, now: u32) {
        if !self.link_up_as(Role::Leader) {
            return;
        }
        let command = MotionCommand {
            left_duty,
            right_duty,
            timestamp: now,
            group_id: self.config.group_id,
        };
        if radio.send(MacAddress::BROADCAST, &command.encode()).is_err() {
            debug!("Motion command dropped by radio");
        }
    }

    /// Sends a heartbeat to the leader, at most once per [`HEARTBEAT_INTERVAL_MS`]
    ///
    /// Returns whether one went out. The interval only restarts on success.
    pub fn send_heartbeat<R: ConvoyRadio>(&self, radio: &mut R, now: u32) -> bool {
        if !self.link_up_as(Role::Follower) {
            return false;
        }
        let due = self.shared.lock(|shared| match shared.borrow().last_heartbeat_sent {
            Some(sent) => now.wrapping_sub(sent) >= HEARTBEAT_INTERVAL_MS,
            None => true,
        });
        if !due {
            return false;
        }

        let heartbeat = FollowerHeartbeat {
            follower_mac: radio.local_address(),
            group_id: self.config.group_id,
            timestamp: now,
            battery_level: HEARTBEAT_BATTERY_PLACEHOLDER,
        };
        if radio.send(self.config.leader_mac, &heartbeat.encode()).is_err() {
            debug!("Heartbeat dropped by radio");
            return false;
        }
        self.shared
            .lock(|shared| shared.borrow_mut().last_heartbeat_sent = Some(now));
        true
    }

    /// Handles one datagram from the radio
    ///
    /// Packets are told apart by length only. Invalid or foreign packets are
    /// dropped without touching any state.
    pub fn on_packet_received(&self, sender: MacAddress, payload: &[u8], now: u32) -> ReceiveOutcome {
        let Some(kind) = PacketKind::from_len(payload.len()) else {
            return ReceiveOutcome::UnknownLength;
        };
        match kind {
            PacketKind::Motion => self.handle_motion_command(payload, now),
            PacketKind::Heartbeat => self.handle_heartbeat(sender, payload, now),
        }
    }

    fn handle_motion_command(&self, payload: &[u8], now: u32) -> ReceiveOutcome {
        let command = match MotionCommand::decode(payload) {
            Ok(command) => command,
            Err(e) => return rejected(PacketKind::Motion, e),
        };
        if command.group_id != self.config.group_id {
            return ReceiveOutcome::ForeignGroup(PacketKind::Motion);
        }
        if self.config.role != Role::Follower {
            return ReceiveOutcome::NotForRole(PacketKind::Motion);
        }

        self.shared.lock(|shared| {
            let mut shared = shared.borrow_mut();
            shared.received_duty = MotorDuty::new(command.left_duty, command.right_duty);
            shared.last_command_time = now;
        });
        ReceiveOutcome::Accepted(PacketKind::Motion)
    }

    fn handle_heartbeat(&self, sender: MacAddress, payload: &[u8], now: u32) -> ReceiveOutcome {
        if self.config.role != Role::Leader {
            return ReceiveOutcome::NotForRole(PacketKind::Heartbeat);
        }
        let heartbeat = match FollowerHeartbeat::decode(payload) {
            Ok(heartbeat) => heartbeat,
            Err(e) => return rejected(PacketKind::Heartbeat, e),
        };
        if heartbeat.group_id != self.config.group_id {
            return ReceiveOutcome::ForeignGroup(PacketKind::Heartbeat);
        }

        // Registry identity is the radio sender, not the MAC inside the payload
        self.shared.lock(|shared| {
            let mut shared = shared.borrow_mut();
            if let Some(follower) = shared.followers.iter_mut().find(|f| f.mac == sender) {
                if !follower.online {
                    info!("Follower back online: {}", sender);
                }
                follower.last_seen = now;
                follower.online = true;
                return ReceiveOutcome::Accepted(PacketKind::Heartbeat);
            }

            let entry = FollowerInfo {
                mac: sender,
                last_seen: now,
                online: true,
            };
            match shared.followers.push(entry) {
                Ok(()) => {
                    info!("New follower: {}", sender);
                    ReceiveOutcome::Accepted(PacketKind::Heartbeat)
                }
                Err(_) => ReceiveOutcome::RegistryFull,
            }
        })
    }

    /// Whether the leader has gone quiet for longer than [`COMMAND_TIMEOUT_MS`]
    ///
    /// Always false for anything but a follower. A command stamped slightly
    /// after `now` was sampled counts as fresh.
    pub fn is_command_timed_out(&self, now: u32) -> bool {
        if self.config.role != Role::Follower {
            return false;
        }
        let last = self.shared.lock(|shared| shared.borrow().last_command_time);
        let age = now.wrapping_sub(last);
        let ahead = last.wrapping_sub(now);
        age > COMMAND_TIMEOUT_MS && ahead > COMMAND_TIMEOUT_MS
    }

    /// Duty of the latest accepted motion command
    pub fn received_duty(&self) -> MotorDuty {
        self.shared.lock(|shared| shared.borrow().received_duty)
    }

    /// Marks followers offline after [`FOLLOWER_OFFLINE_TIMEOUT_MS`] of silence
    ///
    /// Entries are never removed, so a returning follower keeps its slot.
    pub fn refresh_follower_liveness(&self, now: u32) {
        if self.config.role != Role::Leader {
            return;
        }
        self.shared.lock(|shared| {
            for follower in shared.borrow_mut().followers.iter_mut() {
                if follower.online && now.wrapping_sub(follower.last_seen) > FOLLOWER_OFFLINE_TIMEOUT_MS {
                    follower.online = false;
                    warn!("Follower offline: {}", follower.mac);
                }
            }
        });
    }

    /// Online followers, for the UI; empty unless leader
    pub fn online_followers(&self) -> Vec<FollowerInfo, MAX_FOLLOWERS> {
        if self.config.role != Role::Leader {
            return Vec::new();
        }
        self.shared.lock(|shared| shared.borrow().followers.iter().filter(|f| f.online).copied().collect())
    }

    /// Every registry entry, online or not
    pub fn followers(&self) -> Vec<FollowerInfo, MAX_FOLLOWERS> {
        self.shared.lock(|shared| shared.borrow().followers.clone())
    }
}

fn rejected(kind: PacketKind, e: DecodeError) -> ReceiveOutcome {
    warn!("Convoy {} packet rejected: {}", kind, e);
    ReceiveOutcome::Corrupted(kind)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::vec::Vec as StdVec;

    pub const LEADER_MAC: MacAddress = MacAddress::new([0x24, 0x6F, 0x28, 0x00, 0x00, 0x01]);
    pub const FOLLOWER_MAC: MacAddress = MacAddress::new([0x24, 0x6F, 0x28, 0x00, 0x00, 0x02]);

    /// Records everything the link asks of the radio
    #[derive(Default)]
    pub struct MockRadio {
        pub local: MacAddress,
        pub fail_init: bool,
        pub fail_peer: bool,
        pub fail_send: bool,
        pub peers: StdVec<MacAddress>,
        pub sent: StdVec<(MacAddress, StdVec<u8>)>,
    }

    impl MockRadio {
        pub fn with_address(local: MacAddress) -> Self {
            Self {
                local,
                ..Self::default()
            }
        }
    }

    impl ConvoyRadio for MockRadio {
        type Error = ();

        fn init(&mut self) -> Result<(), ()> {
            if self.fail_init {
                Err(())
            } else {
                Ok(())
            }
        }

        fn add_peer(&mut self, peer: MacAddress) -> Result<(), ()> {
            if self.fail_peer {
                return Err(());
            }
            self.peers.push(peer);
            Ok(())
        }

        fn send(&mut self, peer: MacAddress, payload: &[u8]) -> Result<(), ()> {
            if self.fail_send {
                return Err(());
            }
            self.sent.push((peer, payload.to_vec()));
            Ok(())
        }

        fn local_address(&self) -> MacAddress {
            self.local
        }
    }

    pub fn leader_config(group_id: u8) -> GroupConfig {
        GroupConfig::new(Role::Leader, MacAddress::BROADCAST, group_id, true)
    }

    pub fn follower_config(group_id: u8) -> GroupConfig {
        GroupConfig::new(Role::Follower, LEADER_MAC, group_id, true)
    }

    fn ready_link(config: GroupConfig, radio: &mut MockRadio) -> ConvoyLink {
        let link = ConvoyLink::new(config, 0);
        link.initialize(radio).unwrap();
        link
    }

    fn heartbeat_from(mac: MacAddress, group_id: u8) -> [u8; 13] {
        FollowerHeartbeat {
            follower_mac: mac,
            group_id,
            timestamp: 0,
            battery_level: 0,
        }
        .encode()
    }

    fn command(left: f32, right: f32, group_id: u8) -> [u8; 14] {
        MotionCommand {
            left_duty: left,
            right_duty: right,
            timestamp: 0,
            group_id,
        }
        .encode()
    }

    #[test]
    fn role_change_waits_for_reboot() {
        let link = ConvoyLink::new(leader_config(4), 0);
        let next = link.set_role(Role::Follower, Some(LEADER_MAC));

        assert_eq!(next.role, Role::Follower);
        assert_eq!(next.leader_mac, LEADER_MAC);
        assert_eq!(next.group_id, 4);
        assert_eq!(link.role(), Role::Leader);
    }

    #[test]
    fn leader_registers_broadcast_peer_only() {
        let mut radio = MockRadio::with_address(LEADER_MAC);
        let link = ready_link(leader_config(3), &mut radio);
        assert!(link.is_ready());
        assert_eq!(radio.peers, [MacAddress::BROADCAST]);
        assert_eq!(link.local_address(), LEADER_MAC);

        // second call is a no-op
        link.initialize(&mut radio).unwrap();
        assert_eq!(radio.peers.len(), 1);
    }

    #[test]
    fn follower_registers_its_leader() {
        let mut radio = MockRadio::with_address(FOLLOWER_MAC);
        ready_link(follower_config(3), &mut radio);
        assert_eq!(radio.peers, [LEADER_MAC]);
    }

    #[test]
    fn standalone_or_disabled_skips_initialization() {
        let mut radio = MockRadio::default();
        let standalone = ConvoyLink::new(GroupConfig::standalone(), 0);
        assert_eq!(standalone.initialize(&mut radio), Ok(()));
        assert!(!standalone.is_ready());

        let disabled = ConvoyLink::new(GroupConfig::new(Role::Leader, MacAddress::BROADCAST, 1, false), 0);
        assert_eq!(disabled.initialize(&mut radio), Ok(()));
        assert!(!disabled.is_ready());
        assert!(radio.peers.is_empty());
    }

    #[test]
    fn setup_failure_disables_convoy() {
        let mut radio = MockRadio {
            fail_init: true,
            ..MockRadio::default()
        };
        let link = ConvoyLink::new(leader_config(1), 0);
        assert_eq!(link.initialize(&mut radio), Err(LinkError::RadioInit));
        assert!(!link.is_enabled());
        assert!(link.config().espnow_enabled);

        let mut radio = MockRadio {
            fail_peer: true,
            ..MockRadio::default()
        };
        let link = ConvoyLink::new(follower_config(1), 0);
        assert_eq!(link.initialize(&mut radio), Err(LinkError::PeerRegistration));
        assert!(!link.is_enabled());
        assert!(!link.is_command_timed_out(0));
    }

    #[test]
    fn leader_broadcasts_sealed_command() {
        let mut radio = MockRadio::with_address(LEADER_MAC);
        let link = ready_link(leader_config(3), &mut radio);
        link.send_command(&mut radio, 0.5, -0.5, 1234);

        let (dest, payload) = &radio.sent[0];
        assert_eq!(*dest, MacAddress::BROADCAST);
        let command = MotionCommand::decode(payload).unwrap();
        assert_eq!(command.left_duty, 0.5);
        assert_eq!(command.right_duty, -0.5);
        assert_eq!(command.timestamp, 1234);
        assert_eq!(command.group_id, 3);
    }

    #[test]
    fn only_a_ready_leader_sends_commands() {
        let mut radio = MockRadio::with_address(FOLLOWER_MAC);
        let follower = ready_link(follower_config(3), &mut radio);
        follower.send_command(&mut radio, 1.0, 1.0, 0);
        assert!(radio.sent.is_empty());

        let not_ready = ConvoyLink::new(leader_config(3), 0);
        not_ready.send_command(&mut radio, 1.0, 1.0, 0);
        assert!(radio.sent.is_empty());
    }

    #[test]
    fn follower_applies_leader_command_and_resets_timeout() {
        let mut leader_radio = MockRadio::with_address(LEADER_MAC);
        let leader = ready_link(leader_config(3), &mut leader_radio);
        let mut follower_radio = MockRadio::with_address(FOLLOWER_MAC);
        let follower = ready_link(follower_config(3), &mut follower_radio);

        assert!(follower.is_command_timed_out(600));
        leader.send_command(&mut leader_radio, 0.5, -0.5, 600);
        let (_, payload) = &leader_radio.sent[0];
        assert_eq!(
            follower.on_packet_received(LEADER_MAC, payload, 600),
            ReceiveOutcome::Accepted(PacketKind::Motion)
        );
        assert_eq!(follower.received_duty(), MotorDuty::new(0.5, -0.5));
        assert!(!follower.is_command_timed_out(601));
        assert!(!follower.is_command_timed_out(1100));
        assert!(follower.is_command_timed_out(1101));
    }

    #[test]
    fn command_timeout_uses_wrapping_arithmetic() {
        let follower = ConvoyLink::new(follower_config(1), 0xFFFF_FFFA);
        // 11 ms elapsed across the wrap
        assert!(!follower.is_command_timed_out(5));

        let follower = ConvoyLink::new(follower_config(1), 10);
        assert!(!follower.is_command_timed_out(5 + COMMAND_TIMEOUT_MS));
        let follower = ConvoyLink::new(follower_config(1), 0xFFFF_FFFA);
        assert!(follower.is_command_timed_out(5 + COMMAND_TIMEOUT_MS));
    }

    #[test]
    fn command_received_after_the_clock_was_sampled_is_fresh() {
        let mut radio = MockRadio::with_address(FOLLOWER_MAC);
        let follower = ready_link(follower_config(3), &mut radio);
        follower.on_packet_received(LEADER_MAC, &command(0.2, 0.2, 3), 1001);

        assert!(!follower.is_command_timed_out(1000));
        assert!(!follower.is_command_timed_out(1001 + COMMAND_TIMEOUT_MS));
        assert!(follower.is_command_timed_out(1002 + COMMAND_TIMEOUT_MS));

        let follower = ConvoyLink::new(follower_config(1), 10);
        assert!(!follower.is_command_timed_out(5));
    }

    #[test]
    fn timeout_only_applies_to_followers() {
        let leader = ConvoyLink::new(leader_config(1), 0);
        assert!(!leader.is_command_timed_out(u32::MAX / 2));
        let standalone = ConvoyLink::new(GroupConfig::standalone(), 0);
        assert!(!standalone.is_command_timed_out(u32::MAX / 2));
    }

    #[test]
    fn foreign_group_and_corrupt_commands_change_nothing() {
        let mut radio = MockRadio::with_address(FOLLOWER_MAC);
        let follower = ready_link(follower_config(3), &mut radio);

        assert_eq!(
            follower.on_packet_received(LEADER_MAC, &command(0.9, 0.9, 4), 100),
            ReceiveOutcome::ForeignGroup(PacketKind::Motion)
        );
        let mut corrupt = command(0.9, 0.9, 3);
        corrupt[0] ^= 0x40;
        assert_eq!(
            follower.on_packet_received(LEADER_MAC, &corrupt, 100),
            ReceiveOutcome::Corrupted(PacketKind::Motion)
        );
        assert_eq!(
            follower.on_packet_received(LEADER_MAC, &[0u8; 20], 100),
            ReceiveOutcome::UnknownLength
        );

        assert_eq!(follower.received_duty(), MotorDuty::ZERO);
        assert!(follower.is_command_timed_out(COMMAND_TIMEOUT_MS + 1));
    }

    #[test]
    fn heartbeats_are_ignored_unless_leader() {
        let mut radio = MockRadio::with_address(FOLLOWER_MAC);
        let follower = ready_link(follower_config(3), &mut radio);
        assert_eq!(
            follower.on_packet_received(FOLLOWER_MAC, &heartbeat_from(FOLLOWER_MAC, 3), 0),
            ReceiveOutcome::NotForRole(PacketKind::Heartbeat)
        );
        assert!(follower.followers().is_empty());
    }

    #[test]
    fn follower_heartbeat_is_rate_limited() {
        let mut radio = MockRadio::with_address(FOLLOWER_MAC);
        let follower = ready_link(follower_config(3), &mut radio);

        assert!(follower.send_heartbeat(&mut radio, 10));
        assert!(!follower.send_heartbeat(&mut radio, 500));
        assert!(!follower.send_heartbeat(&mut radio, 1009));
        assert!(follower.send_heartbeat(&mut radio, 1010));
        assert_eq!(radio.sent.len(), 2);

        let (dest, payload) = &radio.sent[0];
        assert_eq!(*dest, LEADER_MAC);
        let heartbeat = FollowerHeartbeat::decode(payload).unwrap();
        assert_eq!(heartbeat.follower_mac, FOLLOWER_MAC);
        assert_eq!(heartbeat.group_id, 3);
        assert_eq!(heartbeat.battery_level, HEARTBEAT_BATTERY_PLACEHOLDER);
    }

    #[test]
    fn failed_heartbeat_is_retried_next_tick() {
        let mut radio = MockRadio::with_address(FOLLOWER_MAC);
        let follower = ready_link(follower_config(3), &mut radio);
        radio.fail_send = true;
        assert!(!follower.send_heartbeat(&mut radio, 10));
        radio.fail_send = false;
        assert!(follower.send_heartbeat(&mut radio, 12));
    }

    #[test]
    fn registry_is_bounded() {
        let mut radio = MockRadio::with_address(LEADER_MAC);
        let leader = ready_link(leader_config(3), &mut radio);

        for i in 0..(MAX_FOLLOWERS as u8 + 5) {
            let mac = MacAddress::new([0x02, 0, 0, 0, 0, i]);
            let outcome = leader.on_packet_received(mac, &heartbeat_from(mac, 3), 100);
            if (i as usize) < MAX_FOLLOWERS {
                assert_eq!(outcome, ReceiveOutcome::Accepted(PacketKind::Heartbeat));
            } else {
                assert_eq!(outcome, ReceiveOutcome::RegistryFull);
            }
        }
        assert_eq!(leader.followers().len(), MAX_FOLLOWERS);
    }

    #[test]
    fn offline_follower_returns_without_duplicate() {
        let mut radio = MockRadio::with_address(LEADER_MAC);
        let leader = ready_link(leader_config(3), &mut radio);

        leader.on_packet_received(FOLLOWER_MAC, &heartbeat_from(FOLLOWER_MAC, 3), 1000);
        leader.refresh_follower_liveness(4000);
        assert!(leader.followers()[0].online);

        leader.refresh_follower_liveness(4001);
        assert!(!leader.followers()[0].online);
        assert!(leader.online_followers().is_empty());

        // idempotent
        leader.refresh_follower_liveness(4001);
        assert_eq!(leader.followers().len(), 1);

        leader.on_packet_received(FOLLOWER_MAC, &heartbeat_from(FOLLOWER_MAC, 3), 5000);
        let followers = leader.followers();
        assert_eq!(followers.len(), 1);
        assert!(followers[0].online);
        assert_eq!(followers[0].last_seen, 5000);
        assert_eq!(leader.online_followers().len(), 1);
    }

    #[test]
    fn foreign_heartbeat_does_not_register() {
        let mut radio = MockRadio::with_address(LEADER_MAC);
        let leader = ready_link(leader_config(3), &mut radio);
        assert_eq!(
            leader.on_packet_received(FOLLOWER_MAC, &heartbeat_from(FOLLOWER_MAC, 9), 0),
            ReceiveOutcome::ForeignGroup(PacketKind::Heartbeat)
        );
        assert!(leader.followers().is_empty());
    }
}
