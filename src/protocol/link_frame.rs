//! Framing on the UART to the radio/UI co-processor
//!
//! The co-processor owns the peer radio and the UI transport. Everything
//! between it and this firmware travels as:
//!
//! ```text
//! [0xA5][id][len][body; len][xor of id, len and body]
//! ```
//!
//! Ids below 0x80 flow towards this firmware, ids from 0x80 up flow out.

use heapless::Vec;

use super::checksum::xor_fold;
use super::packets::MacAddress;
use crate::convoy::{GroupConfig, Role};
use crate::params::PidTuning;
use crate::state::{ControlCommand, Joystick};
use crate::telemetry::MAX_ENCODED_LEN;

/// Sync byte opening every frame
pub const START_BYTE: u8 = 0xA5;

/// Largest body either side may send
pub const MAX_BODY_LEN: usize = 200;

/// Largest frame on the wire
pub const MAX_FRAME_LEN: usize = MAX_BODY_LEN + 4;

/// Largest radio datagram carried through the bridge
pub const MAX_RADIO_PAYLOAD: usize = 32;

// Co-processor -> firmware
pub const MSG_RADIO_RX: u8 = 0x01;
pub const MSG_RADIO_STATUS: u8 = 0x02;
pub const MSG_JOYSTICK: u8 = 0x10;
pub const MSG_RUN: u8 = 0x11;
pub const MSG_PID_SET: u8 = 0x12;
pub const MSG_PID_GET: u8 = 0x13;
pub const MSG_PITCH_ZERO_SET: u8 = 0x14;
pub const MSG_GROUP_CONFIG_SET: u8 = 0x15;
pub const MSG_GROUP_CONFIG_GET: u8 = 0x16;
pub const MSG_CHART_ENABLE: u8 = 0x17;
pub const MSG_PARAMS_CLEAR: u8 = 0x18;
pub const MSG_ROLE_SET: u8 = 0x19;

// Firmware -> co-processor
pub const MSG_RADIO_INIT: u8 = 0x81;
pub const MSG_ADD_PEER: u8 = 0x82;
pub const MSG_RADIO_TX: u8 = 0x83;
pub const MSG_TELEMETRY: u8 = 0x90;
pub const MSG_PID_REPORT: u8 = 0x91;
pub const MSG_GROUP_CONFIG_REPORT: u8 = 0x92;
pub const MSG_STORAGE_STATUS: u8 = 0x93;

/// Datagram as carried over the bridge
pub type RadioPayload = Vec<u8, MAX_RADIO_PAYLOAD>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum FrameError {
    /// Body longer than [`MAX_BODY_LEN`]
    TooLong,
    /// Trailing XOR does not match
    Checksum,
    UnknownId(u8),
    /// Known id with a body that does not fit it
    Malformed(u8),
}

/// Frames received from the co-processor
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum Inbound {
    /// Datagram from a radio peer
    RadioRx { sender: MacAddress, payload: RadioPayload },
    /// Answer to [`Outbound::RadioInit`]
    RadioStatus { ok: bool, local: MacAddress },
    /// UI request for the control task
    Control(ControlCommand),
    /// New group configuration, applied after reboot
    GroupConfigSet(GroupConfig),
    GroupConfigGet,
    /// Role change on top of the active configuration; `leader_mac` only when given
    RoleSet { role: Role, leader_mac: Option<MacAddress> },
}

/// Flash operation a [`Outbound::StorageStatus`] reports on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
#[repr(u8)]
pub enum StorageOp {
    SaveParams = 0,
    ClearParams = 1,
    SaveGroupConfig = 2,
}

/// Frames sent to the co-processor
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum Outbound {
    RadioInit,
    AddPeer(MacAddress),
    RadioTx { dest: MacAddress, payload: RadioPayload },
    /// Encoded [`crate::telemetry::TelemetrySnapshot`]
    Telemetry(Vec<u8, MAX_ENCODED_LEN>),
    PidReport(PidTuning),
    GroupConfigReport {
        config: GroupConfig,
        local: MacAddress,
        ready: bool,
    },
    /// Outcome of a flash write, body `[op][ok]`
    StorageStatus { op: StorageOp, ok: bool },
}

/// Writes one complete frame
pub fn write_frame(id: u8, body: &[u8], out: &mut Vec<u8, MAX_FRAME_LEN>) -> Result<(), FrameError> {
    if body.len() > MAX_BODY_LEN {
        return Err(FrameError::TooLong);
    }
    out.clear();
    let len = body.len() as u8;
    let crc = id ^ len ^ xor_fold(body);
    // fits: body is bounded above
    let _ = out.extend_from_slice(&[START_BYTE, id, len]);
    let _ = out.extend_from_slice(body);
    let _ = out.push(crc);
    Ok(())
}

impl Outbound {
    pub fn id(&self) -> u8 {
        match self {
            Self::RadioInit => MSG_RADIO_INIT,
            Self::AddPeer(_) => MSG_ADD_PEER,
            Self::RadioTx { .. } => MSG_RADIO_TX,
            Self::Telemetry(_) => MSG_TELEMETRY,
            Self::PidReport(_) => MSG_PID_REPORT,
            Self::GroupConfigReport { .. } => MSG_GROUP_CONFIG_REPORT,
            Self::StorageStatus { .. } => MSG_STORAGE_STATUS,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8, MAX_FRAME_LEN>, FrameError> {
        let mut body: Vec<u8, MAX_BODY_LEN> = Vec::new();
        match self {
            Self::RadioInit => {}
            Self::AddPeer(mac) => fill(&mut body, &[&mac.octets()])?,
            Self::RadioTx { dest, payload } => fill(&mut body, &[&dest.octets(), payload.as_slice()])?,
            Self::Telemetry(bytes) => fill(&mut body, &[bytes.as_slice()])?,
            Self::PidReport(tuning) => fill(&mut body, &[&tuning.to_bytes()])?,
            Self::GroupConfigReport { config, local, ready } => {
                fill(&mut body, &[&config.to_bytes(), &local.octets(), &[*ready as u8]])?
            }
            Self::StorageStatus { op, ok } => fill(&mut body, &[&[*op as u8, *ok as u8]])?,
        }
        let mut frame = Vec::new();
        write_frame(self.id(), &body, &mut frame)?;
        Ok(frame)
    }
}

fn fill(body: &mut Vec<u8, MAX_BODY_LEN>, parts: &[&[u8]]) -> Result<(), FrameError> {
    for part in parts {
        body.extend_from_slice(part).map_err(|_| FrameError::TooLong)?;
    }
    Ok(())
}

enum State {
    WaitStart,
    WaitId,
    WaitLen { id: u8 },
    Body { id: u8, len: usize },
    WaitChecksum { id: u8 },
}

/// Byte-at-a-time frame parser
///
/// Garbage between frames is skipped; a bad frame is reported once and the
/// parser hunts for the next start byte.
pub struct Parser {
    state: State,
    checksum: u8,
    body: Vec<u8, MAX_BODY_LEN>,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    pub fn new() -> Self {
        Self {
            state: State::WaitStart,
            checksum: 0,
            body: Vec::new(),
        }
    }

    /// Feeds one byte; returns a result once a frame is complete
    pub fn push(&mut self, byte: u8) -> Option<Result<Inbound, FrameError>> {
        match self.state {
            State::WaitStart => {
                if byte == START_BYTE {
                    self.state = State::WaitId;
                    self.checksum = 0;
                    self.body.clear();
                }
            }
            State::WaitId => {
                self.checksum ^= byte;
                self.state = State::WaitLen { id: byte };
            }
            State::WaitLen { id } => {
                self.checksum ^= byte;
                let len = byte as usize;
                if len > MAX_BODY_LEN {
                    self.state = State::WaitStart;
                    return Some(Err(FrameError::TooLong));
                }
                self.state = if len == 0 {
                    State::WaitChecksum { id }
                } else {
                    State::Body { id, len }
                };
            }
            State::Body { id, len } => {
                self.checksum ^= byte;
                // capacity checked against len above
                let _ = self.body.push(byte);
                if self.body.len() == len {
                    self.state = State::WaitChecksum { id };
                }
            }
            State::WaitChecksum { id } => {
                self.state = State::WaitStart;
                if byte != self.checksum {
                    return Some(Err(FrameError::Checksum));
                }
                return Some(decode(id, &self.body));
            }
        }
        None
    }
}

fn f32_at(body: &[u8], offset: usize) -> f32 {
    f32::from_le_bytes([body[offset], body[offset + 1], body[offset + 2], body[offset + 3]])
}

fn mac_at(body: &[u8], offset: usize) -> MacAddress {
    let mut mac = [0u8; 6];
    mac.copy_from_slice(&body[offset..offset + 6]);
    MacAddress::new(mac)
}

fn decode(id: u8, body: &[u8]) -> Result<Inbound, FrameError> {
    let malformed = FrameError::Malformed(id);
    let expect_len = |n: usize| if body.len() == n { Ok(()) } else { Err(malformed) };

    let inbound = match id {
        MSG_RADIO_RX => {
            if body.len() < 6 {
                return Err(malformed);
            }
            let payload = Vec::from_slice(&body[6..]).map_err(|_| malformed)?;
            Inbound::RadioRx {
                sender: mac_at(body, 0),
                payload,
            }
        }
        MSG_RADIO_STATUS => {
            expect_len(7)?;
            Inbound::RadioStatus {
                ok: body[0] != 0,
                local: mac_at(body, 1),
            }
        }
        MSG_JOYSTICK => {
            expect_len(12)?;
            Inbound::Control(ControlCommand::Joystick(Joystick {
                x: f32_at(body, 0),
                y: f32_at(body, 4),
                a: f32_at(body, 8),
            }))
        }
        MSG_RUN => {
            expect_len(1)?;
            Inbound::Control(ControlCommand::Run(body[0] != 0))
        }
        MSG_PID_SET => {
            expect_len(PidTuning::LEN)?;
            let tuning = PidTuning::from_bytes(body).ok_or(malformed)?;
            Inbound::Control(ControlCommand::SetTuning(tuning))
        }
        MSG_PID_GET => {
            expect_len(0)?;
            Inbound::Control(ControlCommand::GetTuning)
        }
        MSG_PITCH_ZERO_SET => {
            expect_len(4)?;
            let pitch_zero = f32_at(body, 0);
            if !pitch_zero.is_finite() {
                return Err(malformed);
            }
            Inbound::Control(ControlCommand::SetPitchZero(pitch_zero))
        }
        MSG_GROUP_CONFIG_SET => {
            expect_len(GroupConfig::STORED_LEN)?;
            Inbound::GroupConfigSet(GroupConfig::from_bytes(body).ok_or(malformed)?)
        }
        MSG_GROUP_CONFIG_GET => {
            expect_len(0)?;
            Inbound::GroupConfigGet
        }
        MSG_CHART_ENABLE => {
            expect_len(1)?;
            Inbound::Control(ControlCommand::ChartEnable(body[0] != 0))
        }
        MSG_PARAMS_CLEAR => {
            expect_len(0)?;
            Inbound::Control(ControlCommand::ClearParams)
        }
        MSG_ROLE_SET => {
            // role, has leader, leader mac
            expect_len(8)?;
            let role = Role::from_u8(body[0]).ok_or(malformed)?;
            let leader_mac = (body[1] != 0).then(|| mac_at(body, 2));
            Inbound::RoleSet { role, leader_mac }
        }
        other => return Err(FrameError::UnknownId(other)),
    };
    Ok(inbound)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(id: u8, body: &[u8]) -> Vec<u8, MAX_FRAME_LEN> {
        let mut out = Vec::new();
        write_frame(id, body, &mut out).unwrap();
        out
    }

    fn feed(parser: &mut Parser, bytes: &[u8]) -> std::vec::Vec<Result<Inbound, FrameError>> {
        bytes.iter().filter_map(|b| parser.push(*b)).collect()
    }

    #[test]
    fn radio_datagram_is_parsed_after_noise() {
        let sender = MacAddress::new([1, 2, 3, 4, 5, 6]);
        let mut body = std::vec::Vec::from(sender.octets());
        body.extend_from_slice(&[9; 14]);

        let mut bytes = std::vec![0x00, 0x13, 0x37];
        bytes.extend_from_slice(&frame(MSG_RADIO_RX, &body));

        let mut parser = Parser::new();
        let results = feed(&mut parser, &bytes);
        assert_eq!(results.len(), 1);
        match &results[0] {
            Ok(Inbound::RadioRx { sender: s, payload }) => {
                assert_eq!(*s, sender);
                assert_eq!(payload.as_slice(), &[9; 14]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn corrupted_frame_is_reported_and_parser_recovers() {
        let mut bad = frame(MSG_RUN, &[1]);
        bad[3] ^= 0x01;
        let mut bytes = std::vec::Vec::from(bad.as_slice());
        bytes.extend_from_slice(&frame(MSG_RUN, &[1]));

        let mut parser = Parser::new();
        let results = feed(&mut parser, &bytes);
        assert_eq!(results[0], Err(FrameError::Checksum));
        assert_eq!(results[1], Ok(Inbound::Control(ControlCommand::Run(true))));
    }

    #[test]
    fn ui_commands_decode() {
        let mut parser = Parser::new();

        let mut joystick = std::vec::Vec::new();
        for v in [0.25f32, -0.5, 0.0] {
            joystick.extend_from_slice(&v.to_le_bytes());
        }
        assert_eq!(
            feed(&mut parser, &frame(MSG_JOYSTICK, &joystick)),
            [Ok(Inbound::Control(ControlCommand::Joystick(Joystick {
                x: 0.25,
                y: -0.5,
                a: 0.0
            })))]
        );

        let config = GroupConfig::new(Role::Follower, MacAddress::new([7; 6]), 2, true);
        assert_eq!(
            feed(&mut parser, &frame(MSG_GROUP_CONFIG_SET, &config.to_bytes())),
            [Ok(Inbound::GroupConfigSet(config))]
        );
        assert_eq!(
            feed(&mut parser, &frame(MSG_PARAMS_CLEAR, &[])),
            [Ok(Inbound::Control(ControlCommand::ClearParams))]
        );
    }

    #[test]
    fn role_change_decodes_with_and_without_leader() {
        let mut parser = Parser::new();
        assert_eq!(
            feed(&mut parser, &frame(MSG_ROLE_SET, &[2, 1, 1, 2, 3, 4, 5, 6])),
            [Ok(Inbound::RoleSet {
                role: Role::Follower,
                leader_mac: Some(MacAddress::new([1, 2, 3, 4, 5, 6])),
            })]
        );
        assert_eq!(
            feed(&mut parser, &frame(MSG_ROLE_SET, &[1, 0, 0, 0, 0, 0, 0, 0])),
            [Ok(Inbound::RoleSet {
                role: Role::Leader,
                leader_mac: None,
            })]
        );
        assert_eq!(
            feed(&mut parser, &frame(MSG_ROLE_SET, &[9, 0, 0, 0, 0, 0, 0, 0])),
            [Err(FrameError::Malformed(MSG_ROLE_SET))]
        );
    }

    #[test]
    fn wrong_body_or_id_is_rejected() {
        let mut parser = Parser::new();
        assert_eq!(feed(&mut parser, &frame(MSG_RUN, &[1, 2])), [Err(FrameError::Malformed(MSG_RUN))]);
        assert_eq!(feed(&mut parser, &frame(0x7F, &[])), [Err(FrameError::UnknownId(0x7F))]);
        assert_eq!(
            feed(&mut parser, &frame(MSG_PITCH_ZERO_SET, &f32::INFINITY.to_le_bytes())),
            [Err(FrameError::Malformed(MSG_PITCH_ZERO_SET))]
        );
        let oversized = [0u8; 6 + MAX_RADIO_PAYLOAD + 1];
        assert_eq!(
            feed(&mut parser, &frame(MSG_RADIO_RX, &oversized)),
            [Err(FrameError::Malformed(MSG_RADIO_RX))]
        );
    }

    #[test]
    fn outbound_radio_tx_layout() {
        let dest = MacAddress::BROADCAST;
        let payload = RadioPayload::from_slice(&[1, 2, 3]).unwrap();
        let bytes = Outbound::RadioTx { dest, payload }.encode().unwrap();
        assert_eq!(&bytes[..3], &[START_BYTE, MSG_RADIO_TX, 9]);
        assert_eq!(&bytes[3..9], &[0xFF; 6]);
        assert_eq!(&bytes[9..12], &[1, 2, 3]);
        assert_eq!(bytes[12], xor_fold(&bytes[1..12]));
    }

    #[test]
    fn group_config_report_carries_status() {
        let config = GroupConfig::standalone();
        let local = MacAddress::new([0xAA; 6]);
        let bytes = Outbound::GroupConfigReport {
            config,
            local,
            ready: false,
        }
        .encode()
        .unwrap();
        assert_eq!(bytes[2] as usize, GroupConfig::STORED_LEN + 7);
        assert_eq!(&bytes[3..12], &config.to_bytes());
        assert_eq!(&bytes[12..18], &local.octets());
        assert_eq!(bytes[18], 0);
    }

    #[test]
    fn storage_status_reports_op_and_outcome() {
        let bytes = Outbound::StorageStatus {
            op: StorageOp::ClearParams,
            ok: false,
        }
        .encode()
        .unwrap();
        assert_eq!(bytes.as_slice(), frame(MSG_STORAGE_STATUS, &[1, 0]).as_slice());

        let bytes = Outbound::StorageStatus {
            op: StorageOp::SaveGroupConfig,
            ok: true,
        }
        .encode()
        .unwrap();
        assert_eq!(&bytes[1..5], &[MSG_STORAGE_STATUS, 2, 2, 1]);
    }
}
