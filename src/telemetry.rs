//! Telemetry snapshots for the UI
//!
//! The control task captures a [`TelemetrySnapshot`] every 100 ms; the
//! telemetry task serializes it into a frame for the co-processor.
//!
//! ```text
//! 0      flags      bit0 fallen, bit1 chart block, bit2 convoy block
//! 1..17  pitch, roll, yaw (deg), battery (V)   f32 LE
//! [chart block]  9 x f32: angle, speed, yaw loop as (current, target, output)
//! [convoy block] role u8, ready u8, count u8,
//!                count x (mac [u8; 6], last seen age ms u32 LE)
//! ```

use heapless::Vec;

use crate::control::pid::Pid;
use crate::convoy::link::MAX_FOLLOWERS;
use crate::convoy::{ConvoyLink, Role};
use crate::protocol::MacAddress;
use crate::state::RobotState;

/// Number of chart samples per snapshot
pub const CHART_CHANNELS: usize = 9;

/// Upper bound of an encoded snapshot
pub const MAX_ENCODED_LEN: usize = 17 + CHART_CHANNELS * 4 + 3 + MAX_FOLLOWERS * 10;

const FLAG_FALLEN: u8 = 1 << 0;
const FLAG_CHART: u8 = 1 << 1;
const FLAG_CONVOY: u8 = 1 << 2;

/// Online follower as shown in the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub struct FollowerSummary {
    pub mac: MacAddress,
    /// Milliseconds since its last heartbeat
    pub age_ms: u32,
}

/// Convoy block, present whenever the configuration asks for the radio
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub struct ConvoyStatus {
    pub role: Role,
    /// Radio and peer setup succeeded
    pub ready: bool,
    /// Leader only, empty otherwise
    pub followers: Vec<FollowerSummary, MAX_FOLLOWERS>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub struct TelemetrySnapshot {
    pub fallen: bool,
    pub pitch: f32,
    pub roll: f32,
    pub yaw: f32,
    pub battery_volts: f32,
    pub chart: Option<[f32; CHART_CHANNELS]>,
    pub convoy: Option<ConvoyStatus>,
}

impl TelemetrySnapshot {
    pub fn capture(state: &RobotState, link: &ConvoyLink, battery_volts: f32, now: u32) -> Self {
        let imu = state.sensors.imu;
        let chart = state.chart_enabled.then(|| chart_samples(state));

        let config = link.config();
        let convoy = config.link_requested().then(|| ConvoyStatus {
            role: config.role,
            ready: link.is_ready(),
            followers: link
                .online_followers()
                .iter()
                .map(|f| FollowerSummary {
                    mac: f.mac,
                    age_ms: now.wrapping_sub(f.last_seen),
                })
                .collect(),
        });

        Self {
            fallen: state.fall.is_fallen(),
            pitch: imu.pitch,
            roll: imu.roll,
            yaw: imu.yaw,
            battery_volts,
            chart,
            convoy,
        }
    }

    pub fn encode(&self) -> Vec<u8, MAX_ENCODED_LEN> {
        let mut out = Vec::new();
        let mut flags = 0;
        if self.fallen {
            flags |= FLAG_FALLEN;
        }
        if self.chart.is_some() {
            flags |= FLAG_CHART;
        }
        if self.convoy.is_some() {
            flags |= FLAG_CONVOY;
        }

        // Capacity covers the largest snapshot, pushes cannot fail
        let _ = out.push(flags);
        for value in [self.pitch, self.roll, self.yaw, self.battery_volts] {
            let _ = out.extend_from_slice(&value.to_le_bytes());
        }
        if let Some(chart) = &self.chart {
            for value in chart {
                let _ = out.extend_from_slice(&value.to_le_bytes());
            }
        }
        if let Some(convoy) = &self.convoy {
            let _ = out.extend_from_slice(&[convoy.role as u8, convoy.ready as u8, convoy.followers.len() as u8]);
            for follower in &convoy.followers {
                let _ = out.extend_from_slice(&follower.mac.octets());
                let _ = out.extend_from_slice(&follower.age_ms.to_le_bytes());
            }
        }
        out
    }
}

fn chart_samples(state: &RobotState) -> [f32; CHART_CHANNELS] {
    let cascade = &state.cascade;
    let triple = |pid: &Pid| {
        let s = pid.state();
        [s.current, s.target, s.output]
    };
    let [a0, a1, a2] = triple(&cascade.angle);
    let [s0, s1, s2] = triple(&cascade.speed);
    let [y0, y1, y2] = triple(&cascade.yaw);
    [a0, a1, a2, s0, s1, s2, y0, y1, y2]
}
