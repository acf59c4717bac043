//! Motion arbiter
//!
//! Decides once per control tick where the motor duty comes from:
//!
//! - standalone (or convoy radio disabled): the balance cascade
//! - leader: the joystick, mixed straight into duty and broadcast to the group
//! - follower: the duty last received from the leader
//!
//! The role is read from the link every tick. Whatever the source, the
//! safety interlocks get the last word: run enable, fall, command timeout
//! and a silent IMU.

use super::pid::clamp_symmetric;
use crate::convoy::{ConvoyLink, ConvoyRadio, Role};
use crate::state::{Joystick, MotorDuty, RobotState, SensorFrame};
use crate::{CONTROL_DT, CONTROL_TICK_MS};

/// Final stage of the control tick
pub trait MotorOutput {
    /// Applies a duty pair already clamped to `[-1, 1]`
    fn drive(&mut self, duty: MotorDuty);
}

/// Where this tick's duty came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum DutySource {
    Cascade,
    Joystick,
    Leader,
    /// An interlock forced zero duty
    Stopped,
}

/// Ten control ticks without a new IMU reading stop the robot
pub const IMU_STALE_MS: u32 = 10 * CONTROL_TICK_MS;

/// True once the IMU reading in `sensors` is older than [`IMU_STALE_MS`]
///
/// A timestamp slightly ahead of `now` counts as fresh.
pub fn imu_is_stale(sensors: &SensorFrame, now: u32) -> bool {
    let age = now.wrapping_sub(sensors.imu_time);
    let ahead = sensors.imu_time.wrapping_sub(now);
    age > IMU_STALE_MS && ahead > IMU_STALE_MS
}

/// Tank mix used by the leader: `y` drives, `x` steers
pub fn leader_mix(joystick: &Joystick) -> MotorDuty {
    MotorDuty::new(
        clamp_symmetric(joystick.y + joystick.x, 1.0),
        clamp_symmetric(joystick.y - joystick.x, 1.0),
    )
}

/// Owns the radio handle and borrows the shared convoy link
pub struct MotionArbiter<'a, R: ConvoyRadio> {
    link: &'a ConvoyLink,
    radio: R,
}

impl<'a, R: ConvoyRadio> MotionArbiter<'a, R> {
    pub fn new(link: &'a ConvoyLink, radio: R) -> Self {
        Self { link, radio }
    }

    pub fn link(&self) -> &ConvoyLink {
        self.link
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    /// Runs one control tick and drives the motors
    pub fn tick<M: MotorOutput>(
        &mut self,
        state: &mut RobotState,
        sensors: &SensorFrame,
        motors: &mut M,
        now: u32,
    ) -> DutySource {
        state.sensors = *sensors;
        let role = self.link.role();
        let convoy = self.link.is_enabled() && role != Role::Standalone;

        if imu_is_stale(sensors, now) {
            if state.running {
                warn!("IMU silent, stopping");
            }
            state.running = false;
        }

        let (duty, source) = if convoy {
            self.convoy_duty(state, role, now)
        } else {
            self.standalone_duty(state)
        };

        let duty = duty.sanitized();
        state.duty = duty;
        motors.drive(duty);

        if convoy {
            match role {
                Role::Follower => {
                    self.link.send_heartbeat(&mut self.radio, now);
                }
                Role::Leader => self.link.refresh_follower_liveness(now),
                Role::Standalone => {}
            }
        }

        state.previous_joystick = state.joystick;
        source
    }

    fn convoy_duty(&mut self, state: &mut RobotState, role: Role, now: u32) -> (MotorDuty, DutySource) {
        let (mut duty, mut source) = match role {
            Role::Follower => {
                if self.link.is_command_timed_out(now) {
                    if state.running {
                        warn!("Leader silent, stopping");
                    }
                    state.running = false;
                    (MotorDuty::ZERO, DutySource::Stopped)
                } else {
                    (self.link.received_duty(), DutySource::Leader)
                }
            }
            _ => {
                let duty = leader_mix(&state.joystick);
                self.link.send_command(&mut self.radio, duty.left, duty.right, now);
                (duty, DutySource::Joystick)
            }
        };

        if !state.running {
            duty = MotorDuty::ZERO;
            source = DutySource::Stopped;
        }
        if state.fall.update(state.sensors.imu.pitch, state.pitch_zero) {
            duty = MotorDuty::ZERO;
            source = DutySource::Stopped;
        }
        (duty, source)
    }

    fn standalone_duty(&mut self, state: &mut RobotState) -> (MotorDuty, DutySource) {
        let sensors = state.sensors;
        let duty = state.cascade.run(
            &sensors,
            &state.joystick,
            &state.previous_joystick,
            state.pitch_zero,
            CONTROL_DT,
        );

        if state.running && !state.fall.is_fallen() && state.joystick.is_centered() {
            state.pitch_zero = state.cascade.adapted_pitch_zero(state.pitch_zero);
        }

        if state.fall.update(sensors.imu.pitch, state.pitch_zero) && state.running {
            warn!("Fallen, run disabled");
            state.running = false;
        }

        if !state.running {
            state.cascade.reset_integrators(&sensors);
            return (MotorDuty::ZERO, DutySource::Stopped);
        }
        (duty, DutySource::Cascade)
    }
}
