//! Robot state
//!
//! [`RobotState`] is created once at boot and owned by the control task for the
//! lifetime of the firmware. Other tasks never touch it directly: they send
//! [`ControlCommand`]s, which the control task applies between ticks, and they
//! read published snapshots.

use crate::control::cascade::PidCascade;
use crate::control::fall::FallDetector;
use crate::control::joystick;
use crate::control::pid::clamp_symmetric;
use crate::params::{ParamSet, PidTuning, PITCH_ZERO_LIMIT_DEG};

/// Fused attitude from the inertial estimator
///
/// Angles in degrees, rates in degrees per second. Pitch is positive when the
/// robot leans forward, yaw rate is positive when turning clockwise seen from
/// above.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub struct ImuReading {
    pub pitch: f32,
    pub roll: f32,
    pub yaw: f32,
    pub pitch_rate: f32,
    pub roll_rate: f32,
    pub yaw_rate: f32,
}

/// Mean of both wheels, in wheel degrees and wheel degrees per second
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub struct WheelOdometry {
    pub speed: f32,
    pub position: f32,
}

/// Everything the control tick reads from the hardware
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub struct SensorFrame {
    pub imu: ImuReading,
    pub wheels: WheelOdometry,
    /// Uptime in milliseconds when `imu` last changed
    pub imu_time: u32,
}

/// Joystick axes in `[-1, 1]`
///
/// `y` drives forward/backward, `x` steers, `a` is the auxiliary axis.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub struct Joystick {
    pub x: f32,
    pub y: f32,
    pub a: f32,
}

impl Joystick {
    pub const CENTERED: Self = Self { x: 0.0, y: 0.0, a: 0.0 };

    pub fn is_centered(&self) -> bool {
        self.x == 0.0 && self.y == 0.0 && self.a == 0.0
    }
}

/// Motor duty pair, each side in `[-1, 1]` once sanitized
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub struct MotorDuty {
    pub left: f32,
    pub right: f32,
}

impl MotorDuty {
    pub const ZERO: Self = Self { left: 0.0, right: 0.0 };

    pub const fn new(left: f32, right: f32) -> Self {
        Self { left, right }
    }

    /// Clamps both sides to `[-1, 1]`, NaN becomes zero
    pub fn sanitized(self) -> Self {
        Self {
            left: clamp_symmetric(self.left, 1.0),
            right: clamp_symmetric(self.right, 1.0),
        }
    }
}

/// Requests from the UI bridge to the control task
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum ControlCommand {
    /// Raw joystick frame, conditioned before use
    Joystick(Joystick),
    /// Run enable
    Run(bool),
    /// New P/I/D for all four loops, persisted immediately
    SetTuning(PidTuning),
    /// Ask for the current P/I/D
    GetTuning,
    /// New pitch zero in degrees, persisted immediately
    SetPitchZero(f32),
    /// Turn chart samples in telemetry on or off
    ChartEnable(bool),
    /// Forget stored parameters and return to the built-in defaults
    ClearParams,
}

/// Side effect of a command that the control task forwards to other tasks
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum StateEffect {
    SaveParams(ParamSet),
    ClearParams,
    ReportTuning(PidTuning),
}

/// The control task's state, mutated once per tick
#[derive(Debug, Clone)]
pub struct RobotState {
    pub running: bool,
    pub chart_enabled: bool,
    /// Latest sensor frame seen by the control tick
    pub sensors: SensorFrame,
    /// Conditioned joystick in effect
    pub joystick: Joystick,
    /// Joystick of the previous tick, used to spot the stick returning to centre
    pub previous_joystick: Joystick,
    pub cascade: PidCascade,
    /// Pitch at which the robot balances (degrees)
    pub pitch_zero: f32,
    pub fall: FallDetector,
    /// Duty handed to the motors on the last tick
    pub duty: MotorDuty,
}

impl Default for RobotState {
    fn default() -> Self {
        Self::new(&ParamSet::default())
    }
}

impl RobotState {
    /// Fresh state with loaded (or default) parameters; not running
    pub fn new(params: &ParamSet) -> Self {
        Self {
            running: false,
            chart_enabled: false,
            sensors: SensorFrame::default(),
            joystick: Joystick::CENTERED,
            previous_joystick: Joystick::CENTERED,
            cascade: PidCascade::new(&params.gain_table()),
            pitch_zero: clamp_symmetric(params.pitch_zero, PITCH_ZERO_LIMIT_DEG),
            fall: FallDetector::default(),
            duty: MotorDuty::ZERO,
        }
    }

    /// Current tunable parameters
    pub fn params(&self) -> ParamSet {
        ParamSet {
            tuning: PidTuning::from_gains(&self.cascade.gains()),
            pitch_zero: self.pitch_zero,
        }
    }

    fn load_params(&mut self, params: &ParamSet) {
        self.cascade.set_gains(&params.gain_table());
        self.pitch_zero = clamp_symmetric(params.pitch_zero, PITCH_ZERO_LIMIT_DEG);
    }

    /// Applies a UI command; the returned effect must be forwarded by the caller
    pub fn apply(&mut self, command: ControlCommand) -> Option<StateEffect> {
        match command {
            ControlCommand::Joystick(raw) => {
                self.joystick = joystick::condition(raw);
                None
            }
            ControlCommand::Run(running) => {
                if running != self.running {
                    info!("Run {}", running);
                }
                self.running = running;
                None
            }
            ControlCommand::SetTuning(tuning) => {
                let params = ParamSet {
                    tuning,
                    pitch_zero: self.pitch_zero,
                };
                self.load_params(&params);
                Some(StateEffect::SaveParams(self.params()))
            }
            ControlCommand::GetTuning => Some(StateEffect::ReportTuning(self.params().tuning)),
            ControlCommand::SetPitchZero(pitch_zero) => {
                self.pitch_zero = clamp_symmetric(pitch_zero, PITCH_ZERO_LIMIT_DEG);
                Some(StateEffect::SaveParams(self.params()))
            }
            ControlCommand::ChartEnable(enabled) => {
                self.chart_enabled = enabled;
                None
            }
            ControlCommand::ClearParams => {
                self.load_params(&ParamSet::default());
                Some(StateEffect::ClearParams)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::PidTerms;

    #[test]
    fn duty_is_sanitized() {
        let duty = MotorDuty::new(f32::NAN, -4.0).sanitized();
        assert_eq!(duty, MotorDuty::new(0.0, -1.0));
    }

    #[test]
    fn joystick_command_is_conditioned() {
        let mut state = RobotState::default();
        state.apply(ControlCommand::Joystick(Joystick { x: 0.05, y: 1.0, a: 0.0 }));
        assert_eq!(state.joystick.x, 0.0);
        assert_eq!(state.joystick.y, crate::control::joystick::Y_SCALE);
    }

    #[test]
    fn tuning_change_is_applied_and_saved() {
        let mut state = RobotState::default();
        let mut tuning = state.params().tuning;
        tuning.speed = PidTerms { p: 0.01, i: 0.002, d: 0.0 };

        let effect = state.apply(ControlCommand::SetTuning(tuning));
        assert_eq!(state.cascade.gains().speed.p, 0.01);
        match effect {
            Some(StateEffect::SaveParams(params)) => assert_eq!(params.tuning, tuning),
            other => panic!("unexpected effect {:?}", other),
        }
    }

    #[test]
    fn pitch_zero_is_limited() {
        let mut state = RobotState::default();
        state.apply(ControlCommand::SetPitchZero(12.0));
        assert_eq!(state.pitch_zero, PITCH_ZERO_LIMIT_DEG);
    }

    #[test]
    fn clearing_restores_defaults() {
        let mut state = RobotState::default();
        state.apply(ControlCommand::SetPitchZero(-3.0));
        assert_eq!(state.apply(ControlCommand::ClearParams), Some(StateEffect::ClearParams));
        assert_eq!(state.params(), ParamSet::default());
    }
}
