//! Standalone balance cascade
//!
//! ```text
//! joystick.y -> speed target ----> [speed]    --+
//! hold position -----------------> [position] --+--> pitch target offset
//!                                                |
//! pitch_zero + offset -----------> [angle] ------+--> base duty (sign flipped)
//! joystick.x -> yaw rate target -> [yaw] -----------> differential duty
//! ```
//!
//! Leaning forward means positive pitch, and positive duty drives forward, so
//! the angle loop output is negated: a robot tipping forward drives its wheels
//! under itself.

use super::pid::{clamp_symmetric, Pid};
use crate::params::{GainTable, PITCH_ZERO_LIMIT_DEG};
use crate::state::{Joystick, MotorDuty, SensorFrame};

/// Wheel speed requested at full forward stick (wheel deg/s)
pub const MAX_DRIVE_SPEED_DPS: f32 = 720.0;

/// Yaw rate requested at full steering stick (deg/s)
pub const MAX_TURN_RATE_DPS: f32 = 180.0;

/// Share of the outer loop correction folded into pitch zero per tick
pub const PITCH_ZERO_ADAPT_RATE: f32 = 0.0002;

/// The four balance loops
#[derive(Debug, Clone)]
pub struct PidCascade {
    pub angle: Pid,
    pub speed: Pid,
    pub position: Pid,
    pub yaw: Pid,
}

impl PidCascade {
    pub fn new(gains: &GainTable) -> Self {
        Self {
            angle: Pid::new(gains.angle),
            speed: Pid::new(gains.speed),
            position: Pid::new(gains.position),
            yaw: Pid::new(gains.yaw),
        }
    }

    pub fn gains(&self) -> GainTable {
        GainTable {
            angle: self.angle.gains(),
            speed: self.speed.gains(),
            position: self.position.gains(),
            yaw: self.yaw.gains(),
        }
    }

    pub fn set_gains(&mut self, gains: &GainTable) {
        self.angle.set_gains(gains.angle);
        self.speed.set_gains(gains.speed);
        self.position.set_gains(gains.position);
        self.yaw.set_gains(gains.yaw);
    }

    /// Runs one tick of all four loops and mixes the result
    ///
    /// `previous` is the joystick of the last tick. While the stick drives
    /// forward or backward the position target follows the wheels; on the tick
    /// it returns to centre the current position becomes the hold point.
    pub fn run(
        &mut self,
        sensors: &SensorFrame,
        joystick: &Joystick,
        previous: &Joystick,
        pitch_zero: f32,
        dt: f32,
    ) -> MotorDuty {
        let wheels = sensors.wheels;

        self.speed.set_target(joystick.y * MAX_DRIVE_SPEED_DPS);
        let speed_offset = self.speed.update(wheels.speed, dt);

        if joystick.y != 0.0 || previous.y != 0.0 {
            self.position.set_target(wheels.position);
        }
        let position_offset = self.position.update(wheels.position, dt);

        self.angle.set_target(pitch_zero + speed_offset + position_offset);
        let base = -self.angle.update(sensors.imu.pitch, dt);

        self.yaw.set_target(joystick.x * MAX_TURN_RATE_DPS);
        let turn = self.yaw.update(sensors.imu.yaw_rate, dt);

        MotorDuty::new(base + turn, base - turn).sanitized()
    }

    /// Pitch offset the outer loops asked for on the last tick
    pub fn angle_correction(&self) -> f32 {
        self.speed.state().output + self.position.state().output
    }

    /// Moves pitch zero a small step towards the angle the outer loops demand
    ///
    /// A robot whose balance point is off keeps asking for the same offset;
    /// folding part of it into pitch zero lets the outer loops relax.
    pub fn adapted_pitch_zero(&self, pitch_zero: f32) -> f32 {
        let adapted = pitch_zero + self.angle_correction() * PITCH_ZERO_ADAPT_RATE;
        clamp_symmetric(adapted, PITCH_ZERO_LIMIT_DEG)
    }

    /// Zeroes every integral and parks every target on its measurement
    pub fn reset_integrators(&mut self, sensors: &SensorFrame) {
        self.angle.reset(sensors.imu.pitch);
        self.speed.reset(sensors.wheels.speed);
        self.position.reset(sensors.wheels.position);
        self.yaw.reset(sensors.imu.yaw_rate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{ImuReading, WheelOdometry};
    use crate::CONTROL_DT;

    fn frame(pitch: f32, yaw_rate: f32, speed: f32, position: f32) -> SensorFrame {
        SensorFrame {
            imu: ImuReading {
                pitch,
                yaw_rate,
                ..ImuReading::default()
            },
            wheels: WheelOdometry { speed, position },
            imu_time: 0,
        }
    }

    #[test]
    fn forward_lean_drives_forward() {
        let mut cascade = PidCascade::new(&GainTable::DEFAULT);
        let sensors = frame(2.0, 0.0, 0.0, 0.0);
        let duty = cascade.run(&sensors, &Joystick::CENTERED, &Joystick::CENTERED, 0.0, CONTROL_DT);
        assert!(duty.left > 0.0);
        assert_eq!(duty.left, duty.right);
    }

    #[test]
    fn steering_splits_the_wheels() {
        let mut cascade = PidCascade::new(&GainTable::DEFAULT);
        let sensors = frame(0.0, 0.0, 0.0, 0.0);
        let stick = Joystick { x: 1.0, y: 0.0, a: 0.0 };
        let duty = cascade.run(&sensors, &stick, &stick, 0.0, CONTROL_DT);
        assert!(duty.left > 0.0);
        assert!(duty.right < 0.0);
        assert!(duty.left <= 1.0 && duty.right >= -1.0);
    }

    #[test]
    fn stick_release_captures_hold_position() {
        let mut cascade = PidCascade::new(&GainTable::DEFAULT);
        let driving = Joystick { x: 0.0, y: 0.5, a: 0.0 };

        cascade.run(&frame(0.0, 0.0, 100.0, 40.0), &driving, &Joystick::CENTERED, 0.0, CONTROL_DT);
        assert_eq!(cascade.position.target(), 40.0);

        cascade.run(&frame(0.0, 0.0, 50.0, 55.0), &Joystick::CENTERED, &driving, 0.0, CONTROL_DT);
        assert_eq!(cascade.position.target(), 55.0);

        // robot rolls on, the hold point stays
        cascade.run(&frame(0.0, 0.0, 10.0, 60.0), &Joystick::CENTERED, &Joystick::CENTERED, 0.0, CONTROL_DT);
        assert_eq!(cascade.position.target(), 55.0);
    }

    #[test]
    fn reset_clears_all_integrals() {
        let mut gains = GainTable::DEFAULT;
        gains.speed.i = 0.01;
        gains.yaw.i = 0.1;
        let mut cascade = PidCascade::new(&gains);
        let sensors = frame(8.0, 20.0, -30.0, 10.0);
        for _ in 0..20 {
            cascade.run(&sensors, &Joystick::CENTERED, &Joystick::CENTERED, 0.0, CONTROL_DT);
        }
        assert!(cascade.angle.state().integral != 0.0);

        cascade.reset_integrators(&sensors);
        for pid in [&cascade.angle, &cascade.speed, &cascade.position, &cascade.yaw] {
            assert_eq!(pid.state().integral, 0.0);
        }
        assert_eq!(cascade.angle.target(), 8.0);
        assert_eq!(cascade.yaw.target(), 20.0);
    }

    #[test]
    fn pitch_zero_adaptation_is_bounded() {
        let mut cascade = PidCascade::new(&GainTable::DEFAULT);
        // wheels rolling backwards makes the speed loop ask for forward lean
        cascade.run(&frame(0.0, 0.0, -1000.0, 0.0), &Joystick::CENTERED, &Joystick::CENTERED, 0.0, CONTROL_DT);
        assert!(cascade.angle_correction() > 0.0);
        assert!(cascade.adapted_pitch_zero(0.0) > 0.0);
        assert_eq!(cascade.adapted_pitch_zero(PITCH_ZERO_LIMIT_DEG), PITCH_ZERO_LIMIT_DEG);
    }
}
