//! Joystick conditioning
//!
//! Raw UI input is noisy around the centre and rarely exactly on an axis. The
//! filter below runs once per inbound joystick frame, before the value reaches
//! the robot state.

use crate::state::Joystick;

pub const X_DEADBAND: f32 = 0.10;
pub const Y_DEADBAND: f32 = 0.02;
pub const A_DEADBAND: f32 = 0.02;

/// A minor axis below this magnitude is always locked out
pub const AXIS_LOCK_FLOOR: f32 = 0.05;

/// A minor axis must exceed this share of the major axis to pass
pub const AXIS_LOCK_FRACTION: f32 = 0.2;

/// Forward/backward authority
pub const Y_SCALE: f32 = 0.7;

/// Clamps, deadbands and axis-locks a raw joystick frame
pub fn condition(raw: Joystick) -> Joystick {
    let mut x = deadband(unit(raw.x), X_DEADBAND);
    let mut y = deadband(unit(raw.y), Y_DEADBAND);
    let a = deadband(unit(raw.a), A_DEADBAND);

    if locks_out(y, x) {
        x = 0.0;
    }
    if locks_out(x, y) {
        y = 0.0;
    }

    Joystick { x, y: y * Y_SCALE, a }
}

/// Whether `minor` is negligible next to `major`
fn locks_out(major: f32, minor: f32) -> bool {
    let major = libm::fabsf(major);
    major > AXIS_LOCK_FLOOR && libm::fabsf(minor) < libm::fmaxf(AXIS_LOCK_FLOOR, major * AXIS_LOCK_FRACTION)
}

fn unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(-1.0, 1.0)
    }
}

fn deadband(value: f32, band: f32) -> f32 {
    if libm::fabsf(value) < band {
        0.0
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn js(x: f32, y: f32, a: f32) -> Joystick {
        Joystick { x, y, a }
    }

    #[test]
    fn centre_noise_is_removed() {
        assert_eq!(condition(js(0.09, 0.015, -0.01)), Joystick::CENTERED);
    }

    #[test]
    fn out_of_range_input_is_clamped_and_scaled() {
        let out = condition(js(0.0, 3.0, -7.0));
        assert_eq!(out.y, Y_SCALE);
        assert_eq!(out.a, -1.0);
        assert_eq!(condition(js(f32::NAN, 0.0, 0.0)), Joystick::CENTERED);
    }

    #[test]
    fn small_steering_is_locked_while_driving() {
        // 0.15 < 0.2 * 0.9
        let out = condition(js(0.15, 0.9, 0.0));
        assert_eq!(out.x, 0.0);
        assert!((out.y - 0.9 * Y_SCALE).abs() < 1e-6);

        let out = condition(js(0.3, 0.9, 0.0));
        assert_eq!(out.x, 0.3);
    }

    #[test]
    fn small_throttle_is_locked_while_turning() {
        let out = condition(js(0.8, 0.1, 0.0));
        assert_eq!(out.y, 0.0);
        assert_eq!(out.x, 0.8);
    }
}
