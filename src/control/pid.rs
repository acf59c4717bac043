//! PID controller
//!
//! One instance per loop of the balance cascade. Works in `no_std` and does not
//! allocate.

/// Gains and limits of one loop
///
/// `integral_limit` bounds the raw error integral (before `i` is applied),
/// `output_limit` bounds the controller output symmetrically.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub struct PidGains {
    pub p: f32,
    pub i: f32,
    pub d: f32,
    pub integral_limit: f32,
    pub output_limit: f32,
}

impl PidGains {
    pub const fn new(p: f32, i: f32, d: f32, integral_limit: f32, output_limit: f32) -> Self {
        Self {
            p,
            i,
            d,
            integral_limit,
            output_limit,
        }
    }

    /// Replaces the tunable gains, keeping the limits
    pub fn with_pid(self, p: f32, i: f32, d: f32) -> Self {
        Self { p, i, d, ..self }
    }
}

/// Runtime state of one loop, as reported to the UI charts
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub struct PidState {
    /// Latest measurement
    pub current: f32,
    /// Measurement of the previous update
    pub previous: f32,
    pub target: f32,
    pub error: f32,
    pub output: f32,
    /// Clamped error integral
    pub integral: f32,
}

/// PID controller with derivative on measurement and integral anti-windup
#[derive(Debug, Clone)]
pub struct Pid {
    gains: PidGains,
    state: PidState,
    /// Cleared by the first update after a reset, suppresses the derivative kick
    seeded: bool,
}

impl Pid {
    pub fn new(gains: PidGains) -> Self {
        Self {
            gains,
            state: PidState::default(),
            seeded: false,
        }
    }

    pub fn gains(&self) -> PidGains {
        self.gains
    }

    /// New gains apply from the next update; the integral is kept but re-clamped
    pub fn set_gains(&mut self, gains: PidGains) {
        self.gains = gains;
        self.state.integral = clamp_symmetric(self.state.integral, gains.integral_limit);
    }

    pub fn state(&self) -> &PidState {
        &self.state
    }

    pub fn target(&self) -> f32 {
        self.state.target
    }

    pub fn set_target(&mut self, target: f32) {
        self.state.target = target;
    }

    /// Zeroes the integral and makes `measurement` the new target
    ///
    /// The next update starts without derivative history.
    pub fn reset(&mut self, measurement: f32) {
        self.state = PidState {
            current: measurement,
            previous: measurement,
            target: measurement,
            ..PidState::default()
        };
        self.seeded = false;
    }

    /// Advances the loop by `dt` seconds towards the stored target
    pub fn update(&mut self, measurement: f32, dt: f32) -> f32 {
        let gains = self.gains;
        let state = &mut self.state;

        if !self.seeded {
            state.previous = measurement;
            self.seeded = true;
        }
        state.current = measurement;
        state.error = state.target - measurement;

        state.integral = clamp_symmetric(state.integral + state.error * dt, gains.integral_limit);

        let derivative = if dt > 0.0 {
            -gains.d * (measurement - state.previous) / dt
        } else {
            0.0
        };

        let output = gains.p * state.error + gains.i * state.integral + derivative;
        state.output = clamp_symmetric(output, gains.output_limit);
        state.previous = measurement;
        state.output
    }
}

/// Clamps to `[-limit, limit]`; NaN collapses to zero
pub(crate) fn clamp_symmetric(value: f32, limit: f32) -> f32 {
    if value.is_nan() {
        return 0.0;
    }
    let limit = if limit.is_nan() { 0.0 } else { limit.abs() };
    value.clamp(-limit, limit)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 0.002;

    fn angle_loop(output_limit: f32) -> Pid {
        Pid::new(PidGains::new(0.6, 10.0, 0.016, 0.1, output_limit))
    }

    #[test]
    fn angle_loop_moves_monotonically_towards_clamp() {
        let mut pid = angle_loop(1.0);
        pid.set_target(0.0);

        let mut last = f32::INFINITY;
        for _ in 0..10 {
            let out = pid.update(5.0, DT);
            assert!(out <= last);
            assert!(out >= -1.0);
            last = out;
        }
        assert_eq!(last, -1.0);
    }

    #[test]
    fn unsaturated_output_grows_with_the_integral() {
        let mut pid = angle_loop(100.0);
        pid.set_target(0.0);

        let first = pid.update(5.0, DT);
        // no derivative kick on the first update
        assert!((first - (-3.0 - 10.0 * 5.0 * DT)).abs() < 1e-4);

        let mut last = first;
        for _ in 0..9 {
            let out = pid.update(5.0, DT);
            assert!(out < last);
            last = out;
        }
        assert!((pid.state().integral + 0.1).abs() < 1e-5);
    }

    #[test]
    fn integral_is_clamped() {
        let mut pid = Pid::new(PidGains::new(0.0, 1.0, 0.0, 0.5, 10.0));
        pid.set_target(100.0);
        for _ in 0..1000 {
            pid.update(0.0, DT);
        }
        assert_eq!(pid.state().integral, 0.5);
        assert_eq!(pid.state().output, 0.5);
    }

    #[test]
    fn derivative_acts_on_measurement_only() {
        let mut pid = Pid::new(PidGains::new(0.0, 0.0, 1.0, 1.0, 100.0));
        pid.update(0.0, DT);

        // a target step produces no derivative output
        pid.set_target(10.0);
        assert_eq!(pid.update(0.0, DT), 0.0);

        // rising measurement opposes the motion
        let out = pid.update(0.01, DT);
        assert!((out + 5.0).abs() < 1e-3);
    }

    #[test]
    fn reset_leaves_no_residual_integral() {
        let mut pid = angle_loop(1.0);
        pid.set_target(0.0);
        for _ in 0..50 {
            pid.update(5.0, DT);
        }
        assert!(pid.state().integral != 0.0);

        pid.reset(5.0);
        assert_eq!(pid.state().integral, 0.0);
        assert_eq!(pid.target(), 5.0);

        // target equals measurement, so the next tick is silent
        assert_eq!(pid.update(5.0, DT), 0.0);
        assert_eq!(pid.state().integral, 0.0);
    }

    #[test]
    fn nan_measurement_does_not_poison_output() {
        assert_eq!(clamp_symmetric(f32::NAN, 1.0), 0.0);
        assert_eq!(clamp_symmetric(3.0, -1.0), 1.0);
    }
}
