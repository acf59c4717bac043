//! TB6612FNG motor driver
//!
//! Turns the signed duty values from the control loop into direction pins and
//! a 10 kHz PWM duty cycle for each wheel. The driver is owned by the balance
//! control task and written once per control tick, so there is no command
//! queue in between.
//!
//! # Hardware Configuration
//! - Left wheel: motor A, PWM slice 6 channel A
//! - Right wheel: motor B, PWM slice 5 channel B
//! - Shared standby pin, released once at startup

use balance_convoy::control::MotorOutput;
use balance_convoy::state::MotorDuty;
use defmt::{info, warn};
use embassy_rp::gpio::{Level, Output};
use embassy_rp::pwm::{self, Pwm};
use tb6612fng::{DriveCommand, Motor, Tb6612fng};

use crate::system::channels::set_applied_duty;
use crate::system::resources::MotorDriverResources;

/// PWM frequency for the DC motors
const PWM_FREQUENCY_HZ: u32 = 10_000;

/// Both wheels behind one TB6612FNG
pub struct DriveMotors {
    control: Tb6612fng<
        Output<'static>,
        Output<'static>,
        Pwm<'static>,
        Output<'static>,
        Output<'static>,
        Pwm<'static>,
        Output<'static>,
    >,
}

/// PWM config for the requested frequency within the 16 bit counter
fn pwm_config() -> pwm::Config {
    let clock_freq_hz = embassy_rp::clocks::clk_sys_freq();
    let divider = ((clock_freq_hz / PWM_FREQUENCY_HZ) / 65535 + 1) as u8;
    let period = (clock_freq_hz / (PWM_FREQUENCY_HZ * divider as u32)) as u16 - 1;

    let mut config = pwm::Config::default();
    config.divider = divider.into();
    config.top = period;
    config
}

/// Maps a duty in [-1, 1] to a driver command in percent
fn drive_command(duty: f32) -> DriveCommand {
    let percent = (duty.abs() * 100.0).clamp(0.0, 100.0) as u8;
    if percent == 0 {
        DriveCommand::Stop
    } else if duty > 0.0 {
        DriveCommand::Forward(percent)
    } else {
        DriveCommand::Backward(percent)
    }
}

impl DriveMotors {
    /// Sets up both motors with all outputs low and leaves standby
    ///
    /// Returns `None` when the driver rejects its pins.
    pub fn new(r: MotorDriverResources) -> Option<Self> {
        let config = pwm_config();
        let standby = Output::new(r.standby_pin, Level::Low);

        let left_fwd = Output::new(r.left_forward_pin, Level::Low);
        let left_bckw = Output::new(r.left_backward_pin, Level::Low);
        let left_pwm = Pwm::new_output_a(r.left_slice, r.left_pwm_pin, config.clone());
        let left = Motor::new(left_fwd, left_bckw, left_pwm).ok()?;

        let right_fwd = Output::new(r.right_forward_pin, Level::Low);
        let right_bckw = Output::new(r.right_backward_pin, Level::Low);
        let right_pwm = Pwm::new_output_b(r.right_slice, r.right_pwm_pin, config);
        let right = Motor::new(right_fwd, right_bckw, right_pwm).ok()?;

        let mut control = Tb6612fng::new(left, right, standby).ok()?;
        control.disable_standby().ok()?;
        info!("Motor driver ready");

        Some(Self { control })
    }
}

impl MotorOutput for DriveMotors {
    fn drive(&mut self, duty: MotorDuty) {
        let left = self.control.motor_a.drive(drive_command(duty.left));
        let right = self.control.motor_b.drive(drive_command(duty.right));
        if left.is_err() || right.is_err() {
            warn!("Motor driver rejected duty L={} R={}", duty.left, duty.right);
        }
        set_applied_duty(duty);
    }
}
