//! Wheel odometry from the motor encoders
//!
//! Each wheel has a single-channel hall encoder on the motor shaft. The PWM
//! slices count rising edges; this task samples the counters every 10 ms and
//! publishes the mean wheel speed and accumulated wheel position for the speed
//! and position loops.
//!
//! A single channel carries no direction, so each wheel takes the sign of the
//! duty most recently applied to its motor.
//!
//! # Configuration
//! - 10 ms sampling windows
//! - 8 pulses per motor revolution with 30:1 gear ratio
//! - 5-sample median filter per wheel

use balance_convoy::state::WheelOdometry;
use defmt::info;
use embassy_rp::{
    gpio::Pull,
    pwm::{Config, InputMode, Pwm},
};
use embassy_time::{Duration, Instant, Ticker};
use moving_median::MovingMedian;

use crate::system::channels::{applied_duty, ODOMETRY};
use crate::system::resources::MotorEncoderResources;

const SAMPLE_INTERVAL: Duration = Duration::from_millis(10);

/// Number of samples to use for median filtering
const MEDIAN_WINDOW_SIZE: usize = 5;

/// Encoder pulses per motor revolution
const PULSES_PER_MOTOR_REV: u16 = 8;
/// Motor gear ratio
const GEAR_RATIO: u16 = 30;
/// Encoder pulses per wheel revolution
const PULSES_PER_WHEEL_REV: u16 = PULSES_PER_MOTOR_REV * GEAR_RATIO; // 240

const DEGREES_PER_PULSE: f32 = 360.0 / PULSES_PER_WHEEL_REV as f32;

/// Median filter for speed measurements
struct SpeedFilter {
    filter: MovingMedian<f32, MEDIAN_WINDOW_SIZE>,
}

impl SpeedFilter {
    fn new() -> Self {
        Self {
            filter: MovingMedian::new(),
        }
    }

    fn update(&mut self, speed: f32) -> f32 {
        self.filter.add_value(speed);
        self.filter.median()
    }
}

/// One wheel: counter, filter and accumulated angle
struct Wheel {
    encoder: Pwm<'static>,
    filter: SpeedFilter,
    last_count: u16,
    position: f32,
}

impl Wheel {
    fn new(encoder: Pwm<'static>) -> Self {
        let last_count = encoder.counter();
        Self {
            encoder,
            filter: SpeedFilter::new(),
            last_count,
            position: 0.0,
        }
    }

    /// Advances by one window and returns the filtered speed in degrees per second
    fn sample(&mut self, duty: f32, elapsed_s: f32) -> f32 {
        let count = self.encoder.counter();
        let pulses = count.wrapping_sub(self.last_count);
        self.last_count = count;

        let direction = if duty < 0.0 { -1.0 } else { 1.0 };
        let degrees = direction * pulses as f32 * DEGREES_PER_PULSE;
        self.position += degrees;

        let raw_speed = if elapsed_s > 0.0 { degrees / elapsed_s } else { 0.0 };
        self.filter.update(raw_speed)
    }
}

#[embassy_executor::task]
pub async fn encoder_read(r: MotorEncoderResources) {
    let config = Config::default();
    let left_encoder = Pwm::new_input(
        r.left_encoder_slice,
        r.left_encoder_pin,
        Pull::None,
        InputMode::RisingEdge,
        config.clone(),
    );
    let right_encoder = Pwm::new_input(
        r.right_encoder_slice,
        r.right_encoder_pin,
        Pull::None,
        InputMode::RisingEdge,
        config,
    );

    let mut left = Wheel::new(left_encoder);
    let mut right = Wheel::new(right_encoder);
    info!("Encoders ready, {} pulses per wheel revolution", PULSES_PER_WHEEL_REV);

    let mut ticker = Ticker::every(SAMPLE_INTERVAL);
    let mut last_update = Instant::now();

    loop {
        ticker.next().await;

        let now = Instant::now();
        let elapsed_s = (now - last_update).as_micros() as f32 / 1_000_000.0;
        last_update = now;

        let duty = applied_duty();
        let left_speed = left.sample(duty.left, elapsed_s);
        let right_speed = right.sample(duty.right, elapsed_s);

        ODOMETRY.signal(WheelOdometry {
            speed: (left_speed + right_speed) / 2.0,
            position: (left.position + right.position) / 2.0,
        });
    }
}
