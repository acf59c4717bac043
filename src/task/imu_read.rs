//! IMU reading using the ICM-20948 sensor
//!
//! Reads accelerometer and gyroscope every 2 ms, fuses them with a Madgwick
//! filter and publishes a [`ImuReading`] for the control task.
//!
//! # Orientation Reference Frame
//!
//! The board is mounted with its X axis pointing forward and Z up:
//! - **Pitch**: rotation about Y, positive when the robot leans forward
//! - **Roll**: rotation about X, positive when the right side drops
//! - **Yaw**: rotation about Z, relative to power-up (no magnetometer, drifts)
//!
//! The yaw rate is reported clockwise-positive seen from above, which is the
//! sign the yaw loop expects.
//!
//! # AHRS Filter Configuration
//!
//! 6-axis fusion only. The magnetometer is left off: motor currents right next
//! to the board disturb it, and balancing only needs pitch.
//! - Beta = 0.1: leans on the gyro, the accelerometer sees the wheel
//!   accelerations of a balancing robot

use core::f32::consts::PI;

use ahrs::{Ahrs, Madgwick};
use balance_convoy::state::ImuReading;
use defmt::{info, warn};
use embassy_embedded_hal::shared_bus::asynch::i2c::I2cDevice;
use embassy_time::{Delay, Duration, Ticker, Timer};
use icm20948::{
    AccelConfig, AccelDlpf, AccelFullScale, GyroConfig, GyroDlpf, GyroFullScale, I2cInterface, Icm20948Driver,
};
use nalgebra::{UnitQuaternion, Vector3};

use crate::system::{channels::IMU_READING, resources::I2cBusShared};

/// Sampling interval, same as the control tick
const SAMPLE_INTERVAL: Duration = Duration::from_millis(balance_convoy::CONTROL_TICK_MS as u64);

const SAMPLE_RATE_HZ: f32 = 1000.0 / balance_convoy::CONTROL_TICK_MS as f32;

const BETA: f32 = 0.1;

/// Consecutive failed reads before the task gives up
const MAX_CONSECUTIVE_FAILURES: u32 = 50;

/// Gyro samples averaged at power-up; the robot must stay still meanwhile
const BIAS_SAMPLES: u16 = 200;

/// Parks the task forever; the control task then keeps the last reading
async fn park() -> ! {
    loop {
        Timer::after(Duration::from_secs(1)).await;
    }
}

fn to_degrees(rad: f32) -> f32 {
    rad * 180.0 / PI
}

/// Euler angles in degrees from the fused quaternion
fn quaternion_to_euler(q: &UnitQuaternion<f32>) -> (f32, f32, f32) {
    let (roll, pitch, yaw) = q.euler_angles();
    (to_degrees(roll), to_degrees(pitch), to_degrees(yaw))
}

#[embassy_executor::task]
pub async fn imu_read(i2c_bus: &'static I2cBusShared) {
    let i2c = I2cDevice::new(i2c_bus);

    info!("Initializing ICM20948...");
    let mut sensor = match Icm20948Driver::new(I2cInterface::default(i2c)).await {
        Ok(imu) => imu,
        Err(e) => {
            warn!("Failed to detect ICM20948: {:?}", e);
            park().await
        }
    };

    let mut delay = Delay;
    if let Err(e) = sensor.init(&mut delay).await {
        warn!("Failed to initialize ICM20948: {:?}", e);
        park().await
    }

    // ±4 g, 246 Hz DLPF, ~562 Hz output
    let accel_config = AccelConfig {
        full_scale: AccelFullScale::G4,
        dlpf: AccelDlpf::Hz246,
        dlpf_enable: true,
        sample_rate_div: 1,
    };
    if let Err(e) = sensor.configure_accelerometer(accel_config).await {
        warn!("Failed to configure accelerometer: {:?}", e);
        park().await
    }

    // ±1000 °/s, 197 Hz DLPF, ~562 Hz output
    let gyro_config = GyroConfig {
        full_scale: GyroFullScale::Dps1000,
        dlpf: GyroDlpf::Hz197,
        dlpf_enable: true,
        sample_rate_div: 1,
    };
    if let Err(e) = sensor.configure_gyroscope(gyro_config).await {
        warn!("Failed to configure gyroscope: {:?}", e);
        park().await
    }

    Timer::after(Duration::from_millis(100)).await;

    let mut bias = Vector3::<f32>::zeros();
    let mut taken = 0u16;
    for _ in 0..BIAS_SAMPLES {
        if let Ok(gyro) = sensor.read_gyroscope().await {
            bias += Vector3::new(gyro.x, gyro.y, gyro.z);
            taken += 1;
        }
        Timer::after(SAMPLE_INTERVAL).await;
    }
    if taken > 0 {
        bias /= taken as f32;
    }
    info!("Gyro bias: {} {} {} deg/s", bias.x, bias.y, bias.z);
    info!("ICM20948 ready, fusing at {} Hz", SAMPLE_RATE_HZ);

    let mut madgwick = Madgwick::new(1.0 / SAMPLE_RATE_HZ, BETA);
    let mut failures = 0u32;
    let mut ticker = Ticker::every(SAMPLE_INTERVAL);

    loop {
        ticker.next().await;

        let readings = match (sensor.read_accelerometer().await, sensor.read_gyroscope().await) {
            (Ok(accel), Ok(gyro)) => {
                failures = 0;
                (accel, gyro)
            }
            (Err(e), _) | (_, Err(e)) => {
                failures += 1;
                if failures >= MAX_CONSECUTIVE_FAILURES {
                    warn!("IMU stopped responding ({:?}), giving up", e);
                    park().await
                }
                continue;
            }
        };
        let (accel, gyro) = readings;

        let accel = Vector3::new(accel.x, accel.y, accel.z);
        let gyro = Vector3::new(gyro.x, gyro.y, gyro.z) - bias;
        let gyro_rad = Vector3::new(gyro.x * PI / 180.0, gyro.y * PI / 180.0, gyro.z * PI / 180.0);

        // A zero accelerometer norm makes the filter reject the sample
        let Ok(quat) = madgwick.update_imu(&gyro_rad, &accel) else {
            continue;
        };
        let (roll, pitch, yaw) = quaternion_to_euler(quat);

        IMU_READING.signal(ImuReading {
            pitch,
            roll,
            yaw,
            pitch_rate: gyro.y,
            roll_rate: gyro.x,
            yaw_rate: -gyro.z,
        });
    }
}
