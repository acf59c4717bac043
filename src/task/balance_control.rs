//! Balance control task
//!
//! Owns the [`RobotState`] and runs one control tick every 2 ms:
//!
//! 1. take the freshest IMU and odometry readings, if any arrived
//! 2. apply queued UI commands and hand their side effects to other tasks
//! 3. let the [`MotionArbiter`] pick and apply the motor duty
//! 4. every 50 ticks, publish a telemetry snapshot
//!
//! Nothing in the tick waits on another task. Commands are drained with
//! `try_receive`, storage requests and outbound frames are dropped when their
//! queues are full.

use balance_convoy::control::{DutySource, MotionArbiter};
use balance_convoy::convoy::ConvoyLink;
use balance_convoy::params::ParamSet;
use balance_convoy::protocol::link_frame::Outbound;
use balance_convoy::state::{RobotState, SensorFrame, StateEffect};
use balance_convoy::telemetry::TelemetrySnapshot;
use balance_convoy::CONTROL_TICK_MS;
use defmt::{error, info};
use embassy_time::{Duration, Ticker};

use crate::system::channels::{
    try_request_storage, try_send_outbound, StorageRequest, CONTROL_COMMANDS, IMU_READING, ODOMETRY, TELEMETRY,
};
use crate::system::now_ms;
use crate::system::resources::MotorDriverResources;
use crate::task::motor_driver::DriveMotors;
use crate::task::radio_bridge::UartRadio;

/// Control ticks between two telemetry snapshots (100 ms)
const TELEMETRY_EVERY_TICKS: u32 = 100 / CONTROL_TICK_MS;

fn handle_effect(effect: StateEffect) {
    match effect {
        StateEffect::SaveParams(params) => try_request_storage(StorageRequest::SaveParams(params)),
        StateEffect::ClearParams => try_request_storage(StorageRequest::ClearParams),
        StateEffect::ReportTuning(tuning) => {
            try_send_outbound(Outbound::PidReport(tuning));
        }
    }
}

#[embassy_executor::task]
pub async fn balance_control(
    link: &'static ConvoyLink,
    radio: UartRadio,
    params: ParamSet,
    r: MotorDriverResources,
) {
    let Some(mut motors) = DriveMotors::new(r) else {
        error!("Motor driver setup failed, balance control not started");
        return;
    };

    let mut state = RobotState::new(&params);
    let mut arbiter = MotionArbiter::new(link, radio);
    let mut sensors = SensorFrame::default();
    let mut source = DutySource::Stopped;
    let mut tick: u32 = 0;

    info!("Balance control running, role {}", link.role());
    let mut ticker = Ticker::every(Duration::from_millis(CONTROL_TICK_MS as u64));

    loop {
        ticker.next().await;
        let now = now_ms();

        if let Some(imu) = IMU_READING.try_take() {
            sensors.imu = imu;
            sensors.imu_time = now;
        }
        if let Some(wheels) = ODOMETRY.try_take() {
            sensors.wheels = wheels;
        }

        while let Ok(command) = CONTROL_COMMANDS.try_receive() {
            if let Some(effect) = state.apply(command) {
                handle_effect(effect);
            }
        }

        let next = arbiter.tick(&mut state, &sensors, &mut motors, now);
        if next != source {
            info!("Motor duty source: {} -> {}", source, next);
            source = next;
        }

        tick = tick.wrapping_add(1);
        if tick % TELEMETRY_EVERY_TICKS == 0 {
            TELEMETRY.signal(TelemetrySnapshot::capture(&state, link, 0.0, now));
        }
    }
}
