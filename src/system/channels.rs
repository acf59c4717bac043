//! Inter-task communication
//!
//! The control task never waits on any of these: it takes the latest sensor
//! values with `try_take`, drains UI commands with `try_receive` and hands
//! outbound work to other tasks with `try_send`, dropping it when a queue is
//! full.

use core::cell::Cell;

use balance_convoy::convoy::GroupConfig;
use balance_convoy::params::ParamSet;
use balance_convoy::protocol::link_frame::Outbound;
use balance_convoy::protocol::MacAddress;
use balance_convoy::state::{ControlCommand, ImuReading, MotorDuty, WheelOdometry};
use balance_convoy::telemetry::TelemetrySnapshot;
use defmt::{debug, Format};
use embassy_sync::blocking_mutex::{raw::CriticalSectionRawMutex, Mutex};
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;

/// UI commands for the control task
pub static CONTROL_COMMANDS: Channel<CriticalSectionRawMutex, ControlCommand, 8> = Channel::new();

/// Frames waiting for the co-processor UART
pub static OUTBOUND: Channel<CriticalSectionRawMutex, Outbound, 16> = Channel::new();

/// Flash writes requested by the control task or the UI bridge
pub static STORAGE_REQUESTS: Channel<CriticalSectionRawMutex, StorageRequest, 4> = Channel::new();

/// Latest fused attitude
pub static IMU_READING: Signal<CriticalSectionRawMutex, ImuReading> = Signal::new();

/// Latest wheel odometry
pub static ODOMETRY: Signal<CriticalSectionRawMutex, WheelOdometry> = Signal::new();

/// Snapshot for the telemetry task, every 100 ms
pub static TELEMETRY: Signal<CriticalSectionRawMutex, TelemetrySnapshot> = Signal::new();

/// Filtered battery voltage
pub static BATTERY_VOLTS: Signal<CriticalSectionRawMutex, f32> = Signal::new();

/// Co-processor answer to a radio init request
pub static RADIO_STATUS: Signal<CriticalSectionRawMutex, RadioStatus> = Signal::new();

/// Duty most recently applied to the motors; the encoders take their direction from it
static APPLIED_DUTY: Mutex<CriticalSectionRawMutex, Cell<MotorDuty>> = Mutex::new(Cell::new(MotorDuty::ZERO));

#[derive(Debug, Clone, Copy, Format)]
pub enum StorageRequest {
    SaveParams(ParamSet),
    ClearParams,
    SaveGroupConfig(GroupConfig),
}

#[derive(Debug, Clone, Copy, Format)]
pub struct RadioStatus {
    pub ok: bool,
    pub local: MacAddress,
}

/// Queues a frame for the co-processor without waiting
pub fn try_send_outbound(frame: Outbound) -> bool {
    match OUTBOUND.try_send(frame) {
        Ok(()) => true,
        Err(_) => {
            debug!("Outbound queue full, frame dropped");
            false
        }
    }
}

/// Queues a flash write without waiting
pub fn try_request_storage(request: StorageRequest) {
    if STORAGE_REQUESTS.try_send(request).is_err() {
        defmt::warn!("Storage queue full, {} dropped", request);
    }
}

pub fn set_applied_duty(duty: MotorDuty) {
    APPLIED_DUTY.lock(|cell| cell.set(duty));
}

pub fn applied_duty() -> MotorDuty {
    APPLIED_DUTY.lock(|cell| cell.get())
}
