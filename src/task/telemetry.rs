//! Telemetry to the UI
//!
//! Waits for the snapshot the control task publishes every 100 ms, adds the
//! latest battery voltage and queues it as a telemetry frame.

use balance_convoy::protocol::link_frame::Outbound;
use defmt::info;

use crate::system::channels::{try_send_outbound, BATTERY_VOLTS, TELEMETRY};

#[embassy_executor::task]
pub async fn telemetry() {
    info!("Telemetry task started");
    let mut battery_volts = 0.0;

    loop {
        let mut snapshot = TELEMETRY.wait().await;
        if let Some(volts) = BATTERY_VOLTS.try_take() {
            battery_volts = volts;
        }
        snapshot.battery_volts = battery_volts;
        try_send_outbound(Outbound::Telemetry(snapshot.encode()));
    }
}
