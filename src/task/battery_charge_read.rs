//! Battery voltage monitoring
//!
//! Reads the battery voltage through a divider on the VSYS pin once per
//! second and publishes the median of the last 9 readings. The telemetry task
//! forwards it to the UI.
//!
//! # Voltage Calculations
//! ```text
//! Battery Voltage = (ADC Value * 3.3V * 3.0) / 4096
//! ```

use defmt::warn;
use embassy_rp::{adc::Channel, gpio::Pull};
use embassy_time::{Duration, Timer};
use moving_median::MovingMedian;

use crate::system::channels::BATTERY_VOLTS;
use crate::system::resources::{get_adc, BatteryChargeResources};

const MEASUREMENT_INTERVAL: Duration = Duration::from_secs(1);

/// ADC reference voltage
const REF_VOLTAGE: f32 = 3.3;

/// Hardware voltage divider ratio
const V_DIVIDER_RATIO: f32 = 3.0;

/// ADC resolution (12-bit)
const ADC_RANGE: f32 = 4096.0;

const MEDIAN_WINDOW_SIZE: usize = 9;

#[embassy_executor::task]
pub async fn battery_charge_read(r: BatteryChargeResources) {
    let mut channel = Channel::new_pin(r.vsys_pin, Pull::None);
    let mut median_filter = MovingMedian::<f32, MEDIAN_WINDOW_SIZE>::new();

    // Let the supply settle
    Timer::after(Duration::from_millis(500)).await;

    loop {
        let raw = {
            let mut adc_guard = get_adc().lock().await;
            match adc_guard.as_mut() {
                Some(adc) => adc.read(&mut channel).await.ok(),
                None => None,
            }
        };

        match raw {
            Some(raw) => {
                let voltage = f32::from(raw) * REF_VOLTAGE * V_DIVIDER_RATIO / ADC_RANGE;
                median_filter.add_value(voltage);
                BATTERY_VOLTS.signal(median_filter.median());
            }
            None => warn!("Battery voltage read failed"),
        }

        Timer::after(MEASUREMENT_INTERVAL).await;
    }
}
