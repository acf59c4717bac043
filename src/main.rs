//! Robot firmware entry point
//!
//! Loads the stored configuration, brings up the co-processor link and spawns
//! the sensor, storage, telemetry and control tasks.

#![no_std]
#![no_main]

use balance_convoy::convoy::ConvoyLink;
use defmt::{error, info};
use embassy_executor::Spawner;
use embassy_rp::block::ImageDef;
use embassy_rp::config::Config;
use embassy_rp::uart::{BufferedUart, Config as UartConfig};
use static_cell::StaticCell;
use system::resources::{
    self, AssignedResources, BatteryChargeResources, CoprocessorResources, ImuResources, Irqs, MotorDriverResources,
    MotorEncoderResources, StorageResources,
};
use task::radio_bridge::{self, UartRadio};
use {defmt_rtt as _, panic_probe as _};

use crate::task::{
    balance_control::balance_control,
    battery_charge_read::battery_charge_read,
    encoder_read::encoder_read,
    flash_storage::{flash_storage, ParamStore},
    imu_read::imu_read,
    radio_bridge::{radio_bridge_rx, radio_bridge_tx},
    telemetry::telemetry,
};

/// Firmware image type for bootloader
#[link_section = ".start_block"]
#[used]
pub static IMAGE_DEF: ImageDef = ImageDef::secure_exe();

/// System core modules
mod system;
/// Task implementations
mod task;

static CONVOY_LINK: StaticCell<ConvoyLink> = StaticCell::new();
static UART_TX_BUFFER: StaticCell<[u8; 512]> = StaticCell::new();
static UART_RX_BUFFER: StaticCell<[u8; 512]> = StaticCell::new();

fn coprocessor_uart(r: CoprocessorResources) -> BufferedUart {
    let mut config = UartConfig::default();
    config.baudrate = radio_bridge::BAUD_RATE;
    let tx_buffer = UART_TX_BUFFER.init([0; 512]);
    let rx_buffer = UART_RX_BUFFER.init([0; 512]);
    BufferedUart::new(r.uart, r.tx_pin, r.rx_pin, Irqs, tx_buffer, rx_buffer, config)
}

/// Firmware entry point
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let p = embassy_rp::init(Config::default());

    // The ADC is shared, so it is set up before any task can ask for it
    resources::init_adc(p.ADC);

    let r = split_resources!(p);
    let i2c_bus = resources::init_i2c(r.imu);

    let mut store = ParamStore::new(r.storage);
    let params = store.load_params().await;
    let group = store.load_group_config().await;
    info!("Booting as {}", group);

    let link: &'static ConvoyLink = CONVOY_LINK.init(ConvoyLink::new(group, system::now_ms()));

    let (tx, rx) = coprocessor_uart(r.coprocessor).split();
    spawner.spawn(radio_bridge_rx(rx, link)).unwrap();
    spawner.spawn(radio_bridge_tx(tx)).unwrap();
    spawner.spawn(flash_storage(store)).unwrap();
    spawner.spawn(imu_read(i2c_bus)).unwrap();
    spawner.spawn(encoder_read(r.motor_encoders)).unwrap();
    spawner.spawn(battery_charge_read(r.battery_charge)).unwrap();
    spawner.spawn(telemetry()).unwrap();

    let mut radio = if group.link_requested() {
        UartRadio::connect().await
    } else {
        UartRadio::offline()
    };
    if let Err(e) = link.initialize(&mut radio) {
        error!("Convoy disabled for this boot: {}", e);
    }

    spawner.spawn(balance_control(link, radio, params, r.motor_driver)).unwrap();
}
