//! Hardware Resource Management
//!
//! Assigns pins and peripherals to the tasks that own them, so every piece of
//! hardware has exactly one owner.
//!
//! # Resource Groups
//! - IMU: ICM-20948 on I2C0
//! - Motor Control: TB6612FNG dual driver pins and PWM slices
//! - Motor Encoders: PWM slices counting encoder pulses
//! - Co-processor: UART0 to the ESP-NOW/WiFi bridge
//! - Battery Monitor: system voltage pin
//! - Storage: on-board flash and its DMA channel
//!
//! # Shared Resources
//! The ADC and the I2C bus sit behind async mutexes.

use assign_resources::assign_resources;
use embassy_embedded_hal::shared_bus::asynch::i2c::I2cDevice;
use embassy_rp::adc::{Adc, Async as AdcAsync, InterruptHandler as AdcInterruptHandler};
use embassy_rp::bind_interrupts;
use embassy_rp::i2c::{Async as I2cAsync, Config as I2cConfig, I2c, InterruptHandler as I2cInterruptHandler};
use embassy_rp::peripherals::{self, I2C0, UART0};
use embassy_rp::uart::BufferedInterruptHandler;
use embassy_rp::Peri;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use static_cell::StaticCell;

/// I2C bus shared between devices on I2C0
pub type I2cBusShared = Mutex<CriticalSectionRawMutex, I2c<'static, I2C0, I2cAsync>>;

/// One device on the shared I2C bus
pub type I2cBusDevice = I2cDevice<'static, CriticalSectionRawMutex, I2c<'static, I2C0, I2cAsync>>;

/// Global ADC instance protected by a mutex
static ADC: Mutex<CriticalSectionRawMutex, Option<Adc<'static, AdcAsync>>> = Mutex::new(None);

static I2C_BUS: StaticCell<I2cBusShared> = StaticCell::new();

/// Initializes the ADC; call once from main before spawning tasks
pub fn init_adc(adc: Peri<'static, peripherals::ADC>) {
    let adc = Adc::new(adc, Irqs, embassy_rp::adc::Config::default());
    if let Ok(mut slot) = ADC.try_lock() {
        *slot = Some(adc);
    }
}

/// Returns the protected ADC instance
pub fn get_adc() -> &'static Mutex<CriticalSectionRawMutex, Option<Adc<'static, AdcAsync>>> {
    &ADC
}

/// Brings up I2C0 in fast mode (400 kHz) and hands out the shared bus
///
/// Call once from main; the IMU needs fast mode to keep up with the 2 ms tick.
pub fn init_i2c(r: ImuResources) -> &'static I2cBusShared {
    let mut config = I2cConfig::default();
    config.frequency = 400_000;
    let i2c = I2c::new_async(r.i2c, r.scl, r.sda, Irqs, config);
    I2C_BUS.init(Mutex::new(i2c))
}

assign_resources! {
    /// ICM-20948 9-axis IMU
    imu: ImuResources {
        i2c: I2C0,
        scl: PIN_13,
        sda: PIN_12,
    },
    /// Battery voltage monitoring pin
    battery_charge: BatteryChargeResources {
        vsys_pin: PIN_29,
    },
    /// TB6612FNG dual motor driver pins and PWM channels
    motor_driver: MotorDriverResources {
        standby_pin: PIN_22,
        // Motor drive PWM
        left_slice: PWM_SLICE6,
        left_pwm_pin: PIN_28,
        left_forward_pin: PIN_21,
        left_backward_pin: PIN_20,
        // Motor drive PWM
        right_slice: PWM_SLICE5,
        right_pwm_pin: PIN_27,
        right_forward_pin: PIN_19,
        right_backward_pin: PIN_18,
    },
    /// Motor encoder PWM input channels
    motor_encoders: MotorEncoderResources {
        left_encoder_slice: PWM_SLICE3,
        left_encoder_pin: PIN_7,
        right_encoder_slice: PWM_SLICE4,
        right_encoder_pin: PIN_9,
    },
    /// UART to the radio/UI co-processor
    coprocessor: CoprocessorResources {
        uart: UART0,
        tx_pin: PIN_0,
        rx_pin: PIN_1,
    },
    /// Parameter and group configuration storage
    storage: StorageResources {
        flash: FLASH,
        dma: DMA_CH0,
    },
}

bind_interrupts!(pub struct Irqs {
    ADC_IRQ_FIFO => AdcInterruptHandler;
    I2C0_IRQ => I2cInterruptHandler<I2C0>;
    UART0_IRQ => BufferedInterruptHandler<UART0>;
});
