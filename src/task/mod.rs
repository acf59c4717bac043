pub mod balance_control;
pub mod battery_charge_read;
pub mod encoder_read;
pub mod flash_storage;
pub mod imu_read;
pub mod motor_driver;
pub mod radio_bridge;
pub mod telemetry;
