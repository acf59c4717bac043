//! Balance and convoy logic for a two-wheeled self-balancing robot
//!
//! Everything in here is hardware independent: the firmware in `main.rs` feeds
//! sensor readings in and takes motor duty values out once per control tick.
//! Keeping it free of peripherals lets the whole control and convoy path run in
//! host unit tests.
//!
//! # Modules
//! - [`protocol`]: XOR checksum, convoy wire packets and the co-processor link frames
//! - [`convoy`]: group configuration, radio abstraction and the convoy link
//! - [`control`]: PID cascade, fall detection, joystick filtering and the motion arbiter
//! - [`state`]: the robot state owned by the control task
//! - [`params`]: persisted tuning parameters
//! - [`telemetry`]: snapshots pushed to the UI bridge

#![cfg_attr(target_os = "none", no_std)]

#[macro_use]
mod fmt;

pub mod control;
pub mod convoy;
pub mod params;
pub mod protocol;
pub mod state;
pub mod telemetry;

/// Control tick period in milliseconds
pub const CONTROL_TICK_MS: u32 = 2;

/// Control tick period in seconds, used as the PID time step
pub const CONTROL_DT: f32 = CONTROL_TICK_MS as f32 / 1000.0;
