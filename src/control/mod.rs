//! Balance control
//!
//! - [`pid`]: a single PID loop
//! - [`cascade`]: the four standalone balance loops and their mixing
//! - [`fall`]: debounced fall detection
//! - [`joystick`]: conditioning of raw UI joystick frames
//! - [`arbiter`]: the per-tick choice between cascade, joystick and leader duty

pub mod arbiter;
pub mod cascade;
pub mod fall;
pub mod joystick;
pub mod pid;

pub use arbiter::{leader_mix, DutySource, MotionArbiter, MotorOutput};
pub use cascade::PidCascade;
pub use fall::FallDetector;
pub use pid::{Pid, PidGains, PidState};
