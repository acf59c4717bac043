//! Leader/follower convoy
//!
//! A leader teleoperates and broadcasts motor duty commands every control tick;
//! followers apply whatever the leader sent and report back with heartbeats.
//! The role is configuration, not runtime state: changing it means saving a new
//! [`GroupConfig`] and rebooting so the radio peer table is rebuilt.

pub mod config;
pub mod link;
pub mod radio;

pub use config::{GroupConfig, Role};
pub use link::{ConvoyLink, FollowerInfo, LinkError, ReceiveOutcome};
pub use radio::ConvoyRadio;
