//! Peer radio abstraction
//!
//! The convoy link only needs a handful of operations from the radio. None of
//! them may block: the control tick calls [`ConvoyRadio::send`] every 2 ms.

use crate::protocol::MacAddress;

/// Short-range, connectionless peer radio (ESP-NOW style)
pub trait ConvoyRadio {
    type Error;

    /// Brings the radio up; called once before any peer is registered
    fn init(&mut self) -> Result<(), Self::Error>;

    /// Adds an entry to the radio peer table
    fn add_peer(&mut self, peer: MacAddress) -> Result<(), Self::Error>;

    /// Queues one datagram for transmission, fire-and-forget
    fn send(&mut self, peer: MacAddress, payload: &[u8]) -> Result<(), Self::Error>;

    /// Hardware address of this robot
    fn local_address(&self) -> MacAddress;
}
