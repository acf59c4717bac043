//! UART bridge to the radio co-processor
//!
//! The RP2350 has no radio of its own. A small ESP32 sits on UART0 and does
//! two jobs: it is the ESP-NOW radio for the convoy, and it serves the WiFi
//! UI. Both directions carry the same checksummed frames (see
//! [`balance_convoy::protocol::link_frame`]).
//!
//! - [`radio_bridge_rx`] parses incoming frames and routes them: radio
//!   datagrams into the convoy link, UI commands to the control task
//! - [`radio_bridge_tx`] drains the outbound queue onto the wire
//! - [`UartRadio`] is the [`ConvoyRadio`] the control task talks to; it never
//!   blocks, frames go into the outbound queue or are dropped

use balance_convoy::convoy::{ConvoyLink, ConvoyRadio, ReceiveOutcome};
use balance_convoy::protocol::link_frame::{Inbound, Outbound, Parser, RadioPayload};
use balance_convoy::protocol::MacAddress;
use defmt::{debug, info, warn, Format};
use embassy_rp::uart::{BufferedUartRx, BufferedUartTx};
use embassy_time::{with_timeout, Duration};
use embedded_io_async::{Read, Write};

use crate::system::channels::{
    try_request_storage, try_send_outbound, RadioStatus, StorageRequest, CONTROL_COMMANDS, OUTBOUND, RADIO_STATUS,
};
use crate::system::now_ms;

/// How long the co-processor gets to answer a radio init request
const RADIO_INIT_TIMEOUT: Duration = Duration::from_secs(1);

/// UART baud rate; a leader pushes one radio frame every control tick
pub const BAUD_RATE: u32 = 921_600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub enum RadioError {
    /// The co-processor did not report a working radio
    NotResponding,
    /// Outbound queue full, frame dropped
    QueueFull,
    PayloadTooLong,
}

/// Convoy radio reached through the co-processor
pub struct UartRadio {
    status: Option<RadioStatus>,
}

impl UartRadio {
    /// Asks the co-processor to bring up its radio and waits for the answer
    ///
    /// The RX bridge task must already be running.
    pub async fn connect() -> Self {
        RADIO_STATUS.reset();
        OUTBOUND.send(Outbound::RadioInit).await;

        match with_timeout(RADIO_INIT_TIMEOUT, RADIO_STATUS.wait()).await {
            Ok(status) => {
                info!("Co-processor radio up: {}, address {}", status.ok, status.local);
                Self { status: Some(status) }
            }
            Err(_) => {
                warn!("Co-processor did not answer radio init");
                Self { status: None }
            }
        }
    }

    /// A radio that refuses everything, for standalone boots
    pub fn offline() -> Self {
        Self { status: None }
    }
}

impl ConvoyRadio for UartRadio {
    type Error = RadioError;

    fn init(&mut self) -> Result<(), RadioError> {
        match self.status {
            Some(RadioStatus { ok: true, .. }) => Ok(()),
            _ => Err(RadioError::NotResponding),
        }
    }

    fn add_peer(&mut self, peer: MacAddress) -> Result<(), RadioError> {
        if try_send_outbound(Outbound::AddPeer(peer)) {
            Ok(())
        } else {
            Err(RadioError::QueueFull)
        }
    }

    fn send(&mut self, peer: MacAddress, payload: &[u8]) -> Result<(), RadioError> {
        let payload = RadioPayload::from_slice(payload).map_err(|_| RadioError::PayloadTooLong)?;
        if try_send_outbound(Outbound::RadioTx { dest: peer, payload }) {
            Ok(())
        } else {
            Err(RadioError::QueueFull)
        }
    }

    fn local_address(&self) -> MacAddress {
        self.status.map(|status| status.local).unwrap_or_default()
    }
}

async fn dispatch(inbound: Inbound, link: &ConvoyLink) {
    match inbound {
        Inbound::RadioRx { sender, payload } => {
            let outcome = link.on_packet_received(sender, &payload, now_ms());
            if !matches!(outcome, ReceiveOutcome::Accepted(_)) {
                debug!("Datagram from {} ignored: {}", sender, outcome);
            }
        }
        Inbound::RadioStatus { ok, local } => RADIO_STATUS.signal(RadioStatus { ok, local }),
        Inbound::Control(command) => CONTROL_COMMANDS.send(command).await,
        Inbound::GroupConfigSet(config) => {
            info!("New group config {}, takes effect after reboot", config);
            try_request_storage(StorageRequest::SaveGroupConfig(config));
        }
        Inbound::RoleSet { role, leader_mac } => {
            let config = link.set_role(role, leader_mac);
            try_request_storage(StorageRequest::SaveGroupConfig(config));
        }
        Inbound::GroupConfigGet => {
            try_send_outbound(Outbound::GroupConfigReport {
                config: link.config(),
                local: link.local_address(),
                ready: link.is_ready(),
            });
        }
    }
}

/// Parses co-processor frames and routes them
#[embassy_executor::task]
pub async fn radio_bridge_rx(mut rx: BufferedUartRx, link: &'static ConvoyLink) {
    info!("Radio bridge RX started");
    let mut parser = Parser::new();
    let mut chunk = [0u8; 64];

    loop {
        match rx.read(&mut chunk).await {
            Ok(n) => {
                for &byte in &chunk[..n] {
                    match parser.push(byte) {
                        Some(Ok(inbound)) => dispatch(inbound, link).await,
                        Some(Err(e)) => debug!("Frame dropped: {}", e),
                        None => {}
                    }
                }
            }
            Err(e) => {
                warn!("UART RX error: {:?}", e);
                parser = Parser::new();
            }
        }
    }
}

/// Writes queued frames to the co-processor
#[embassy_executor::task]
pub async fn radio_bridge_tx(mut tx: BufferedUartTx) {
    info!("Radio bridge TX started");

    loop {
        let frame = OUTBOUND.receive().await;
        let bytes = match frame.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Frame 0x{:02x} not encodable: {}", frame.id(), e);
                continue;
            }
        };
        if let Err(e) = tx.write_all(&bytes).await {
            warn!("UART TX error: {:?}", e);
        }
    }
}
