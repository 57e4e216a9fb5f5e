//! Device event loop.
//!
//! [`Firmware`] owns the board and steps a fixed, ordered list of
//! non-blocking sources on every iteration:
//!
//! 1. one inbound frame (claim, handle, release),
//! 2. the low-rate UART message channel,
//! 3. the interrupt controller.
//!
//! Inbound frames are either address-recovery frames, applied on the spot,
//! or frames for the network stack, which decodes them into UDP datagrams
//! or destination-unreachable reports. Those are routed by port to the
//! registered listener: the control port goes to the [`Dispatcher`], the
//! four receive data ports go to the [`DataRouter`].

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddrV4};

use sdrlink_core::hal::{
    Board, InterruptController, LED_RJ45_GREEN, LED_RJ45_ORANGE, Leds, NetEvent, NetStack,
    PacketController, RoutingMode, UartChannel,
};
use sdrlink_wire::control::FW_COMPAT_NUM;
use sdrlink_wire::ports::{CTRL_PORT, RX_DSP_PORTS};

use crate::dispatcher::{Capabilities, Dispatcher};
use crate::router::{DataRouter, RouteOutcome};

/// Ethertype of an address-recovery frame.
pub const RECOVERY_ETHERTYPE: u16 = 0xBEEE;

/// Code carried by an address-recovery frame.
pub const RECOVERY_CODE: &[u8; 4] = b"addr";

/// Inbound frames carry two bytes of alignment padding before the
/// Ethernet header.
const ETH_PAD: usize = 2;
const ETHERTYPE_OFFSET: usize = ETH_PAD + 12;
const RECOVERY_CODE_OFFSET: usize = ETHERTYPE_OFFSET + 2;
const RECOVERY_IP_OFFSET: usize = RECOVERY_CODE_OFFSET + 4;

/// Parse an address-recovery frame, returning the new device address.
pub fn parse_recovery_frame(frame: &[u8]) -> Option<Ipv4Addr> {
    let ip = frame.get(RECOVERY_IP_OFFSET..RECOVERY_IP_OFFSET + 4)?;
    let ethertype = u16::from_be_bytes([frame[ETHERTYPE_OFFSET], frame[ETHERTYPE_OFFSET + 1]]);
    if ethertype != RECOVERY_ETHERTYPE
        || &frame[RECOVERY_CODE_OFFSET..RECOVERY_CODE_OFFSET + 4] != RECOVERY_CODE
    {
        return None;
    }
    Some(Ipv4Addr::new(ip[0], ip[1], ip[2], ip[3]))
}

/// Build an address-recovery frame carrying `ip`.
pub fn build_recovery_frame(ip: Ipv4Addr) -> Vec<u8> {
    let mut frame = vec![0u8; RECOVERY_IP_OFFSET + 4];
    // Broadcast destination, zero source.
    frame[ETH_PAD..ETH_PAD + 6].fill(0xFF);
    frame[ETHERTYPE_OFFSET..ETHERTYPE_OFFSET + 2].copy_from_slice(&RECOVERY_ETHERTYPE.to_be_bytes());
    frame[RECOVERY_CODE_OFFSET..RECOVERY_CODE_OFFSET + 4].copy_from_slice(RECOVERY_CODE);
    frame[RECOVERY_IP_OFFSET..].copy_from_slice(&ip.octets());
    frame
}

/// A registered UDP listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Listener {
    Control,
    Data,
}

/// One pollable source of the event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PollSource {
    Inbound,
    Uart,
    Interrupts,
}

const POLL_ORDER: [PollSource; 3] = [PollSource::Inbound, PollSource::Uart, PollSource::Interrupts];

/// The device firmware.
pub struct Firmware<B: Board> {
    board: B,
    dispatcher: Dispatcher,
    router: DataRouter,
    listeners: HashMap<u16, Listener>,
}

impl<B: Board> Firmware<B> {
    /// Bring up the firmware on `board`.
    ///
    /// Registers the control and data listeners and puts the packet
    /// controller in slave routing mode until the link comes up.
    pub fn new(mut board: B, capabilities: Capabilities) -> Self {
        tracing::info!(
            compat = FW_COMPAT_NUM,
            mac = %board.mac_addr(),
            ip = %board.ip_addr(),
            "Firmware starting"
        );

        let mut listeners = HashMap::new();
        listeners.insert(CTRL_PORT, Listener::Control);
        for port in RX_DSP_PORTS {
            listeners.insert(port, Listener::Data);
        }

        board.set_routing_mode(RoutingMode::Slave);

        Firmware {
            board,
            dispatcher: Dispatcher::new(capabilities),
            router: DataRouter,
            listeners,
        }
    }

    /// The board.
    pub fn board(&self) -> &B {
        &self.board
    }

    /// The board, mutably.
    pub fn board_mut(&mut self) -> &mut B {
        &mut self.board
    }

    /// The control dispatcher.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Run one iteration of the event loop.
    pub fn poll_once(&mut self) {
        for source in POLL_ORDER {
            match source {
                PollSource::Inbound => {
                    if let Some(frame) = self.board.claim_incoming() {
                        self.handle_frame(&frame);
                        self.board.release_incoming();
                    }
                }
                PollSource::Uart => self.board.poll_uart(),
                PollSource::Interrupts => self.board.service_interrupts(),
            }
        }
    }

    /// Run the event loop until power-off.
    pub fn run(mut self) -> ! {
        loop {
            self.poll_once();
        }
    }

    /// Ethernet link state change. `speed` is in Mbit/s; 0 means down.
    pub fn link_changed(&mut self, speed: u32) {
        tracing::info!(speed, "Ethernet link changed");
        if speed != 0 {
            let led = if speed == 1000 {
                LED_RJ45_ORANGE
            } else {
                LED_RJ45_GREEN
            };
            self.board.set_leds(led, led);
            self.board.set_routing_mode(RoutingMode::Master);
            self.board.send_gratuitous_arp();
        } else {
            self.board.set_leds(0, LED_RJ45_ORANGE);
            self.board.set_leds(0, LED_RJ45_GREEN);
            self.board.set_routing_mode(RoutingMode::Slave);
        }
    }

    fn handle_frame(&mut self, frame: &[u8]) {
        if let Some(ip) = parse_recovery_frame(frame) {
            tracing::info!(%ip, "Address recovery frame");
            self.board.set_ip_addr(ip);
            return;
        }

        match self.board.decode_frame(frame) {
            Some(NetEvent::Udp { src, dst, payload }) => {
                self.dispatch_udp(src, dst, Some(payload.as_slice()));
            }
            Some(NetEvent::Unreachable { src, dst }) => {
                // Keyed by our own port, the source of the failed datagram.
                match self.listeners.get(&src.port()) {
                    Some(Listener::Data) => {
                        self.router.handle(&mut self.board, src, dst, None);
                    }
                    Some(Listener::Control) => {
                        tracing::debug!(peer = %dst, "Control peer unreachable");
                    }
                    None => {}
                }
            }
            None => {}
        }
    }

    fn dispatch_udp(&mut self, src: SocketAddrV4, dst: SocketAddrV4, payload: Option<&[u8]>) {
        match self.listeners.get(&dst.port()) {
            Some(Listener::Control) => {
                let request = payload.unwrap_or_default();
                let reply = self.dispatcher.handle(&mut self.board, request, src);
                self.board.send_udp(CTRL_PORT, reply.dest, &reply.bytes);
            }
            Some(Listener::Data) => {
                if let RouteOutcome::Ignored = self.router.handle(&mut self.board, src, dst, payload) {
                    tracing::trace!(%src, %dst, "Data port datagram ignored");
                }
            }
            None => {
                tracing::trace!(%src, %dst, "No listener for port");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovery_frame_round_trip() {
        let ip = Ipv4Addr::new(192, 168, 10, 9);
        let frame = build_recovery_frame(ip);
        assert_eq!(frame.len(), 24);
        assert_eq!(&frame[14..16], &[0xBE, 0xEE]);
        assert_eq!(parse_recovery_frame(&frame), Some(ip));
    }

    #[test]
    fn recovery_frame_rejects() {
        let mut frame = build_recovery_frame(Ipv4Addr::new(1, 2, 3, 4));
        assert_eq!(parse_recovery_frame(&frame[..20]), None);

        frame[16] = b'x';
        assert_eq!(parse_recovery_frame(&frame), None);

        let mut frame = build_recovery_frame(Ipv4Addr::new(1, 2, 3, 4));
        frame[15] = 0x00;
        assert_eq!(parse_recovery_frame(&frame), None);
    }
}
