//! Device-side collaborator traits.
//!
//! The firmware logic in `sdrlink-firmware` never touches hardware directly.
//! Everything it needs from the board -- register access, SPI and I2C
//! masters, the network stack, the packet controller, the sample framer,
//! LEDs, the UART message channel, and the interrupt controller -- is
//! expressed here as a small synchronous trait. A concrete board (or the
//! `MockBoard` in `sdrlink-test-harness`) implements all of them and is
//! handed to the firmware as a single [`Board`].
//!
//! All methods are non-blocking: the device runs a single cooperative
//! polling loop and every call must return promptly.

use std::net::{Ipv4Addr, SocketAddrV4};

use crate::types::MacAddr;

// ---------------------------------------------------------------------------
// Registers
// ---------------------------------------------------------------------------

/// Memory-mapped FPGA register access.
pub trait RegisterBus {
    /// Read a 32-bit register.
    fn peek32(&mut self, addr: u32) -> u32;
    /// Write a 32-bit register.
    fn poke32(&mut self, addr: u32, value: u32);
    /// Read a 16-bit register.
    fn peek16(&mut self, addr: u32) -> u16;
    /// Write a 16-bit register.
    fn poke16(&mut self, addr: u32, value: u16);
}

// ---------------------------------------------------------------------------
// SPI / I2C / VCTCXO
// ---------------------------------------------------------------------------

/// Whether an SPI transaction reads data back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpiTransfer {
    /// Write only; the returned word is meaningless.
    TxOnly,
    /// Write and capture the MISO word.
    TxRx,
}

/// SPI clock-edge flags understood by the SPI master.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpiFlags(pub u32);

impl SpiFlags {
    /// Push MOSI data on the rising SCLK edge.
    pub const PUSH_RISE: SpiFlags = SpiFlags(0);
    /// Push MOSI data on the falling SCLK edge.
    pub const PUSH_FALL: SpiFlags = SpiFlags(1 << 10);
    /// Latch MISO data on the rising SCLK edge.
    pub const LATCH_RISE: SpiFlags = SpiFlags(0);
    /// Latch MISO data on the falling SCLK edge.
    pub const LATCH_FALL: SpiFlags = SpiFlags(1 << 9);

    /// Combine two flag sets.
    pub const fn union(self, other: SpiFlags) -> SpiFlags {
        SpiFlags(self.0 | other.0)
    }

    /// True when MOSI is pushed on the falling edge.
    pub fn pushes_on_fall(&self) -> bool {
        self.0 & Self::PUSH_FALL.0 != 0
    }

    /// True when MISO is latched on the falling edge.
    pub fn latches_on_fall(&self) -> bool {
        self.0 & Self::LATCH_FALL.0 != 0
    }
}

/// SPI bus master.
pub trait SpiMaster {
    /// Run one transaction of `num_bits` bits against slave `dev`.
    fn transact(
        &mut self,
        transfer: SpiTransfer,
        dev: u32,
        data: u32,
        num_bits: u8,
        flags: SpiFlags,
    ) -> u32;
}

/// I2C bus master.
pub trait I2cMaster {
    /// Read `buf.len()` bytes from the device at `addr`. Returns false on NAK.
    fn i2c_read(&mut self, addr: u8, buf: &mut [u8]) -> bool;
    /// Write `buf` to the device at `addr`. Returns false on NAK.
    fn i2c_write(&mut self, addr: u8, buf: &[u8]) -> bool;
}

/// Reference oscillator trim DAC (UmTRX boards only).
pub trait VctcxoDac {
    /// Current DAC setting.
    fn vctcxo_dac(&self) -> u16;
    /// Program a new DAC setting.
    fn set_vctcxo_dac(&mut self, value: u16);
}

// ---------------------------------------------------------------------------
// Network stack and packet path
// ---------------------------------------------------------------------------

/// A decoded inbound network event, as produced by the network stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetEvent {
    /// A UDP datagram addressed to one of our ports.
    Udp {
        /// Sender endpoint.
        src: SocketAddrV4,
        /// Our endpoint.
        dst: SocketAddrV4,
        /// Datagram payload.
        payload: Vec<u8>,
    },
    /// An ICMP destination-unreachable report for a datagram we sent.
    ///
    /// `src` is *our* endpoint (the original datagram's source), `dst` the
    /// peer that could not be reached.
    Unreachable {
        /// Our endpoint that originated the failed datagram.
        src: SocketAddrV4,
        /// The unreachable peer.
        dst: SocketAddrV4,
    },
}

/// IPv4/UDP network stack (ARP cache, IP address, UDP transmit).
pub trait NetStack {
    /// Our current IPv4 address.
    fn ip_addr(&self) -> Ipv4Addr;
    /// Replace our IPv4 address.
    fn set_ip_addr(&mut self, addr: Ipv4Addr);
    /// Our Ethernet address.
    fn mac_addr(&self) -> MacAddr;
    /// Look up a peer in the ARP cache.
    fn arp_lookup(&self, ip: Ipv4Addr) -> Option<MacAddr>;
    /// Decode a raw Ethernet frame handed over by the packet controller.
    ///
    /// Returns `None` for frames the stack consumed itself (ARP, ICMP echo)
    /// or could not decode.
    fn decode_frame(&mut self, frame: &[u8]) -> Option<NetEvent>;
    /// Send a UDP datagram from our port `src_port`.
    fn send_udp(&mut self, src_port: u16, dst: SocketAddrV4, payload: &[u8]);
    /// Announce our address with a gratuitous ARP.
    fn send_gratuitous_arp(&mut self);
}

/// Forwarding policy for inbound non-IP traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingMode {
    /// Link is up; this device is the radio master.
    Master,
    /// Link is down or not yet negotiated.
    Slave,
}

/// The packet controller that owns inbound frame buffers.
pub trait PacketController {
    /// Claim the next inbound frame, if any.
    fn claim_incoming(&mut self) -> Option<Vec<u8>>;
    /// Release the most recently claimed frame back to the hardware.
    fn release_incoming(&mut self);
    /// Switch the device-wide routing mode.
    fn set_routing_mode(&mut self, mode: RoutingMode);
}

/// Parameters programmed into the hardware sample framer for one lane.
///
/// Outbound sample packets travel from the device endpoint to the peer, so
/// the framer sees the inbound flow's source and destination swapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramerConfig {
    /// Link address of the host receiving the samples.
    pub peer_mac: MacAddr,
    /// Our own link address.
    pub own_mac: MacAddr,
    /// UDP source of outbound sample packets (the device endpoint).
    pub device: SocketAddrV4,
    /// UDP destination of outbound sample packets (the host endpoint).
    pub peer: SocketAddrV4,
    /// DSP lane index.
    pub lane: usize,
}

/// Hardware sample framer.
pub trait Framer {
    /// Program the framer for one DSP lane.
    fn setup_framer(&mut self, config: &FramerConfig);
}

// ---------------------------------------------------------------------------
// Board
// ---------------------------------------------------------------------------

/// RJ45 orange LED bit.
pub const LED_RJ45_ORANGE: u8 = 0x01;
/// RJ45 green LED bit.
pub const LED_RJ45_GREEN: u8 = 0x02;

/// Status LEDs.
pub trait Leds {
    /// Set the LEDs selected by `mask` to the corresponding bits of `value`.
    fn set_leds(&mut self, value: u8, mask: u8);
}

/// The low-rate UART-over-UDP message channel.
pub trait UartChannel {
    /// Service pending UART traffic without blocking.
    fn poll_uart(&mut self);
}

/// The interrupt controller bookkeeping hook.
pub trait InterruptController {
    /// Acknowledge and dispatch pending interrupts without blocking.
    fn service_interrupts(&mut self);
}

/// Everything the firmware needs from a concrete board.
///
/// SPI, I2C, and the VCTCXO DAC are optional: builds without them return
/// `None` and the corresponding control opcodes are not registered.
pub trait Board:
    RegisterBus + NetStack + PacketController + Framer + Leds + UartChannel + InterruptController
{
    /// The SPI master, if this board has one.
    fn spi(&mut self) -> Option<&mut dyn SpiMaster> {
        None
    }

    /// The I2C master, if this board has one.
    fn i2c(&mut self) -> Option<&mut dyn I2cMaster> {
        None
    }

    /// The VCTCXO DAC, if this board has one.
    fn vctcxo(&mut self) -> Option<&mut dyn VctcxoDac> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spi_flags_union() {
        let f = SpiFlags::PUSH_FALL.union(SpiFlags::LATCH_RISE);
        assert!(f.pushes_on_fall());
        assert!(!f.latches_on_fall());

        let g = SpiFlags::PUSH_RISE.union(SpiFlags::LATCH_FALL);
        assert!(!g.pushes_on_fall());
        assert!(g.latches_on_fall());
    }
}
