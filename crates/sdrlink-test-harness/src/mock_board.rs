//! Mock device board for deterministic testing of the firmware logic.
//!
//! [`MockBoard`] implements every collaborator trait in
//! [`sdrlink_core::hal`] with in-memory state and call logs. Tests load
//! inbound frames (optionally paired with the [`NetEvent`] the network
//! stack should decode them into), step the firmware, and then inspect
//! what the firmware did: register writes, datagrams sent, framer
//! programming, LED and routing changes.
//!
//! # Example
//!
//! ```
//! use sdrlink_test_harness::MockBoard;
//! use sdrlink_core::hal::RegisterBus;
//!
//! let mut board = MockBoard::new();
//! board.poke32(0xD080, 7);
//! assert_eq!(board.peek32(0xD080), 7);
//! assert_eq!(board.pokes(), &[(0xD080, 7)]);
//! ```

use std::collections::{HashMap, VecDeque};
use std::net::{Ipv4Addr, SocketAddrV4};

use sdrlink_core::hal::{
    Board, Framer, FramerConfig, I2cMaster, InterruptController, Leds, NetEvent, NetStack,
    PacketController, RegisterBus, RoutingMode, SpiFlags, SpiMaster, SpiTransfer, UartChannel,
    VctcxoDac,
};
use sdrlink_core::MacAddr;

/// Default IPv4 address of a fresh [`MockBoard`].
pub const MOCK_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 10, 2);

/// Default MAC address of a fresh [`MockBoard`].
pub const MOCK_MAC: MacAddr = MacAddr([0x00, 0x50, 0xC2, 0x85, 0x3F, 0x01]);

/// A datagram the firmware asked the network stack to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentDatagram {
    /// Our source port.
    pub src_port: u16,
    /// Destination endpoint.
    pub dst: SocketAddrV4,
    /// Datagram payload.
    pub payload: Vec<u8>,
}

/// One recorded SPI transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpiCall {
    /// Transfer direction.
    pub transfer: SpiTransfer,
    /// Slave device id.
    pub dev: u32,
    /// Word shifted out.
    pub data: u32,
    /// Transaction length in bits.
    pub num_bits: u8,
    /// Clock-edge flags.
    pub flags: SpiFlags,
}

/// In-memory SPI master that records transactions.
#[derive(Debug, Default)]
pub struct MockSpi {
    /// Word returned from every TX/RX transaction.
    pub readback: u32,
    /// Every transaction, in order.
    pub calls: Vec<SpiCall>,
}

impl SpiMaster for MockSpi {
    fn transact(
        &mut self,
        transfer: SpiTransfer,
        dev: u32,
        data: u32,
        num_bits: u8,
        flags: SpiFlags,
    ) -> u32 {
        self.calls.push(SpiCall {
            transfer,
            dev,
            data,
            num_bits,
            flags,
        });
        match transfer {
            SpiTransfer::TxOnly => 0,
            SpiTransfer::TxRx => self.readback,
        }
    }
}

/// In-memory I2C bus with per-address device contents.
#[derive(Debug, Default)]
pub struct MockI2c {
    /// Bytes returned by reads, keyed by device address. Reads from an
    /// address not present here NAK.
    pub devices: HashMap<u8, Vec<u8>>,
    /// Every write, in order.
    pub writes: Vec<(u8, Vec<u8>)>,
}

impl I2cMaster for MockI2c {
    fn i2c_read(&mut self, addr: u8, buf: &mut [u8]) -> bool {
        let Some(contents) = self.devices.get(&addr) else {
            return false;
        };
        for (i, b) in buf.iter_mut().enumerate() {
            *b = contents.get(i).copied().unwrap_or(0);
        }
        true
    }

    fn i2c_write(&mut self, addr: u8, buf: &[u8]) -> bool {
        self.writes.push((addr, buf.to_vec()));
        true
    }
}

/// In-memory reference-oscillator DAC.
#[derive(Debug, Default)]
pub struct MockVctcxo {
    /// Current DAC setting.
    pub value: u16,
}

impl VctcxoDac for MockVctcxo {
    fn vctcxo_dac(&self) -> u16 {
        self.value
    }

    fn set_vctcxo_dac(&mut self, value: u16) {
        self.value = value;
    }
}

/// A mock [`Board`] with in-memory collaborators and call logs.
#[derive(Debug)]
pub struct MockBoard {
    regs: HashMap<u32, u32>,
    pokes: Vec<(u32, u32)>,

    ip: Ipv4Addr,
    mac: MacAddr,
    arp: HashMap<Ipv4Addr, MacAddr>,
    sent: Vec<SentDatagram>,
    gratuitous_arps: usize,

    inbound: VecDeque<(Vec<u8>, Option<NetEvent>)>,
    current_event: Option<NetEvent>,
    claimed: bool,
    released: usize,
    routing_modes: Vec<RoutingMode>,

    framers: Vec<FramerConfig>,
    leds: u8,
    led_calls: Vec<(u8, u8)>,

    /// Order in which the polled sources were serviced.
    poll_log: Vec<&'static str>,

    /// Optional SPI master. `None` means the board has no SPI.
    pub spi: Option<MockSpi>,
    /// Optional I2C master. `None` means the board has no I2C.
    pub i2c: Option<MockI2c>,
    /// Optional VCTCXO DAC. `None` means the board has no trim DAC.
    pub vctcxo: Option<MockVctcxo>,
}

impl MockBoard {
    /// A board with SPI and I2C, no VCTCXO, the default address, and an
    /// empty ARP cache.
    pub fn new() -> Self {
        MockBoard {
            regs: HashMap::new(),
            pokes: Vec::new(),
            ip: MOCK_IP,
            mac: MOCK_MAC,
            arp: HashMap::new(),
            sent: Vec::new(),
            gratuitous_arps: 0,
            inbound: VecDeque::new(),
            current_event: None,
            claimed: false,
            released: 0,
            routing_modes: Vec::new(),
            framers: Vec::new(),
            leds: 0,
            led_calls: Vec::new(),
            poll_log: Vec::new(),
            spi: Some(MockSpi::default()),
            i2c: Some(MockI2c::default()),
            vctcxo: None,
        }
    }

    /// Add an entry to the ARP cache.
    pub fn add_arp_entry(&mut self, ip: Ipv4Addr, mac: MacAddr) {
        self.arp.insert(ip, mac);
    }

    /// Queue a raw inbound frame that the network stack will not decode.
    pub fn push_frame(&mut self, frame: Vec<u8>) {
        self.inbound.push_back((frame, None));
    }

    /// Queue an inbound frame that the network stack decodes into `event`.
    pub fn push_net_event(&mut self, event: NetEvent) {
        self.inbound.push_back((vec![0u8; 64], Some(event)));
    }

    /// Preload an FPGA register without logging a poke.
    pub fn set_register(&mut self, addr: u32, value: u32) {
        self.regs.insert(addr, value);
    }

    /// Current value of an FPGA register (0 if never written).
    pub fn register(&self, addr: u32) -> u32 {
        self.regs.get(&addr).copied().unwrap_or(0)
    }

    /// Every register write, in order, as `(addr, value)`.
    pub fn pokes(&self) -> &[(u32, u32)] {
        &self.pokes
    }

    /// Every datagram sent, in order.
    pub fn sent(&self) -> &[SentDatagram] {
        &self.sent
    }

    /// Remove and return every datagram sent so far.
    pub fn take_sent(&mut self) -> Vec<SentDatagram> {
        std::mem::take(&mut self.sent)
    }

    /// Number of gratuitous ARP announcements.
    pub fn gratuitous_arps(&self) -> usize {
        self.gratuitous_arps
    }

    /// Every framer programming, in order.
    pub fn framers(&self) -> &[FramerConfig] {
        &self.framers
    }

    /// Current LED state.
    pub fn leds(&self) -> u8 {
        self.leds
    }

    /// Every LED update as `(value, mask)`.
    pub fn led_calls(&self) -> &[(u8, u8)] {
        &self.led_calls
    }

    /// Every routing mode change, in order.
    pub fn routing_modes(&self) -> &[RoutingMode] {
        &self.routing_modes
    }

    /// Number of inbound buffers released back to the hardware.
    pub fn released(&self) -> usize {
        self.released
    }

    /// Number of inbound frames not yet claimed.
    pub fn pending_frames(&self) -> usize {
        self.inbound.len()
    }

    /// Order in which the polled sources were serviced.
    pub fn poll_log(&self) -> &[&'static str] {
        &self.poll_log
    }
}

impl Default for MockBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterBus for MockBoard {
    fn peek32(&mut self, addr: u32) -> u32 {
        self.register(addr)
    }

    fn poke32(&mut self, addr: u32, value: u32) {
        self.pokes.push((addr, value));
        self.regs.insert(addr, value);
    }

    fn peek16(&mut self, addr: u32) -> u16 {
        (self.register(addr) & 0xFFFF) as u16
    }

    fn poke16(&mut self, addr: u32, value: u16) {
        self.pokes.push((addr, u32::from(value)));
        self.regs.insert(addr, u32::from(value));
    }
}

impl NetStack for MockBoard {
    fn ip_addr(&self) -> Ipv4Addr {
        self.ip
    }

    fn set_ip_addr(&mut self, addr: Ipv4Addr) {
        self.ip = addr;
    }

    fn mac_addr(&self) -> MacAddr {
        self.mac
    }

    fn arp_lookup(&self, ip: Ipv4Addr) -> Option<MacAddr> {
        self.arp.get(&ip).copied()
    }

    fn decode_frame(&mut self, _frame: &[u8]) -> Option<NetEvent> {
        self.current_event.take()
    }

    fn send_udp(&mut self, src_port: u16, dst: SocketAddrV4, payload: &[u8]) {
        self.sent.push(SentDatagram {
            src_port,
            dst,
            payload: payload.to_vec(),
        });
    }

    fn send_gratuitous_arp(&mut self) {
        self.gratuitous_arps += 1;
    }
}

impl PacketController for MockBoard {
    fn claim_incoming(&mut self) -> Option<Vec<u8>> {
        self.poll_log.push("inbound");
        let (frame, event) = self.inbound.pop_front()?;
        self.current_event = event;
        self.claimed = true;
        Some(frame)
    }

    fn release_incoming(&mut self) {
        if self.claimed {
            self.claimed = false;
            self.released += 1;
        }
    }

    fn set_routing_mode(&mut self, mode: RoutingMode) {
        self.routing_modes.push(mode);
    }
}

impl Framer for MockBoard {
    fn setup_framer(&mut self, config: &FramerConfig) {
        self.framers.push(*config);
    }
}

impl Leds for MockBoard {
    fn set_leds(&mut self, value: u8, mask: u8) {
        self.led_calls.push((value, mask));
        self.leds = (self.leds & !mask) | (value & mask);
    }
}

impl UartChannel for MockBoard {
    fn poll_uart(&mut self) {
        self.poll_log.push("uart");
    }
}

impl InterruptController for MockBoard {
    fn service_interrupts(&mut self) {
        self.poll_log.push("interrupts");
    }
}

impl Board for MockBoard {
    fn spi(&mut self) -> Option<&mut dyn SpiMaster> {
        self.spi.as_mut().map(|s| s as &mut dyn SpiMaster)
    }

    fn i2c(&mut self) -> Option<&mut dyn I2cMaster> {
        self.i2c.as_mut().map(|i| i as &mut dyn I2cMaster)
    }

    fn vctcxo(&mut self) -> Option<&mut dyn VctcxoDac> {
        self.vctcxo.as_mut().map(|v| v as &mut dyn VctcxoDac)
    }
}
