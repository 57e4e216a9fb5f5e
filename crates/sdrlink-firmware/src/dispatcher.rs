//! Control-port request dispatcher.
//!
//! Every control request is validated, mapped to a final opcode, and
//! handed to the handler registered for that opcode. The handler table is
//! built once from the [`Capabilities`] of the build, so a board without
//! SPI/I2C simply has no entry for those opcodes and answers them with
//! `HUH_WHAT`, the same as any other unrecognized request.
//!
//! Validation order:
//!
//! 1. A request at least one word long whose compatibility number differs
//!    from [`FW_COMPAT_NUM`] is treated as an addressing probe. A zero
//!    compatibility number is a routine probe and is not logged.
//! 2. A request shorter than [`CTRL_PACKET_SIZE`] is answered with
//!    `HUH_WHAT`, whatever step 1 decided.
//!
//! Every response echoes the request's sequence number and carries our
//! compatibility number. All responses are exactly `CTRL_PACKET_SIZE`
//! bytes, except echo responses, which are as long as the request asked.

use std::collections::HashMap;
use std::net::SocketAddrV4;

use sdrlink_core::hal::{Board, NetStack, RegisterBus, SpiFlags, SpiTransfer};
use sdrlink_wire::control::{
    CLK_EDGE_RISE, CTRL_PACKET_SIZE, ControlId, ControlPacket, EchoArgs, FW_COMPAT_NUM,
    I2C_MAX_BYTES, I2cArgs, MAX_ECHO_LEN, RegAction, RegArgs, ZPU_GET_VCTCXO_DAC,
    ZPU_SET_VCTCXO_DAC, ZpuArgs,
};

use crate::registers::FirmwareRegisters;

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// Which addressing-probe opcode pair a build answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Addressing {
    /// `WAZZUP_BRO` / `WAZZUP_DUDE`.
    Standard,
    /// `UMTRX_REQUEST` / `UMTRX_RESPONSE`.
    UmTrx,
}

/// The feature set compiled into a firmware build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Addressing-probe variant.
    pub addressing: Addressing,
    /// SPI and I2C transaction opcodes are available.
    pub spi_i2c: bool,
    /// Soft-core vendor actions (VCTCXO DAC) are available.
    pub vctcxo: bool,
}

impl Capabilities {
    /// The standard build: standard addressing with SPI and I2C.
    pub const STANDARD: Capabilities = Capabilities {
        addressing: Addressing::Standard,
        spi_i2c: true,
        vctcxo: false,
    };

    /// The UmTRX build: UmTRX addressing, SPI and I2C, and the VCTCXO DAC.
    pub const UMTRX: Capabilities = Capabilities {
        addressing: Addressing::UmTrx,
        spi_i2c: true,
        vctcxo: true,
    };

    /// The opcode a version-mismatched request is remapped to.
    pub fn probe_request(&self) -> ControlId {
        match self.addressing {
            Addressing::Standard => ControlId::WAZZUP_BRO,
            Addressing::UmTrx => ControlId::UMTRX_REQUEST,
        }
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::STANDARD
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// A response ready to be sent from the control port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlReply {
    /// Where to send it (the request's source).
    pub dest: SocketAddrV4,
    /// Encoded response.
    pub bytes: Vec<u8>,
}

/// Everything a handler may touch while serving one request.
struct Request<'a> {
    board: &'a mut dyn Board,
    registers: &'a mut FirmwareRegisters,
    /// The request, zero-filled if the datagram was short.
    packet: ControlPacket,
    /// The datagram exactly as received.
    raw: &'a [u8],
    /// Response under construction.
    reply: ControlPacket,
}

type Handler = fn(&mut Request<'_>) -> Vec<u8>;

/// The control-port dispatcher.
///
/// Owns the firmware register bank for the life of the device.
pub struct Dispatcher {
    capabilities: Capabilities,
    registers: FirmwareRegisters,
    table: HashMap<ControlId, Handler>,
}

impl Dispatcher {
    /// Build the handler table for `capabilities`.
    pub fn new(capabilities: Capabilities) -> Self {
        let mut table: HashMap<ControlId, Handler> = HashMap::new();

        match capabilities.addressing {
            Addressing::Standard => {
                table.insert(ControlId::WAZZUP_BRO, handle_probe);
            }
            Addressing::UmTrx => {
                table.insert(ControlId::UMTRX_REQUEST, handle_umtrx_probe);
            }
        }
        if capabilities.vctcxo {
            table.insert(ControlId::UMTRX_ZPU_REQUEST, handle_zpu);
        }
        if capabilities.spi_i2c {
            table.insert(ControlId::TRANSACT_SPI, handle_spi);
            table.insert(ControlId::I2C_READ, handle_i2c_read);
            table.insert(ControlId::I2C_WRITE, handle_i2c_write);
        }
        table.insert(ControlId::GET_REGISTER, handle_register);
        table.insert(ControlId::HOLLER, handle_echo);

        tracing::debug!(
            ?capabilities,
            opcodes = table.len(),
            "Control dispatch table built"
        );

        Dispatcher {
            capabilities,
            registers: FirmwareRegisters::new(),
            table,
        }
    }

    /// The capabilities this dispatcher was built for.
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// The firmware register bank.
    pub fn registers(&self) -> &FirmwareRegisters {
        &self.registers
    }

    /// True if `id` has a registered handler.
    pub fn handles(&self, id: ControlId) -> bool {
        self.table.contains_key(&id)
    }

    /// Serve one control request received from `source`.
    pub fn handle(
        &mut self,
        board: &mut dyn Board,
        request: &[u8],
        source: SocketAddrV4,
    ) -> ControlReply {
        let packet = ControlPacket::from_prefix(request);
        let mut id = packet.id;

        if request.len() >= 4 && packet.proto_ver != FW_COMPAT_NUM {
            if packet.proto_ver != 0 {
                tracing::warn!(
                    %source,
                    expected = FW_COMPAT_NUM,
                    actual = packet.proto_ver,
                    "Control request has wrong compatibility number"
                );
            }
            id = self.capabilities.probe_request();
        }

        if request.len() < CTRL_PACKET_SIZE {
            tracing::warn!(
                %source,
                expected = CTRL_PACKET_SIZE,
                actual = request.len(),
                "Short control request"
            );
            id = ControlId::HUH_WHAT;
        }

        let handler = self
            .table
            .get(&id)
            .copied()
            .unwrap_or(handle_unrecognized as Handler);

        let mut req = Request {
            board,
            registers: &mut self.registers,
            packet,
            raw: request,
            reply: ControlPacket {
                proto_ver: FW_COMPAT_NUM,
                id: ControlId::HUH_WHAT,
                seq: packet.seq,
                data: Default::default(),
            },
        };
        let bytes = handler(&mut req);

        tracing::trace!(%source, ?id, seq = packet.seq, len = bytes.len(), "Control reply");

        ControlReply {
            dest: source,
            bytes,
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

fn fixed(reply: &ControlPacket) -> Vec<u8> {
    reply.encode().to_vec()
}

fn unrecognized(reply: &mut ControlPacket) -> Vec<u8> {
    reply.id = ControlId::HUH_WHAT;
    fixed(reply)
}

fn handle_unrecognized(req: &mut Request<'_>) -> Vec<u8> {
    unrecognized(&mut req.reply)
}

fn probe_reply(req: &mut Request<'_>, id: ControlId) -> Vec<u8> {
    req.reply.id = id;
    let ip = req.board.ip_addr();
    req.reply.set_ip_addr(ip);
    fixed(&req.reply)
}

fn handle_probe(req: &mut Request<'_>) -> Vec<u8> {
    probe_reply(req, ControlId::WAZZUP_DUDE)
}

fn handle_umtrx_probe(req: &mut Request<'_>) -> Vec<u8> {
    probe_reply(req, ControlId::UMTRX_RESPONSE)
}

fn handle_register(req: &mut Request<'_>) -> Vec<u8> {
    let args = req.packet.reg_args();
    let mut out = RegArgs {
        addr: args.addr,
        data: 0,
        num_bytes: args.num_bytes,
        action: args.action,
    };

    match RegAction::from_u8(args.action) {
        Some(RegAction::FpgaPeek32) => out.data = req.board.peek32(args.addr),
        Some(RegAction::FpgaPeek16) => out.data = u32::from(req.board.peek16(args.addr)),
        Some(RegAction::FpgaPoke32) => req.board.poke32(args.addr, args.data),
        Some(RegAction::FpgaPoke16) => req.board.poke16(args.addr, args.data as u16),
        Some(RegAction::FwPeek32) => match req.registers.peek(args.addr) {
            Some(value) => out.data = value,
            None => tracing::warn!(index = args.addr, "Firmware register peek out of range"),
        },
        Some(RegAction::FwPoke32) => {
            if !req.registers.poke(args.addr, args.data) {
                tracing::warn!(index = args.addr, "Firmware register poke out of range");
            }
        }
        None => tracing::warn!(action = args.action, "Unknown register action"),
    }

    req.reply.id = ControlId::GOT_REGISTER;
    req.reply.set_reg_args(&out);
    fixed(&req.reply)
}

/// SPI clock-edge flags for the requested edges.
///
/// A rising MOSI edge in the request means data is pushed on the falling
/// edge. A rising MISO edge means data is latched on the rising edge.
pub fn spi_flags(mosi_edge: u8, miso_edge: u8) -> SpiFlags {
    let push = if mosi_edge == CLK_EDGE_RISE {
        SpiFlags::PUSH_FALL
    } else {
        SpiFlags::PUSH_RISE
    };
    let latch = if miso_edge == CLK_EDGE_RISE {
        SpiFlags::LATCH_RISE
    } else {
        SpiFlags::LATCH_FALL
    };
    push.union(latch)
}

fn handle_spi(req: &mut Request<'_>) -> Vec<u8> {
    let args = req.packet.spi_args();
    let Some(spi) = req.board.spi() else {
        tracing::warn!("SPI request on a board without an SPI master");
        return unrecognized(&mut req.reply);
    };

    let transfer = if args.readback == 0 {
        SpiTransfer::TxOnly
    } else {
        SpiTransfer::TxRx
    };
    let flags = spi_flags(args.mosi_edge, args.miso_edge);
    let result = spi.transact(transfer, args.dev, args.data, args.num_bits, flags);

    let mut out = args;
    out.data = result;
    req.reply.id = ControlId::TRANSACTED_SPI;
    req.reply.set_spi_args(&out);
    fixed(&req.reply)
}

fn clamp_i2c_len(bytes: u8) -> usize {
    let n = usize::from(bytes);
    if n > I2C_MAX_BYTES {
        tracing::warn!(requested = n, max = I2C_MAX_BYTES, "I2C byte count clamped");
        I2C_MAX_BYTES
    } else {
        n
    }
}

fn handle_i2c_read(req: &mut Request<'_>) -> Vec<u8> {
    let args = req.packet.i2c_args();
    let n = clamp_i2c_len(args.bytes);
    let Some(i2c) = req.board.i2c() else {
        tracing::warn!("I2C request on a board without an I2C master");
        return unrecognized(&mut req.reply);
    };

    let mut out = I2cArgs {
        addr: args.addr,
        bytes: n as u8,
        data: [0; I2C_MAX_BYTES],
    };
    if !i2c.i2c_read(args.addr, &mut out.data[..n]) {
        tracing::debug!(addr = args.addr, bytes = n, "I2C read not acknowledged");
    }

    req.reply.id = ControlId::I2C_DATA;
    req.reply.set_i2c_args(&out);
    fixed(&req.reply)
}

fn handle_i2c_write(req: &mut Request<'_>) -> Vec<u8> {
    let args = req.packet.i2c_args();
    let n = clamp_i2c_len(args.bytes);
    let Some(i2c) = req.board.i2c() else {
        tracing::warn!("I2C request on a board without an I2C master");
        return unrecognized(&mut req.reply);
    };

    if !i2c.i2c_write(args.addr, &args.data[..n]) {
        tracing::debug!(addr = args.addr, bytes = n, "I2C write not acknowledged");
    }

    req.reply.id = ControlId::I2C_WRITE_DONE;
    req.reply.set_i2c_args(&I2cArgs {
        addr: args.addr,
        bytes: n as u8,
        data: [0; I2C_MAX_BYTES],
    });
    fixed(&req.reply)
}

fn handle_echo(req: &mut Request<'_>) -> Vec<u8> {
    let requested = req.packet.echo_args().len as usize;
    let len = if requested > MAX_ECHO_LEN {
        tracing::warn!(requested, max = MAX_ECHO_LEN, "Echo length capped");
        MAX_ECHO_LEN
    } else {
        requested
    };

    req.reply.id = ControlId::HOLLER_BACK;
    req.reply.set_echo_args(&EchoArgs {
        len: req.raw.len() as u32,
    });

    // Request bytes first, then the response header on top.
    let mut out = vec![0u8; len];
    let copied = req.raw.len().min(len);
    out[..copied].copy_from_slice(&req.raw[..copied]);
    let header = req.reply.encode();
    let overlay = header.len().min(len);
    out[..overlay].copy_from_slice(&header[..overlay]);
    out
}

fn handle_zpu(req: &mut Request<'_>) -> Vec<u8> {
    let args = req.packet.zpu_args();
    let mut out = ZpuArgs {
        action: args.action,
        data: 0,
    };

    match req.board.vctcxo() {
        Some(dac) => match args.action {
            ZPU_GET_VCTCXO_DAC => out.data = u32::from(dac.vctcxo_dac()),
            ZPU_SET_VCTCXO_DAC => dac.set_vctcxo_dac(args.data as u16),
            other => tracing::warn!(action = other, "Unknown ZPU action"),
        },
        None => tracing::warn!("ZPU request on a board without a VCTCXO DAC"),
    }

    req.reply.id = ControlId::UMTRX_ZPU_RESPONSE;
    req.reply.set_zpu_args(&out);
    fixed(&req.reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdrlink_core::hal::VctcxoDac;
    use sdrlink_test_harness::mock_board::{MOCK_IP, MockVctcxo};
    use sdrlink_test_harness::MockBoard;
    use sdrlink_wire::control::{CLK_EDGE_FALL, FW_REG_VER_MINOR, FW_VER_MINOR, SpiArgs};
    use std::net::Ipv4Addr;

    fn host() -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::new(192, 168, 10, 1), 50000)
    }

    fn run(dispatcher: &mut Dispatcher, board: &mut MockBoard, request: &[u8]) -> ControlPacket {
        let reply = dispatcher.handle(board, request, host());
        assert_eq!(reply.dest, host());
        assert_eq!(reply.bytes.len(), CTRL_PACKET_SIZE);
        ControlPacket::from_prefix(&reply.bytes)
    }

    fn reg_request(action: RegAction, addr: u32, data: u32) -> ControlPacket {
        let mut pkt = ControlPacket::request(ControlId::GET_REGISTER, 9);
        pkt.set_reg_args(&RegArgs {
            addr,
            data,
            num_bytes: 4,
            action: action as u8,
        });
        pkt
    }

    #[test]
    fn probe_returns_address() {
        let mut d = Dispatcher::new(Capabilities::STANDARD);
        let mut board = MockBoard::new();
        let reply = run(&mut d, &mut board, &ControlPacket::request(ControlId::WAZZUP_BRO, 42).encode());
        assert_eq!(reply.id, ControlId::WAZZUP_DUDE);
        assert_eq!(reply.seq, 42);
        assert_eq!(reply.proto_ver, FW_COMPAT_NUM);
        assert_eq!(reply.ip_addr(), MOCK_IP);
    }

    #[test]
    fn wrong_version_becomes_probe() {
        let mut d = Dispatcher::new(Capabilities::STANDARD);
        let mut board = MockBoard::new();
        let mut pkt = reg_request(RegAction::FpgaPoke32, 0xD000, 1);
        pkt.proto_ver = FW_COMPAT_NUM + 1;

        let reply = run(&mut d, &mut board, &pkt.encode());
        assert_eq!(reply.id, ControlId::WAZZUP_DUDE);
        assert_eq!(reply.ip_addr(), MOCK_IP);
        assert!(board.pokes().is_empty(), "mismatched request must not poke");

        pkt.proto_ver = 0;
        let reply = run(&mut d, &mut board, &pkt.encode());
        assert_eq!(reply.id, ControlId::WAZZUP_DUDE);
    }

    #[test]
    fn short_request_is_unrecognized() {
        let mut d = Dispatcher::new(Capabilities::STANDARD);
        let mut board = MockBoard::new();
        let pkt = ControlPacket::request(ControlId::WAZZUP_BRO, 5).encode();

        let reply = run(&mut d, &mut board, &pkt[..20]);
        assert_eq!(reply.id, ControlId::HUH_WHAT);
        assert_eq!(reply.seq, 5);

        // Wrong version and short: the short check wins.
        let mut bad = ControlPacket::request(ControlId::WAZZUP_BRO, 5);
        bad.proto_ver = 3;
        let reply = run(&mut d, &mut board, &bad.encode()[..12]);
        assert_eq!(reply.id, ControlId::HUH_WHAT);

        let reply = run(&mut d, &mut board, &[]);
        assert_eq!(reply.id, ControlId::HUH_WHAT);
        assert_eq!(reply.seq, 0);
    }

    #[test]
    fn unknown_opcode_is_unrecognized() {
        let mut d = Dispatcher::new(Capabilities::STANDARD);
        let mut board = MockBoard::new();
        let reply = run(&mut d, &mut board, &ControlPacket::request(ControlId(b'q' as u32), 1).encode());
        assert_eq!(reply.id, ControlId::HUH_WHAT);
    }

    #[test]
    fn fpga_register_access() {
        let mut d = Dispatcher::new(Capabilities::STANDARD);
        let mut board = MockBoard::new();

        let reply = run(&mut d, &mut board, &reg_request(RegAction::FpgaPoke32, 0xD010, 0x1234_5678).encode());
        assert_eq!(reply.id, ControlId::GOT_REGISTER);
        assert_eq!(board.pokes(), &[(0xD010, 0x1234_5678)]);

        let reply = run(&mut d, &mut board, &reg_request(RegAction::FpgaPeek32, 0xD010, 0).encode());
        assert_eq!(reply.reg_args().data, 0x1234_5678);

        run(&mut d, &mut board, &reg_request(RegAction::FpgaPoke16, 0xD020, 0xABCD_EF01).encode());
        assert_eq!(board.register(0xD020), 0xEF01);
        let reply = run(&mut d, &mut board, &reg_request(RegAction::FpgaPeek16, 0xD020, 0).encode());
        assert_eq!(reply.reg_args().data, 0xEF01);
    }

    #[test]
    fn firmware_register_access() {
        let mut d = Dispatcher::new(Capabilities::STANDARD);
        let mut board = MockBoard::new();

        let reply = run(&mut d, &mut board, &reg_request(RegAction::FwPeek32, FW_REG_VER_MINOR, 0).encode());
        assert_eq!(reply.reg_args().data, FW_VER_MINOR);

        run(&mut d, &mut board, &reg_request(RegAction::FwPoke32, 1, 77).encode());
        assert_eq!(d.registers().peek(1), Some(77));
        assert!(board.pokes().is_empty());
    }

    #[test]
    fn firmware_register_out_of_range() {
        let mut d = Dispatcher::new(Capabilities::STANDARD);
        let mut board = MockBoard::new();
        let before = d.registers().clone();

        let reply = run(&mut d, &mut board, &reg_request(RegAction::FwPoke32, 8, 77).encode());
        assert_eq!(reply.id, ControlId::GOT_REGISTER);
        assert_eq!(d.registers(), &before);

        let reply = run(&mut d, &mut board, &reg_request(RegAction::FwPeek32, 1000, 0).encode());
        assert_eq!(reply.reg_args().data, 0);
    }

    #[test]
    fn spi_edge_mapping() {
        let f = spi_flags(CLK_EDGE_RISE, CLK_EDGE_RISE);
        assert_eq!(f, SpiFlags::PUSH_FALL.union(SpiFlags::LATCH_RISE));
        let f = spi_flags(CLK_EDGE_FALL, CLK_EDGE_FALL);
        assert_eq!(f, SpiFlags::PUSH_RISE.union(SpiFlags::LATCH_FALL));
        let f = spi_flags(CLK_EDGE_RISE, CLK_EDGE_FALL);
        assert!(f.pushes_on_fall());
        assert!(f.latches_on_fall());
    }

    #[test]
    fn spi_transaction() {
        let mut d = Dispatcher::new(Capabilities::STANDARD);
        let mut board = MockBoard::new();
        board.spi.as_mut().unwrap().readback = 0xBEEF;

        let mut pkt = ControlPacket::request(ControlId::TRANSACT_SPI, 3);
        pkt.set_spi_args(&SpiArgs {
            dev: 2,
            data: 0x00AB_CDEF,
            miso_edge: CLK_EDGE_RISE,
            mosi_edge: CLK_EDGE_RISE,
            num_bits: 24,
            readback: 1,
        });
        let reply = run(&mut d, &mut board, &pkt.encode());
        assert_eq!(reply.id, ControlId::TRANSACTED_SPI);
        assert_eq!(reply.spi_args().data, 0xBEEF);

        let calls = &board.spi.as_ref().unwrap().calls;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].transfer, SpiTransfer::TxRx);
        assert_eq!(calls[0].dev, 2);
        assert_eq!(calls[0].data, 0x00AB_CDEF);
        assert_eq!(calls[0].num_bits, 24);
        assert!(calls[0].flags.pushes_on_fall());
        assert!(!calls[0].flags.latches_on_fall());
    }

    #[test]
    fn spi_without_capability_is_unrecognized() {
        let caps = Capabilities {
            spi_i2c: false,
            ..Capabilities::STANDARD
        };
        let mut d = Dispatcher::new(caps);
        assert!(!d.handles(ControlId::TRANSACT_SPI));
        assert!(!d.handles(ControlId::I2C_READ));

        let mut board = MockBoard::new();
        let reply = run(&mut d, &mut board, &ControlPacket::request(ControlId::TRANSACT_SPI, 1).encode());
        assert_eq!(reply.id, ControlId::HUH_WHAT);
        assert!(board.spi.as_ref().unwrap().calls.is_empty());
    }

    #[test]
    fn i2c_read_and_write() {
        let mut d = Dispatcher::new(Capabilities::STANDARD);
        let mut board = MockBoard::new();
        board
            .i2c
            .as_mut()
            .unwrap()
            .devices
            .insert(0x50, vec![1, 2, 3, 4]);

        let mut pkt = ControlPacket::request(ControlId::I2C_READ, 1);
        pkt.set_i2c_args(&I2cArgs {
            addr: 0x50,
            bytes: 3,
            data: [0; I2C_MAX_BYTES],
        });
        let reply = run(&mut d, &mut board, &pkt.encode());
        assert_eq!(reply.id, ControlId::I2C_DATA);
        let args = reply.i2c_args();
        assert_eq!(args.bytes, 3);
        assert_eq!(&args.data[..4], &[1, 2, 3, 0]);

        let mut data = [0u8; I2C_MAX_BYTES];
        data[..2].copy_from_slice(&[0xAA, 0xBB]);
        let mut pkt = ControlPacket::request(ControlId::I2C_WRITE, 2);
        pkt.set_i2c_args(&I2cArgs {
            addr: 0x51,
            bytes: 2,
            data,
        });
        let reply = run(&mut d, &mut board, &pkt.encode());
        assert_eq!(reply.id, ControlId::I2C_WRITE_DONE);
        assert_eq!(reply.i2c_args().bytes, 2);
        assert_eq!(board.i2c.as_ref().unwrap().writes, vec![(0x51, vec![0xAA, 0xBB])]);
    }

    #[test]
    fn i2c_byte_count_is_clamped() {
        let mut d = Dispatcher::new(Capabilities::STANDARD);
        let mut board = MockBoard::new();

        let mut pkt = ControlPacket::request(ControlId::I2C_WRITE, 2);
        pkt.set_i2c_args(&I2cArgs {
            addr: 0x51,
            bytes: 200,
            data: [7; I2C_MAX_BYTES],
        });
        let reply = run(&mut d, &mut board, &pkt.encode());
        assert_eq!(reply.i2c_args().bytes as usize, I2C_MAX_BYTES);
        assert_eq!(board.i2c.as_ref().unwrap().writes[0].1.len(), I2C_MAX_BYTES);
    }

    #[test]
    fn echo_uses_requested_length() {
        let mut d = Dispatcher::new(Capabilities::STANDARD);
        let mut board = MockBoard::new();

        let mut pkt = ControlPacket::request(ControlId::HOLLER, 11);
        pkt.set_echo_args(&EchoArgs { len: 100 });
        let mut request = pkt.encode().to_vec();
        request.extend((0..28).map(|i| i as u8 + 1));

        let reply = d.handle(&mut board, &request, host());
        assert_eq!(reply.bytes.len(), 100);

        let header = ControlPacket::from_prefix(&reply.bytes);
        assert_eq!(header.id, ControlId::HOLLER_BACK);
        assert_eq!(header.seq, 11);
        assert_eq!(header.echo_args().len, request.len() as u32);

        assert_eq!(&reply.bytes[CTRL_PACKET_SIZE..64], &request[CTRL_PACKET_SIZE..]);
        assert!(reply.bytes[64..].iter().all(|&b| b == 0));
    }

    #[test]
    fn echo_shorter_than_header() {
        let mut d = Dispatcher::new(Capabilities::STANDARD);
        let mut board = MockBoard::new();

        let mut pkt = ControlPacket::request(ControlId::HOLLER, 1);
        pkt.set_echo_args(&EchoArgs { len: 8 });
        let reply = d.handle(&mut board, &pkt.encode(), host());
        assert_eq!(reply.bytes.len(), 8);
        assert_eq!(&reply.bytes[4..8], &[b'L', 0, 0, 0]);

        pkt.set_echo_args(&EchoArgs { len: u32::MAX });
        let reply = d.handle(&mut board, &pkt.encode(), host());
        assert_eq!(reply.bytes.len(), MAX_ECHO_LEN);
    }

    #[test]
    fn umtrx_build() {
        let mut d = Dispatcher::new(Capabilities::UMTRX);
        let mut board = MockBoard::new();
        board.vctcxo = Some(MockVctcxo { value: 0x800 });

        let reply = run(&mut d, &mut board, &ControlPacket::request(ControlId::UMTRX_REQUEST, 1).encode());
        assert_eq!(reply.id, ControlId::UMTRX_RESPONSE);
        assert_eq!(reply.ip_addr(), MOCK_IP);

        let reply = run(&mut d, &mut board, &ControlPacket::request(ControlId::WAZZUP_BRO, 1).encode());
        assert_eq!(reply.id, ControlId::HUH_WHAT);

        let mut bad = ControlPacket::request(ControlId::HOLLER, 1);
        bad.proto_ver = 99;
        let reply = run(&mut d, &mut board, &bad.encode());
        assert_eq!(reply.id, ControlId::UMTRX_RESPONSE);

        let mut get = ControlPacket::request(ControlId::UMTRX_ZPU_REQUEST, 2);
        get.set_zpu_args(&ZpuArgs {
            action: ZPU_GET_VCTCXO_DAC,
            data: 0,
        });
        let reply = run(&mut d, &mut board, &get.encode());
        assert_eq!(reply.id, ControlId::UMTRX_ZPU_RESPONSE);
        assert_eq!(reply.zpu_args().data, 0x800);

        let mut set = ControlPacket::request(ControlId::UMTRX_ZPU_REQUEST, 3);
        set.set_zpu_args(&ZpuArgs {
            action: ZPU_SET_VCTCXO_DAC,
            data: 0x123,
        });
        run(&mut d, &mut board, &set.encode());
        assert_eq!(board.vctcxo.as_ref().unwrap().vctcxo_dac(), 0x123);
    }
}
