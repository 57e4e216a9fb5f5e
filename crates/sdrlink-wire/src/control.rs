//! Control-port wire format.
//!
//! Control requests and responses share one fixed-size little-endian
//! structure: a compatibility number, an opcode id, a sequence number, and
//! a 24-byte union whose meaning depends on the opcode.
//!
//! ```text
//! offset  0  proto_ver  u32
//! offset  4  id         u32
//! offset  8  seq        u32
//! offset 12  data       [u8; 24]  (union, see the *Args types)
//! ```
//!
//! Both ends must agree on [`FW_COMPAT_NUM`] and [`CTRL_PACKET_SIZE`]
//! exactly; a device answering with a different compatibility number is
//! speaking a different protocol revision.

use std::fmt;
use std::net::Ipv4Addr;

/// Protocol compatibility number compiled into this build.
pub const FW_COMPAT_NUM: u32 = 12;

/// Firmware minor version, readable through firmware register
/// [`FW_REG_VER_MINOR`].
pub const FW_VER_MINOR: u32 = 3;

/// Number of firmware virtual registers.
pub const NUM_FW_REGS: usize = 8;

/// Firmware register index holding the minor version.
pub const FW_REG_VER_MINOR: u32 = 7;

/// Size of the opcode-specific union, in bytes.
pub const CTRL_DATA_SIZE: usize = 24;

/// Size of a complete control packet, in bytes.
pub const CTRL_PACKET_SIZE: usize = 12 + CTRL_DATA_SIZE;

/// Capacity of the I2C data buffer inside a control packet.
pub const I2C_MAX_BYTES: usize = 20;

/// Largest echo response the device will produce, in bytes.
pub const MAX_ECHO_LEN: usize = 2048;

/// SPI clock edge code for the rising edge.
pub const CLK_EDGE_RISE: u8 = b'r';
/// SPI clock edge code for the falling edge.
pub const CLK_EDGE_FALL: u8 = b'f';

// ---------------------------------------------------------------------------
// Opcodes
// ---------------------------------------------------------------------------

/// Control opcode identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ControlId(pub u32);

impl ControlId {
    /// "Unrecognized" response (also the default for short packets).
    pub const HUH_WHAT: ControlId = ControlId(b' ' as u32);

    /// Addressing probe request.
    pub const WAZZUP_BRO: ControlId = ControlId(b'a' as u32);
    /// Addressing probe response, carrying the device IPv4 address.
    pub const WAZZUP_DUDE: ControlId = ControlId(b'A' as u32);

    /// SPI transaction request.
    pub const TRANSACT_SPI: ControlId = ControlId(b's' as u32);
    /// SPI transaction response, carrying the read-back word.
    pub const TRANSACTED_SPI: ControlId = ControlId(b'S' as u32);

    /// I2C read request.
    pub const I2C_READ: ControlId = ControlId(b'i' as u32);
    /// I2C read response, carrying the bytes read.
    pub const I2C_DATA: ControlId = ControlId(b'I' as u32);

    /// I2C write request.
    pub const I2C_WRITE: ControlId = ControlId(b'h' as u32);
    /// I2C write acknowledgement.
    pub const I2C_WRITE_DONE: ControlId = ControlId(b'H' as u32);

    /// Register access request.
    pub const GET_REGISTER: ControlId = ControlId(b'r' as u32);
    /// Register access response.
    pub const GOT_REGISTER: ControlId = ControlId(b'R' as u32);

    /// Echo request.
    pub const HOLLER: ControlId = ControlId(b'l' as u32);
    /// Echo response.
    pub const HOLLER_BACK: ControlId = ControlId(b'L' as u32);

    /// Addressing probe request, UmTRX variant.
    pub const UMTRX_REQUEST: ControlId = ControlId(b'u' as u32);
    /// Addressing probe response, UmTRX variant.
    pub const UMTRX_RESPONSE: ControlId = ControlId(b'U' as u32);

    /// Soft-core vendor action request (UmTRX).
    pub const UMTRX_ZPU_REQUEST: ControlId = ControlId(b'z' as u32);
    /// Soft-core vendor action response (UmTRX).
    pub const UMTRX_ZPU_RESPONSE: ControlId = ControlId(b'Z' as u32);
}

impl fmt::Debug for ControlId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match char::from_u32(self.0).filter(|c| c.is_ascii_graphic() || *c == ' ') {
            Some(c) => write!(f, "ControlId('{}')", c),
            None => write!(f, "ControlId(0x{:08X})", self.0),
        }
    }
}

/// Register access action carried in [`RegArgs::action`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RegAction {
    /// Read a 32-bit FPGA register.
    FpgaPeek32 = 1,
    /// Read a 16-bit FPGA register.
    FpgaPeek16 = 2,
    /// Write a 32-bit FPGA register.
    FpgaPoke32 = 3,
    /// Write a 16-bit FPGA register.
    FpgaPoke16 = 4,
    /// Read a firmware virtual register.
    FwPeek32 = 5,
    /// Write a firmware virtual register.
    FwPoke32 = 6,
}

impl RegAction {
    /// Decode an action byte.
    pub fn from_u8(value: u8) -> Option<RegAction> {
        match value {
            1 => Some(RegAction::FpgaPeek32),
            2 => Some(RegAction::FpgaPeek16),
            3 => Some(RegAction::FpgaPoke32),
            4 => Some(RegAction::FpgaPoke16),
            5 => Some(RegAction::FwPeek32),
            6 => Some(RegAction::FwPoke32),
            _ => None,
        }
    }
}

/// Soft-core vendor action carried in [`ZpuArgs::action`].
pub const ZPU_GET_VCTCXO_DAC: u32 = 1;
/// Soft-core vendor action carried in [`ZpuArgs::action`].
pub const ZPU_SET_VCTCXO_DAC: u32 = 2;

// ---------------------------------------------------------------------------
// Union arms
// ---------------------------------------------------------------------------

fn get_u32(data: &[u8; CTRL_DATA_SIZE], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

fn put_u32(data: &mut [u8; CTRL_DATA_SIZE], offset: usize, value: u32) {
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// SPI transaction arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpiArgs {
    /// Slave select / device id.
    pub dev: u32,
    /// Data word to shift out; read-back word in responses.
    pub data: u32,
    /// MISO clock edge ([`CLK_EDGE_RISE`] or [`CLK_EDGE_FALL`]).
    pub miso_edge: u8,
    /// MOSI clock edge ([`CLK_EDGE_RISE`] or [`CLK_EDGE_FALL`]).
    pub mosi_edge: u8,
    /// Transaction length in bits.
    pub num_bits: u8,
    /// Nonzero to capture the MISO word.
    pub readback: u8,
}

/// I2C transaction arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct I2cArgs {
    /// 7-bit device address.
    pub addr: u8,
    /// Number of bytes to transfer.
    pub bytes: u8,
    /// Transfer buffer.
    pub data: [u8; I2C_MAX_BYTES],
}

/// Register access arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegArgs {
    /// Register address (or firmware register index).
    pub addr: u32,
    /// Value written, or value read in responses.
    pub data: u32,
    /// Access width in bytes (informational).
    pub num_bytes: u8,
    /// A [`RegAction`] code.
    pub action: u8,
}

/// Echo arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EchoArgs {
    /// Requested response length in requests; received length in responses.
    pub len: u32,
}

/// Soft-core vendor action arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ZpuArgs {
    /// One of the `ZPU_*` action codes.
    pub action: u32,
    /// Action argument or result.
    pub data: u32,
}

// ---------------------------------------------------------------------------
// ControlPacket
// ---------------------------------------------------------------------------

/// One control request or response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlPacket {
    /// Protocol compatibility number.
    pub proto_ver: u32,
    /// Opcode.
    pub id: ControlId,
    /// Sequence number, echoed by the device.
    pub seq: u32,
    /// Opcode-specific union bytes.
    pub data: [u8; CTRL_DATA_SIZE],
}

impl Default for ControlPacket {
    fn default() -> Self {
        ControlPacket {
            proto_ver: FW_COMPAT_NUM,
            id: ControlId::HUH_WHAT,
            seq: 0,
            data: [0; CTRL_DATA_SIZE],
        }
    }
}

impl ControlPacket {
    /// A request with the given opcode and sequence number and an empty
    /// union.
    pub fn request(id: ControlId, seq: u32) -> Self {
        ControlPacket {
            proto_ver: FW_COMPAT_NUM,
            id,
            seq,
            data: [0; CTRL_DATA_SIZE],
        }
    }

    /// Decode a packet from the first bytes of `buf`.
    ///
    /// Missing bytes of a short buffer read as zero; the caller decides
    /// whether a short packet is acceptable.
    pub fn from_prefix(buf: &[u8]) -> Self {
        let mut full = [0u8; CTRL_PACKET_SIZE];
        let n = buf.len().min(CTRL_PACKET_SIZE);
        full[..n].copy_from_slice(&buf[..n]);

        let word = |i: usize| u32::from_le_bytes([full[i], full[i + 1], full[i + 2], full[i + 3]]);
        let mut data = [0u8; CTRL_DATA_SIZE];
        data.copy_from_slice(&full[12..]);

        ControlPacket {
            proto_ver: word(0),
            id: ControlId(word(4)),
            seq: word(8),
            data,
        }
    }

    /// Encode to the fixed wire size.
    pub fn encode(&self) -> [u8; CTRL_PACKET_SIZE] {
        let mut out = [0u8; CTRL_PACKET_SIZE];
        out[0..4].copy_from_slice(&self.proto_ver.to_le_bytes());
        out[4..8].copy_from_slice(&self.id.0.to_le_bytes());
        out[8..12].copy_from_slice(&self.seq.to_le_bytes());
        out[12..].copy_from_slice(&self.data);
        out
    }

    /// Read the union as an IPv4 address.
    pub fn ip_addr(&self) -> Ipv4Addr {
        Ipv4Addr::new(self.data[0], self.data[1], self.data[2], self.data[3])
    }

    /// Write an IPv4 address into the union.
    pub fn set_ip_addr(&mut self, addr: Ipv4Addr) {
        self.data[..4].copy_from_slice(&addr.octets());
    }

    /// Read the union as SPI arguments.
    pub fn spi_args(&self) -> SpiArgs {
        SpiArgs {
            dev: get_u32(&self.data, 0),
            data: get_u32(&self.data, 4),
            miso_edge: self.data[8],
            mosi_edge: self.data[9],
            num_bits: self.data[10],
            readback: self.data[11],
        }
    }

    /// Write SPI arguments into the union.
    pub fn set_spi_args(&mut self, args: &SpiArgs) {
        put_u32(&mut self.data, 0, args.dev);
        put_u32(&mut self.data, 4, args.data);
        self.data[8] = args.miso_edge;
        self.data[9] = args.mosi_edge;
        self.data[10] = args.num_bits;
        self.data[11] = args.readback;
    }

    /// Read the union as I2C arguments.
    pub fn i2c_args(&self) -> I2cArgs {
        let mut data = [0u8; I2C_MAX_BYTES];
        data.copy_from_slice(&self.data[2..2 + I2C_MAX_BYTES]);
        I2cArgs {
            addr: self.data[0],
            bytes: self.data[1],
            data,
        }
    }

    /// Write I2C arguments into the union.
    pub fn set_i2c_args(&mut self, args: &I2cArgs) {
        self.data[0] = args.addr;
        self.data[1] = args.bytes;
        self.data[2..2 + I2C_MAX_BYTES].copy_from_slice(&args.data);
    }

    /// Read the union as register arguments.
    pub fn reg_args(&self) -> RegArgs {
        RegArgs {
            addr: get_u32(&self.data, 0),
            data: get_u32(&self.data, 4),
            num_bytes: self.data[16],
            action: self.data[17],
        }
    }

    /// Write register arguments into the union.
    pub fn set_reg_args(&mut self, args: &RegArgs) {
        put_u32(&mut self.data, 0, args.addr);
        put_u32(&mut self.data, 4, args.data);
        self.data[16] = args.num_bytes;
        self.data[17] = args.action;
    }

    /// Read the union as echo arguments.
    pub fn echo_args(&self) -> EchoArgs {
        EchoArgs {
            len: get_u32(&self.data, 0),
        }
    }

    /// Write echo arguments into the union.
    pub fn set_echo_args(&mut self, args: &EchoArgs) {
        put_u32(&mut self.data, 0, args.len);
    }

    /// Read the union as soft-core vendor action arguments.
    pub fn zpu_args(&self) -> ZpuArgs {
        ZpuArgs {
            action: get_u32(&self.data, 0),
            data: get_u32(&self.data, 4),
        }
    }

    /// Write soft-core vendor action arguments into the union.
    pub fn set_zpu_args(&mut self, args: &ZpuArgs) {
        put_u32(&mut self.data, 0, args.action);
        put_u32(&mut self.data, 4, args.data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_size_is_fixed() {
        assert_eq!(CTRL_PACKET_SIZE, 36);
        assert_eq!(ControlPacket::default().encode().len(), CTRL_PACKET_SIZE);
    }

    #[test]
    fn header_fields_little_endian() {
        let pkt = ControlPacket::request(ControlId::GET_REGISTER, 0x0102_0304);
        let bytes = pkt.encode();
        assert_eq!(&bytes[0..4], &FW_COMPAT_NUM.to_le_bytes());
        assert_eq!(&bytes[4..8], &[b'r', 0, 0, 0]);
        assert_eq!(&bytes[8..12], &[0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn short_prefix_zero_fills() {
        let pkt = ControlPacket::request(ControlId::HOLLER, 77);
        let bytes = pkt.encode();
        let decoded = ControlPacket::from_prefix(&bytes[..10]);
        assert_eq!(decoded.proto_ver, FW_COMPAT_NUM);
        assert_eq!(decoded.id, ControlId::HOLLER);
        // Only two of the four sequence bytes made it.
        assert_eq!(decoded.seq, 77 & 0xFFFF);
        assert_eq!(decoded.data, [0; CTRL_DATA_SIZE]);
    }

    #[test]
    fn spi_args_layout() {
        let mut pkt = ControlPacket::request(ControlId::TRANSACT_SPI, 1);
        let args = SpiArgs {
            dev: 0x10,
            data: 0xDEAD_BEEF,
            miso_edge: CLK_EDGE_FALL,
            mosi_edge: CLK_EDGE_RISE,
            num_bits: 24,
            readback: 1,
        };
        pkt.set_spi_args(&args);
        assert_eq!(&pkt.data[0..4], &0x10u32.to_le_bytes());
        assert_eq!(pkt.data[8], b'f');
        assert_eq!(pkt.data[9], b'r');
        assert_eq!(ControlPacket::from_prefix(&pkt.encode()).spi_args(), args);
    }

    #[test]
    fn reg_args_layout() {
        let mut pkt = ControlPacket::request(ControlId::GET_REGISTER, 1);
        let args = RegArgs {
            addr: 0xD400,
            data: 5,
            num_bytes: 4,
            action: RegAction::FpgaPoke32 as u8,
        };
        pkt.set_reg_args(&args);
        assert_eq!(pkt.data[16], 4);
        assert_eq!(pkt.data[17], 3);
        assert_eq!(pkt.reg_args(), args);
        assert_eq!(RegAction::from_u8(args.action), Some(RegAction::FpgaPoke32));
        assert_eq!(RegAction::from_u8(0), None);
    }

    #[test]
    fn i2c_args_fill_union() {
        let mut pkt = ControlPacket::request(ControlId::I2C_WRITE, 1);
        let mut args = I2cArgs {
            addr: 0x50,
            bytes: 3,
            ..Default::default()
        };
        args.data[..3].copy_from_slice(&[1, 2, 3]);
        pkt.set_i2c_args(&args);
        assert_eq!(pkt.i2c_args(), args);
        assert_eq!(2 + I2C_MAX_BYTES, 22);
    }

    #[test]
    fn ip_addr_round_trip() {
        let mut pkt = ControlPacket::default();
        pkt.set_ip_addr(Ipv4Addr::new(192, 168, 10, 2));
        assert_eq!(pkt.ip_addr(), Ipv4Addr::new(192, 168, 10, 2));
        assert_eq!(&pkt.data[..4], &[192, 168, 10, 2]);
    }

    #[test]
    fn control_id_debug() {
        assert_eq!(format!("{:?}", ControlId::WAZZUP_BRO), "ControlId('a')");
        assert_eq!(format!("{:?}", ControlId(0xFFFF_0000)), "ControlId(0xFFFF0000)");
    }
}
