//! Reserved UDP ports, stream ids, and packet size limits.

/// Control request/response port.
pub const CTRL_PORT: u16 = 49152;

/// Base port of the low-rate UART message channel.
pub const UART_BASE_PORT: u16 = 49170;

/// Receive data port for logical DSP 0, bank 1.
pub const RX_DSP0_PORT: u16 = 43520;
/// Receive data port for logical DSP 0, bank 2.
pub const RX_DSP0_2_PORT: u16 = 43521;
/// Receive data port for logical DSP 1, bank 1.
pub const RX_DSP1_PORT: u16 = 43522;
/// Receive data port for logical DSP 1, bank 2.
pub const RX_DSP1_2_PORT: u16 = 43523;

/// All receive data ports.
pub const RX_DSP_PORTS: [u16; 4] = [RX_DSP0_PORT, RX_DSP1_PORT, RX_DSP0_2_PORT, RX_DSP1_2_PORT];

/// Transmit data port. Packets sent here go to the transmit DSP without
/// passing through the firmware.
pub const TX_DSP0_PORT: u16 = 43524;

/// Largest framed packet the FPGA packet buffer accepts, in bytes.
pub const MAX_PACKET_BYTES: usize = 2048;

/// Reserved stream id for transmit-side async status packets.
pub const TX_ASYNC_SID: u32 = 1;

/// Stream id of receive DSP 0; DSP `n` uses `RX_SID_BASE + n`.
pub const RX_SID_BASE: u32 = 2;

/// Stream id of transmit DSP 0; DSP `n` uses `TX_SID_BASE + n`.
pub const TX_SID_BASE: u32 = 0x10;

/// Map a receive data port to its hardware DSP lane.
///
/// The two logical DSPs each have two physical banks; lanes are numbered
/// bank-major within each DSP:
///
/// | port             | lane |
/// |------------------|------|
/// | `RX_DSP0_PORT`   | 0    |
/// | `RX_DSP0_2_PORT` | 1    |
/// | `RX_DSP1_PORT`   | 2    |
/// | `RX_DSP1_2_PORT` | 3    |
pub fn rx_port_to_lane(port: u16) -> Option<usize> {
    match port {
        RX_DSP0_PORT => Some(0),
        RX_DSP0_2_PORT => Some(1),
        RX_DSP1_PORT => Some(2),
        RX_DSP1_2_PORT => Some(3),
        _ => None,
    }
}

/// Inverse of [`rx_port_to_lane`].
pub fn lane_to_rx_port(lane: usize) -> Option<u16> {
    match lane {
        0 => Some(RX_DSP0_PORT),
        1 => Some(RX_DSP0_2_PORT),
        2 => Some(RX_DSP1_PORT),
        3 => Some(RX_DSP1_2_PORT),
        _ => None,
    }
}
