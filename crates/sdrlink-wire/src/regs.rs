//! Settings-register addresses touched by the firmware and the host DSP
//! proxies.
//!
//! Only the receive-control, receive-DSP, and transmit-control banks are
//! described here. Each bank is a run of consecutive 32-bit setting
//! registers starting at a per-lane setting-register index.

/// Byte address of setting register 0.
pub const SETTING_REGS_BASE: u32 = 0xD000;

/// Byte address of setting register `sr`.
pub const fn sr_addr(sr: u32) -> u32 {
    SETTING_REGS_BASE + 4 * sr
}

/// Number of receive DSP lanes.
pub const NUM_RX_LANES: usize = 4;

const SR_RX_CTRL: [u32; NUM_RX_LANES] = [32, 160, 80, 208];
const SR_RX_DSP: [u32; NUM_RX_LANES] = [48, 176, 96, 224];
const SR_TX_CTRL: u32 = 128;
const SR_TX_DSP: u32 = 144;

// ---------------------------------------------------------------------------
// Receive control bank
// ---------------------------------------------------------------------------

/// Stream command word.
pub const RX_CTRL_CMD: u32 = 0;
/// Command time, whole seconds.
pub const RX_CTRL_TIME_SECS: u32 = 1;
/// Command time, ticks. Writing this register latches the command.
pub const RX_CTRL_TIME_TICKS: u32 = 2;
/// Clear the receive state machine.
pub const RX_CTRL_CLEAR: u32 = 3;
/// VRT header template.
pub const RX_CTRL_VRT_HDR: u32 = 4;
/// VRT stream id.
pub const RX_CTRL_VRT_SID: u32 = 5;
/// VRT trailer template.
pub const RX_CTRL_VRT_TLR: u32 = 6;
/// Samples per packet.
pub const RX_CTRL_NSAMPS_PER_PKT: u32 = 7;
/// Number of channels framed together.
pub const RX_CTRL_NCHANNELS: u32 = 8;
/// Wire format and sc8 scalar.
pub const RX_CTRL_FORMAT: u32 = 9;

/// Format word flag selecting the 8-bit wire format.
pub const RX_FORMAT_SC8: u32 = 1 << 18;
/// Mask of the sc8 scalar field in the format word.
pub const RX_FORMAT_SCALAR_MASK: u32 = 0x3FFFF;

/// Stream command "stop now": reload with no samples, now.
pub const RX_CMD_HALT: u32 = 1 << 31 | 1 << 28;

/// Address of register `offset` in the receive-control bank of `lane`.
///
/// Returns `None` for lanes the hardware does not have.
pub fn rx_ctrl_addr(lane: usize, offset: u32) -> Option<u32> {
    SR_RX_CTRL.get(lane).map(|sr| sr_addr(sr + offset))
}

// ---------------------------------------------------------------------------
// Receive DSP bank
// ---------------------------------------------------------------------------

/// Tuning word.
pub const RX_DSP_FREQ: u32 = 0;
/// IQ scale.
pub const RX_DSP_SCALE_IQ: u32 = 1;
/// Decimation control.
pub const RX_DSP_DECIM: u32 = 2;

/// Address of register `offset` in the receive-DSP bank of `lane`.
pub fn rx_dsp_addr(lane: usize, offset: u32) -> Option<u32> {
    SR_RX_DSP.get(lane).map(|sr| sr_addr(sr + offset))
}

// ---------------------------------------------------------------------------
// Transmit banks
// ---------------------------------------------------------------------------

/// Number of channels.
pub const TX_CTRL_NUM_CHAN: u32 = 0;
/// Clear the transmit state machine.
pub const TX_CTRL_CLEAR_STATE: u32 = 1;
/// Stream id used for async reports.
pub const TX_CTRL_REPORT_SID: u32 = 2;
/// Underflow policy.
pub const TX_CTRL_POLICY: u32 = 3;
/// Flow-control update interval in cycles.
pub const TX_CTRL_CYCLES_PER_UP: u32 = 4;
/// Flow-control update interval in packets.
pub const TX_CTRL_PACKETS_PER_UP: u32 = 5;

/// Tuning word.
pub const TX_DSP_FREQ: u32 = 0;
/// IQ scale.
pub const TX_DSP_SCALE_IQ: u32 = 1;
/// Interpolation control.
pub const TX_DSP_INTERP: u32 = 2;

/// Underflow policy: resume on the next packet.
pub const TX_POLICY_NEXT_PACKET: u32 = 1;
/// Underflow policy: drop until the next start of burst.
pub const TX_POLICY_NEXT_BURST: u32 = 2;

/// Address of register `offset` in the transmit-control bank.
pub const fn tx_ctrl_addr(offset: u32) -> u32 {
    sr_addr(SR_TX_CTRL + offset)
}

/// Address of register `offset` in the transmit-DSP bank.
pub const fn tx_dsp_addr(offset: u32) -> u32 {
    sr_addr(SR_TX_DSP + offset)
}
