//! Firmware virtual registers.
//!
//! A small bank of persistent 32-bit values the host can read and write
//! through the control port. The bank lives for as long as the device is
//! powered; there is no teardown.

use sdrlink_wire::control::{FW_REG_VER_MINOR, FW_VER_MINOR, NUM_FW_REGS};

/// The firmware register bank.
///
/// Every access is bounds-checked. Indices outside the bank are reported
/// to the caller rather than touching memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareRegisters {
    regs: [u32; NUM_FW_REGS],
}

impl FirmwareRegisters {
    /// A zeroed bank with the minor-version register preloaded.
    pub fn new() -> Self {
        let mut regs = [0u32; NUM_FW_REGS];
        regs[FW_REG_VER_MINOR as usize] = FW_VER_MINOR;
        FirmwareRegisters { regs }
    }

    /// Read register `index`. Returns `None` when out of range.
    pub fn peek(&self, index: u32) -> Option<u32> {
        self.regs.get(index as usize).copied()
    }

    /// Write register `index`. Returns `false` (and changes nothing) when
    /// out of range.
    pub fn poke(&mut self, index: u32, value: u32) -> bool {
        match self.regs.get_mut(index as usize) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Number of registers in the bank.
    pub fn len(&self) -> usize {
        self.regs.len()
    }

    /// Always false; the bank has a fixed nonzero size.
    pub fn is_empty(&self) -> bool {
        self.regs.is_empty()
    }
}

impl Default for FirmwareRegisters {
    fn default() -> Self {
        Self::new()
    }
}
