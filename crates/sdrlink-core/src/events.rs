//! Asynchronous device event types.
//!
//! Events are emitted by the device as non-data packets on a reserved
//! stream id and delivered to the application through a bounded queue on
//! the host. They carry status only, never samples.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use crate::types::TimeSpec;

/// Bitmask of conditions reported by an [`AsyncEvent`].
///
/// The numeric values are the context codes the device places in the
/// first payload word of an async status packet.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EventCode(pub u32);

impl EventCode {
    /// A burst was transmitted successfully.
    pub const BURST_ACK: EventCode = EventCode(0x1);
    /// The transmit DSP ran out of samples between packets.
    pub const UNDERFLOW: EventCode = EventCode(0x2);
    /// A packet sequence error was detected.
    pub const SEQ_ERROR: EventCode = EventCode(0x4);
    /// A packet arrived with a timestamp that had already passed.
    pub const TIME_ERROR: EventCode = EventCode(0x8);
    /// The transmit DSP ran out of samples inside a packet.
    pub const UNDERFLOW_IN_PACKET: EventCode = EventCode(0x10);
    /// A sequence error was detected inside a burst.
    pub const SEQ_ERROR_IN_BURST: EventCode = EventCode(0x20);
    /// The payload carries user-defined data.
    pub const USER_PAYLOAD: EventCode = EventCode(0x40);

    /// Raw bit value.
    pub fn bits(&self) -> u32 {
        self.0
    }

    /// True if any bit of `other` is set in `self`.
    pub fn intersects(&self, other: EventCode) -> bool {
        self.0 & other.0 != 0
    }

    /// True if every bit of `other` is set in `self`.
    pub fn contains(&self, other: EventCode) -> bool {
        self.0 & other.0 == other.0
    }

    /// Single-character marker used on the fast-path log for this code:
    /// `U` for underflow, `S` for sequence errors, `L` for late packets.
    pub fn fastpath_marker(&self) -> Option<char> {
        if self.intersects(EventCode::UNDERFLOW | EventCode::UNDERFLOW_IN_PACKET) {
            Some('U')
        } else if self.intersects(EventCode::SEQ_ERROR | EventCode::SEQ_ERROR_IN_BURST) {
            Some('S')
        } else if self.intersects(EventCode::TIME_ERROR) {
            Some('L')
        } else {
            None
        }
    }
}

impl BitOr for EventCode {
    type Output = EventCode;

    fn bitor(self, rhs: EventCode) -> EventCode {
        EventCode(self.0 | rhs.0)
    }
}

impl BitOrAssign for EventCode {
    fn bitor_assign(&mut self, rhs: EventCode) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for EventCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: &[(EventCode, &str)] = &[
            (EventCode::BURST_ACK, "BURST_ACK"),
            (EventCode::UNDERFLOW, "UNDERFLOW"),
            (EventCode::SEQ_ERROR, "SEQ_ERROR"),
            (EventCode::TIME_ERROR, "TIME_ERROR"),
            (EventCode::UNDERFLOW_IN_PACKET, "UNDERFLOW_IN_PACKET"),
            (EventCode::SEQ_ERROR_IN_BURST, "SEQ_ERROR_IN_BURST"),
            (EventCode::USER_PAYLOAD, "USER_PAYLOAD"),
        ];
        let mut first = true;
        for (code, name) in NAMES {
            if self.contains(*code) {
                if !first {
                    f.write_str(" | ")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        if first {
            write!(f, "EventCode(0x{:x})", self.0)?;
        }
        Ok(())
    }
}

/// A device-originated status record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AsyncEvent {
    /// Channel index the event refers to.
    pub channel: usize,
    /// Whether `time_spec` carries a valid device time.
    pub has_time_spec: bool,
    /// Device time at which the condition was detected.
    pub time_spec: TimeSpec,
    /// What happened.
    pub event_code: EventCode,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fastpath_markers() {
        assert_eq!(EventCode::UNDERFLOW.fastpath_marker(), Some('U'));
        assert_eq!(EventCode::UNDERFLOW_IN_PACKET.fastpath_marker(), Some('U'));
        assert_eq!(EventCode::SEQ_ERROR.fastpath_marker(), Some('S'));
        assert_eq!(EventCode::SEQ_ERROR_IN_BURST.fastpath_marker(), Some('S'));
        assert_eq!(EventCode::TIME_ERROR.fastpath_marker(), Some('L'));
        assert_eq!(EventCode::BURST_ACK.fastpath_marker(), None);
    }

    #[test]
    fn underflow_takes_precedence_over_time_error() {
        let code = EventCode::TIME_ERROR | EventCode::UNDERFLOW;
        assert_eq!(code.fastpath_marker(), Some('U'));
        assert!(code.contains(EventCode::TIME_ERROR));
    }

    #[test]
    fn debug_lists_set_bits() {
        let code = EventCode::UNDERFLOW | EventCode::SEQ_ERROR;
        assert_eq!(format!("{:?}", code), "UNDERFLOW | SEQ_ERROR");
        assert_eq!(format!("{:?}", EventCode(0x100)), "EventCode(0x100)");
    }
}
