//! sdrlink-wire: On-the-wire formats shared by device and host.
//!
//! - [`vrt`] -- VITA-49 style IF-data / context packet header codec
//! - [`control`] -- fixed-size control request/response packets
//! - [`ports`] -- reserved UDP ports, stream ids, and the port-to-lane map
//! - [`regs`] -- settings-register addresses for the DSP control banks
//!
//! Every encoder here is pure: it writes into a caller-supplied buffer and
//! never allocates on the hot path.

pub mod control;
pub mod ports;
pub mod regs;
pub mod vrt;

pub use control::{ControlId, ControlPacket, RegAction, FW_COMPAT_NUM};
pub use vrt::{IfPacketInfo, PacketType};
