//! sdrlink-firmware: Device-side control and data-path logic.
//!
//! This crate is the soft-core half of sdrlink. It is written against the
//! collaborator traits in [`sdrlink_core::hal`] and never touches hardware
//! directly, so the same logic runs on a board and against
//! `sdrlink_test_harness::MockBoard`.
//!
//! - [`Dispatcher`] serves control-port requests (addressing, register
//!   peek/poke, SPI, I2C, echo, vendor actions).
//! - [`DataRouter`] binds receive data ports to DSP lanes and halts lanes
//!   whose peer became unreachable.
//! - [`Firmware`] owns the board and runs the cooperative polling loop.
//!
//! Everything here is synchronous and non-blocking.

pub mod dispatcher;
pub mod firmware;
pub mod registers;
pub mod router;

pub use dispatcher::{Addressing, Capabilities, ControlReply, Dispatcher};
pub use firmware::Firmware;
pub use registers::FirmwareRegisters;
pub use router::{DataRouter, RouteOutcome};
