//! sdrlink-core: Core types, error definitions, and collaborator traits.
//!
//! This crate defines the abstractions shared by both ends of the sdrlink
//! sample-streaming stack. The device firmware (`sdrlink-firmware`) and the
//! host streaming engine (`sdrlink-host`) depend on these types without
//! depending on each other.
//!
//! # Key types
//!
//! - [`Error`] / [`Result`] -- error handling
//! - [`AsyncEvent`] / [`EventCode`] -- device-originated status records
//! - [`TimeSpec`], [`OtwFormat`], [`CpuFormat`], [`Complex`] -- stream types
//! - [`DataTransport`] / [`RegisterIface`] -- host-side transport seams
//! - [`hal::Board`] -- device-side collaborator bundle

pub mod error;
pub mod events;
pub mod hal;
pub mod transport;
pub mod types;

pub use error::{Error, Result};
pub use events::{AsyncEvent, EventCode};
pub use transport::{DataTransport, RegisterIface};
pub use types::*;
