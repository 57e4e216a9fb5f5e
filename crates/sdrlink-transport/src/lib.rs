//! Transport implementations for sdrlink.
//!
//! - [`UdpTransport`]: a bound UDP socket with timed receive
//! - [`UdpDataTransport`]: the device data path, implementing
//!   [`DataTransport`](sdrlink_core::DataTransport) for the host streaming
//!   engine
//!
//! # Example
//!
//! ```no_run
//! use sdrlink_transport::UdpDataTransport;
//! use sdrlink_core::DataTransport;
//! use std::time::Duration;
//!
//! # async fn example() -> sdrlink_core::Result<()> {
//! // Stream receive lanes 0 and 1 from the device to this host.
//! let data = UdpDataTransport::open("192.168.10.2".parse().unwrap(), &[0, 1]).await?;
//! let frame = data.recv_frame(Duration::from_secs(1)).await?;
//! println!("{} byte packet", frame.len());
//! # Ok(())
//! # }
//! ```

pub mod data;
pub mod udp;

pub use data::UdpDataTransport;
pub use udp::UdpTransport;
