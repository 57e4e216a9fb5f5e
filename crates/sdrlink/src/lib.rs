//! # sdrlink -- sample streaming for software-defined radios
//!
//! `sdrlink` moves timestamped IQ samples and out-of-band control and status
//! messages between an embedded SDR device and a host application over
//! UDP.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use sdrlink::{Complex, CpuFormat};
//! use sdrlink::host::{StreamArgs, StreamCmd, StreamMode};
//!
//! #[tokio::main]
//! async fn main() -> sdrlink::Result<()> {
//!     let link = sdrlink::connect("192.168.10.2".parse().unwrap(), 1).await?;
//!     link.device.set_rx_rate(0, 1e6).await?;
//!
//!     let mut rx = link.device.get_rx_stream(&StreamArgs::new(CpuFormat::Fc32)).await?;
//!     link.device
//!         .issue_stream_cmd(0, &StreamCmd::now(StreamMode::StartContinuous))
//!         .await?;
//!
//!     let mut buf = vec![Complex::<f32>::default(); rx.max_num_samps()];
//!     let (n, md) = rx.recv(&mut [&mut buf[..]], Duration::from_secs(1)).await?;
//!     println!("{n} samples, {:?}", md.error_code);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! | Crate                   | Purpose                                          |
//! |-------------------------|--------------------------------------------------|
//! | `sdrlink-core`          | Types, errors, host transport traits, device HAL |
//! | `sdrlink-wire`          | Packet and control wire formats, ports, registers|
//! | `sdrlink-firmware`      | Device-side dispatcher, router, event loop       |
//! | `sdrlink-host`          | Demultiplexer, streamers, async events, control  |
//! | `sdrlink-transport`     | UDP data transport                               |
//! | **`sdrlink`**           | This facade crate                                |
//!
//! ## Feature Flags
//!
//! | Feature    | Enables                               | Default |
//! |------------|---------------------------------------|---------|
//! | `host`     | [`host`] and [`transport`], [`connect`] | yes   |
//! | `firmware` | [`firmware`] (device-side logic)      | no      |
//! | `full`     | Everything                            | no      |

pub use sdrlink_core::*;

/// Wire formats shared by host and device.
pub mod wire {
    pub use sdrlink_wire::*;
}

/// Host-side streaming engine.
#[cfg(feature = "host")]
pub mod host {
    pub use sdrlink_host::*;
}

/// UDP transports.
#[cfg(feature = "host")]
pub mod transport {
    pub use sdrlink_transport::*;
}

/// Device-side control dispatcher, data router, and polling loop.
#[cfg(feature = "firmware")]
pub mod firmware {
    pub use sdrlink_firmware::*;
}

#[cfg(feature = "host")]
mod connect;

#[cfg(feature = "host")]
pub use connect::{Link, connect};
