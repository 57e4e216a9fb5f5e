//! Host-side transport traits.
//!
//! The [`DataTransport`] trait abstracts over the datagram link that carries
//! framed sample packets between host and device. Implementations exist for
//! UDP sockets (`sdrlink-transport`) and in-memory mocks for testing
//! (`sdrlink-test-harness`).
//!
//! The [`RegisterIface`] trait abstracts over whatever path the host uses to
//! peek and poke device settings registers. The UDP control client in
//! `sdrlink-host` implements it; DSP proxies are written against it so they
//! can be tested without a device.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Asynchronous datagram transport for framed sample packets.
///
/// Each frame is one complete packet; ownership of the received buffer is
/// handed to the caller as [`Bytes`] so it can be forwarded between tasks
/// without copying.
#[async_trait]
pub trait DataTransport: Send + Sync {
    /// Receive the next frame.
    ///
    /// Waits up to `timeout`; returns [`Error::Timeout`](crate::Error::Timeout)
    /// if nothing arrives. Returns [`Error::StreamClosed`](crate::Error::StreamClosed)
    /// once the transport can never produce another frame.
    async fn recv_frame(&self, timeout: Duration) -> Result<Bytes>;

    /// Send one frame to the device.
    async fn send_frame(&self, frame: Bytes) -> Result<()>;

    /// Largest frame this transport carries, in bytes.
    fn max_frame_size(&self) -> usize;
}

/// Asynchronous access to device settings registers.
#[async_trait]
pub trait RegisterIface: Send + Sync {
    /// Write a 32-bit value to a device register.
    async fn poke32(&self, addr: u32, value: u32) -> Result<()>;

    /// Read a 32-bit device register.
    async fn peek32(&self, addr: u32) -> Result<u32>;
}
