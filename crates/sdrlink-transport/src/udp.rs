//! Datagram socket used by the sdrlink data path.
//!
//! [`UdpTransport`] wraps a [`tokio::net::UdpSocket`] with timeouts and the
//! error mapping used across sdrlink. It does not implement
//! [`DataTransport`](sdrlink_core::DataTransport) itself: it has no notion
//! of a device. See [`UdpDataTransport`](crate::UdpDataTransport) for that.
//!
//! # Example
//!
//! ```no_run
//! use sdrlink_transport::UdpTransport;
//! use std::time::Duration;
//!
//! # async fn example() -> sdrlink_core::Result<()> {
//! let transport = UdpTransport::bind("0.0.0.0:0").await?;
//! transport.send_to(&[0; 4], "192.168.10.2:43520".parse().unwrap()).await?;
//!
//! let mut buf = [0u8; 2048];
//! let (n, src) = transport.recv_from(&mut buf, Duration::from_secs(1)).await?;
//! println!("{n} bytes from {src}");
//! # Ok(())
//! # }
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use sdrlink_core::error::{Error, Result};
use tokio::net::UdpSocket;

/// A bound UDP socket with timed receive.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    local_addr: SocketAddr,
}

impl UdpTransport {
    /// Bind to a local `host:port`. Port 0 picks any free port.
    pub async fn bind(addr: &str) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await.map_err(|e| {
            tracing::error!(addr = %addr, error = %e, "Failed to bind UDP socket");
            Error::Io(e)
        })?;

        let local_addr = socket.local_addr().map_err(|e| {
            tracing::error!(error = %e, "Failed to get local address");
            Error::Io(e)
        })?;

        tracing::debug!(local_addr = %local_addr, "UDP socket bound");

        Ok(Self { socket, local_addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Send `data` as one datagram.
    pub async fn send_to(&self, data: &[u8], addr: SocketAddr) -> Result<()> {
        tracing::trace!(remote = %addr, bytes = data.len(), "Sending datagram");

        self.socket.send_to(data, addr).await.map_err(|e| {
            tracing::error!(
                local = %self.local_addr,
                remote = %addr,
                error = %e,
                "Failed to send datagram"
            );
            Error::Io(e)
        })?;
        Ok(())
    }

    /// Receive one datagram, waiting at most `timeout`.
    ///
    /// Bytes beyond `buf.len()` are discarded.
    ///
    /// # Errors
    ///
    /// [`Error::Timeout`] if nothing arrives in time.
    pub async fn recv_from(
        &self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<(usize, SocketAddr)> {
        match tokio::time::timeout(timeout, self.socket.recv_from(buf)).await {
            Ok(Ok((n, src))) => {
                tracing::trace!(remote = %src, bytes = n, "Received datagram");
                Ok((n, src))
            }
            Ok(Err(e)) => {
                tracing::error!(local = %self.local_addr, error = %e, "Failed to receive datagram");
                Err(Error::Io(e))
            }
            Err(_) => Err(Error::Timeout),
        }
    }

    /// Like [`recv_from`](Self::recv_from) without the source address.
    pub async fn recv(&self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let (n, _src) = self.recv_from(buf, timeout).await?;
        Ok(n)
    }

    /// Send one datagram to the peer set by [`connect`](Self::connect).
    pub async fn send(&self, data: &[u8]) -> Result<()> {
        self.socket.send(data).await.map_err(|e| {
            tracing::error!(local = %self.local_addr, error = %e, "Failed to send datagram");
            Error::Io(e)
        })?;
        Ok(())
    }

    /// Restrict this socket to one peer. The OS then drops datagrams from
    /// any other source.
    pub async fn connect(&self, addr: SocketAddr) -> Result<()> {
        self.socket.connect(addr).await.map_err(|e| {
            tracing::error!(
                local = %self.local_addr,
                remote = %addr,
                error = %e,
                "Failed to connect UDP socket"
            );
            Error::Io(e)
        })?;

        tracing::debug!(local = %self.local_addr, remote = %addr, "UDP socket connected");
        Ok(())
    }
}
