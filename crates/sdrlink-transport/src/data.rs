//! [`DataTransport`] over UDP.
//!
//! One socket carries every stream. The device learns where to send a
//! receive lane's samples from the first datagram it sees on that lane's
//! data port, so [`UdpDataTransport::open_lane`] sends a short datagram
//! from this socket to the port. Transmit frames go to the transmit data
//! port. Datagrams from any address other than the device are dropped.

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::time::Instant;

use sdrlink_core::error::{Error, Result};
use sdrlink_core::transport::DataTransport;
use sdrlink_wire::ports::{MAX_PACKET_BYTES, TX_DSP0_PORT, lane_to_rx_port};

use crate::udp::UdpTransport;

/// Payload of the datagram that binds a receive lane. The router ignores
/// empty datagrams, so it must carry at least one byte.
const OPEN_PAYLOAD: [u8; 4] = [0; 4];

/// The data path to one device.
#[derive(Debug)]
pub struct UdpDataTransport {
    udp: UdpTransport,
    device: IpAddr,
    tx_addr: SocketAddr,
    max_frame_size: usize,
    foreign: AtomicU64,
}

impl UdpDataTransport {
    /// Bind a fresh socket for the device at `device` and open `lanes`.
    pub async fn open(device: IpAddr, lanes: &[usize]) -> Result<Self> {
        let local = if device.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let transport = Self::new(UdpTransport::bind(local).await?, device);
        for &lane in lanes {
            transport.open_lane(lane).await?;
        }
        Ok(transport)
    }

    /// Use an already bound socket.
    pub fn new(udp: UdpTransport, device: IpAddr) -> Self {
        UdpDataTransport {
            udp,
            device,
            tx_addr: SocketAddr::new(device, TX_DSP0_PORT),
            max_frame_size: MAX_PACKET_BYTES,
            foreign: AtomicU64::new(0),
        }
    }

    /// Send transmit frames to `port` instead of the default.
    pub fn with_tx_port(mut self, port: u16) -> Self {
        self.tx_addr.set_port(port);
        self
    }

    /// Ask the device to stream receive lane `lane` to this socket.
    pub async fn open_lane(&self, lane: usize) -> Result<()> {
        let port = lane_to_rx_port(lane)
            .ok_or_else(|| Error::InvalidParameter(format!("no receive lane {lane}")))?;
        self.open_port(port).await
    }

    /// Send the binding datagram to an explicit data port.
    pub async fn open_port(&self, port: u16) -> Result<()> {
        let addr = SocketAddr::new(self.device, port);
        self.udp.send_to(&OPEN_PAYLOAD, addr).await?;
        tracing::debug!(device = %addr, local = %self.udp.local_addr(), "Data port opened");
        Ok(())
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.udp.local_addr()
    }

    pub fn device(&self) -> IpAddr {
        self.device
    }

    /// Datagrams dropped because they came from another address.
    pub fn foreign_datagrams(&self) -> u64 {
        self.foreign.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl DataTransport for UdpDataTransport {
    async fn recv_frame(&self, timeout: Duration) -> Result<Bytes> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::Timeout);
            }

            let mut buf = BytesMut::zeroed(self.max_frame_size);
            let (n, src) = self.udp.recv_from(&mut buf, remaining).await?;
            if src.ip() != self.device {
                self.foreign.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(src = %src, bytes = n, "Datagram from foreign address dropped");
                continue;
            }
            buf.truncate(n);
            return Ok(buf.freeze());
        }
    }

    async fn send_frame(&self, frame: Bytes) -> Result<()> {
        if frame.len() > self.max_frame_size {
            return Err(Error::InvalidParameter(format!(
                "frame of {} bytes exceeds maximum {}",
                frame.len(),
                self.max_frame_size
            )));
        }
        self.udp.send_to(&frame, self.tx_addr).await
    }

    fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}
