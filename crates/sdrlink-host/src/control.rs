//! UDP client for the device control port.
//!
//! Each request carries a fresh sequence number and the client waits for
//! the response that echoes it; late responses to earlier requests are
//! discarded. One request is in flight at a time.
//!
//! # Example
//!
//! ```no_run
//! use sdrlink_host::control::ControlClient;
//! use std::time::Duration;
//!
//! # async fn example() -> sdrlink_core::Result<()> {
//! let ctrl = ControlClient::connect("192.168.10.2".parse().unwrap(), Duration::from_millis(500)).await?;
//! let ip = ctrl.probe_address().await?;
//! let value = ctrl.peek32(0xD000).await?;
//! # Ok(())
//! # }
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use sdrlink_core::error::{Error, Result};
use sdrlink_core::transport::RegisterIface;
use sdrlink_wire::control::{
    CLK_EDGE_FALL, CLK_EDGE_RISE, CTRL_PACKET_SIZE, ControlId, ControlPacket, EchoArgs,
    FW_COMPAT_NUM, I2C_MAX_BYTES, I2cArgs, MAX_ECHO_LEN, RegAction, RegArgs, SpiArgs,
    ZPU_GET_VCTCXO_DAC, ZPU_SET_VCTCXO_DAC, ZpuArgs,
};
use sdrlink_wire::ports::CTRL_PORT;
use sdrlink_transport::UdpTransport;

/// Default time to wait for a response.
pub const DEFAULT_CONTROL_TIMEOUT: Duration = Duration::from_millis(1000);

/// Minimum decodable response: the three header words.
const MIN_RESPONSE: usize = 12;

/// SPI clock edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpiEdge {
    Rise,
    Fall,
}

impl SpiEdge {
    fn code(self) -> u8 {
        match self {
            SpiEdge::Rise => CLK_EDGE_RISE,
            SpiEdge::Fall => CLK_EDGE_FALL,
        }
    }
}

/// Client for the device control port.
#[derive(Debug)]
pub struct ControlClient {
    udp: UdpTransport,
    peer: SocketAddr,
    seq: AtomicU32,
    timeout: Duration,
    in_flight: Mutex<()>,
}

impl ControlClient {
    /// Bind an ephemeral local port and connect it to the control port of
    /// the device at `ip`.
    pub async fn connect(ip: IpAddr, timeout: Duration) -> Result<Self> {
        Self::connect_addr(SocketAddr::new(ip, CTRL_PORT), timeout).await
    }

    /// Connect to an explicit control address.
    pub async fn connect_addr(peer: SocketAddr, timeout: Duration) -> Result<Self> {
        let local = if peer.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let udp = UdpTransport::bind(local).await?;
        udp.connect(peer).await?;
        tracing::debug!(peer = %peer, "Control client connected");

        Ok(ControlClient {
            udp,
            peer,
            seq: AtomicU32::new(0),
            timeout,
            in_flight: Mutex::new(()),
        })
    }

    /// The device control address.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// The response timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send `request` and wait for the response carrying `expect`.
    /// Returns the decoded response and its datagram length.
    async fn transact(&self, request: ControlPacket, expect: ControlId) -> Result<(ControlPacket, usize)> {
        let (reply, n) = self.exchange(request).await?;
        if reply.id == expect {
            return Ok((reply, n));
        }
        if reply.id == ControlId::WAZZUP_DUDE || reply.id == ControlId::UMTRX_RESPONSE {
            // The device only answers with an address when it did not
            // accept our protocol version.
            return Err(Error::ProtocolVersionMismatch {
                expected: FW_COMPAT_NUM,
                actual: reply.proto_ver,
            });
        }
        Err(Error::Protocol(format!(
            "expected {:?} in response to {:?}, got {:?}",
            expect, request.id, reply.id
        )))
    }

    /// Send `request` with a fresh sequence number and wait for the
    /// response that echoes it, whatever its opcode.
    async fn exchange(&self, mut request: ControlPacket) -> Result<(ControlPacket, usize)> {
        let _guard = self.in_flight.lock().await;
        request.seq = self.seq.fetch_add(1, Ordering::Relaxed);
        self.udp.send(&request.encode()).await?;

        let deadline = Instant::now() + self.timeout;
        let mut buf = vec![0u8; MAX_ECHO_LEN];

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let n = match self.udp.recv(&mut buf, remaining).await {
                Ok(n) => n,
                Err(Error::Timeout) => {
                    tracing::debug!(id = ?request.id, seq = request.seq, "Control request timed out");
                    return Err(Error::Timeout);
                }
                Err(e) => return Err(e),
            };
            if n < MIN_RESPONSE {
                tracing::debug!(len = n, "Short control response ignored");
                continue;
            }

            let reply = ControlPacket::from_prefix(&buf[..n]);
            if reply.seq != request.seq {
                tracing::trace!(expected = request.seq, got = reply.seq, "Stale control response");
                continue;
            }
            return Ok((reply, n));
        }
    }

    /// Ask the device for its IPv4 address.
    ///
    /// Standard builds answer the standard probe. UmTRX builds answer only
    /// their own probe and reject the standard one as unrecognized, so the
    /// UmTRX probe is tried next.
    pub async fn probe_address(&self) -> Result<Ipv4Addr> {
        if let Some(ip) = self.probe_with(ControlId::WAZZUP_BRO, ControlId::WAZZUP_DUDE).await? {
            return Ok(ip);
        }
        tracing::debug!(peer = %self.peer, "Standard probe unrecognized, trying UmTRX probe");
        self.probe_with(ControlId::UMTRX_REQUEST, ControlId::UMTRX_RESPONSE)
            .await?
            .ok_or_else(|| Error::Protocol("device recognizes no addressing probe".into()))
    }

    /// One probe attempt. `None` means the device did not recognize it.
    async fn probe_with(&self, request: ControlId, response: ControlId) -> Result<Option<Ipv4Addr>> {
        let (reply, _) = self.exchange(ControlPacket::request(request, 0)).await?;
        if reply.id == ControlId::HUH_WHAT {
            return Ok(None);
        }
        if reply.id != response {
            return Err(Error::Protocol(format!(
                "expected {:?} in response to {:?}, got {:?}",
                response, request, reply.id
            )));
        }
        if reply.proto_ver != FW_COMPAT_NUM {
            return Err(Error::ProtocolVersionMismatch {
                expected: FW_COMPAT_NUM,
                actual: reply.proto_ver,
            });
        }
        Ok(Some(reply.ip_addr()))
    }

    async fn reg(&self, action: RegAction, addr: u32, data: u32, num_bytes: u8) -> Result<u32> {
        let mut request = ControlPacket::request(ControlId::GET_REGISTER, 0);
        request.set_reg_args(&RegArgs {
            addr,
            data,
            num_bytes,
            action: action as u8,
        });
        let (reply, _) = self.transact(request, ControlId::GOT_REGISTER).await?;
        Ok(reply.reg_args().data)
    }

    pub async fn peek32(&self, addr: u32) -> Result<u32> {
        self.reg(RegAction::FpgaPeek32, addr, 0, 4).await
    }

    pub async fn poke32(&self, addr: u32, value: u32) -> Result<()> {
        self.reg(RegAction::FpgaPoke32, addr, value, 4).await.map(|_| ())
    }

    pub async fn peek16(&self, addr: u32) -> Result<u16> {
        self.reg(RegAction::FpgaPeek16, addr, 0, 2).await.map(|v| v as u16)
    }

    pub async fn poke16(&self, addr: u32, value: u16) -> Result<()> {
        self.reg(RegAction::FpgaPoke16, addr, u32::from(value), 2)
            .await
            .map(|_| ())
    }

    /// Read a firmware virtual register.
    pub async fn fw_peek32(&self, index: u32) -> Result<u32> {
        self.reg(RegAction::FwPeek32, index, 0, 4).await
    }

    /// Write a firmware virtual register.
    pub async fn fw_poke32(&self, index: u32, value: u32) -> Result<()> {
        self.reg(RegAction::FwPoke32, index, value, 4).await.map(|_| ())
    }

    /// Run one SPI transaction. Returns the read-back word, or 0 when
    /// `readback` is false.
    pub async fn transact_spi(
        &self,
        dev: u32,
        data: u32,
        num_bits: u8,
        mosi_edge: SpiEdge,
        miso_edge: SpiEdge,
        readback: bool,
    ) -> Result<u32> {
        let mut request = ControlPacket::request(ControlId::TRANSACT_SPI, 0);
        request.set_spi_args(&SpiArgs {
            dev,
            data,
            miso_edge: miso_edge.code(),
            mosi_edge: mosi_edge.code(),
            num_bits,
            readback: readback as u8,
        });
        let (reply, _) = self.transact(request, ControlId::TRANSACTED_SPI).await?;
        Ok(reply.spi_args().data)
    }

    /// Read `num_bytes` from the I2C device at `addr`.
    pub async fn read_i2c(&self, addr: u8, num_bytes: usize) -> Result<Vec<u8>> {
        if num_bytes > I2C_MAX_BYTES {
            return Err(Error::InvalidParameter(format!(
                "I2C read of {num_bytes} bytes exceeds maximum {I2C_MAX_BYTES}"
            )));
        }
        let mut request = ControlPacket::request(ControlId::I2C_READ, 0);
        request.set_i2c_args(&I2cArgs {
            addr,
            bytes: num_bytes as u8,
            data: [0; I2C_MAX_BYTES],
        });
        let (reply, _) = self.transact(request, ControlId::I2C_DATA).await?;
        let args = reply.i2c_args();
        let n = usize::from(args.bytes).min(num_bytes);
        Ok(args.data[..n].to_vec())
    }

    /// Write `bytes` to the I2C device at `addr`.
    pub async fn write_i2c(&self, addr: u8, bytes: &[u8]) -> Result<()> {
        if bytes.len() > I2C_MAX_BYTES {
            return Err(Error::InvalidParameter(format!(
                "I2C write of {} bytes exceeds maximum {I2C_MAX_BYTES}",
                bytes.len()
            )));
        }
        let mut args = I2cArgs {
            addr,
            bytes: bytes.len() as u8,
            data: [0; I2C_MAX_BYTES],
        };
        args.data[..bytes.len()].copy_from_slice(bytes);
        let mut request = ControlPacket::request(ControlId::I2C_WRITE, 0);
        request.set_i2c_args(&args);
        self.transact(request, ControlId::I2C_WRITE_DONE).await?;
        Ok(())
    }

    /// Ask for a `len`-byte echo response. Returns the length received.
    ///
    /// `len` must leave room for the response header.
    pub async fn echo(&self, len: usize) -> Result<usize> {
        if !(CTRL_PACKET_SIZE..=MAX_ECHO_LEN).contains(&len) {
            return Err(Error::InvalidParameter(format!(
                "echo length {len} outside {CTRL_PACKET_SIZE}..={MAX_ECHO_LEN}"
            )));
        }
        let mut request = ControlPacket::request(ControlId::HOLLER, 0);
        request.set_echo_args(&EchoArgs { len: len as u32 });
        let (reply, n) = self.transact(request, ControlId::HOLLER_BACK).await?;
        if reply.echo_args().len as usize != CTRL_PACKET_SIZE {
            tracing::debug!(len = reply.echo_args().len, "Device saw a different request length");
        }
        Ok(n)
    }

    /// Read the reference oscillator trim DAC.
    pub async fn vctcxo_dac(&self) -> Result<u16> {
        let reply = self.zpu(ZPU_GET_VCTCXO_DAC, 0).await?;
        Ok(reply.data as u16)
    }

    /// Set the reference oscillator trim DAC.
    pub async fn set_vctcxo_dac(&self, value: u16) -> Result<()> {
        self.zpu(ZPU_SET_VCTCXO_DAC, u32::from(value)).await.map(|_| ())
    }

    async fn zpu(&self, action: u32, data: u32) -> Result<ZpuArgs> {
        let mut request = ControlPacket::request(ControlId::UMTRX_ZPU_REQUEST, 0);
        request.set_zpu_args(&ZpuArgs { action, data });
        let (reply, _) = self.transact(request, ControlId::UMTRX_ZPU_RESPONSE).await?;
        Ok(reply.zpu_args())
    }
}

#[async_trait]
impl RegisterIface for ControlClient {
    async fn poke32(&self, addr: u32, value: u32) -> Result<()> {
        ControlClient::poke32(self, addr, value).await
    }

    async fn peek32(&self, addr: u32) -> Result<u32> {
        ControlClient::peek32(self, addr).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::UdpSocket;

    /// A device stand-in that answers each request with `respond`.
    async fn fake_device<F>(respond: F) -> SocketAddr
    where
        F: Fn(ControlPacket) -> Vec<Vec<u8>> + Send + 'static,
    {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = [0u8; 2048];
            while let Ok((n, src)) = socket.recv_from(&mut buf).await {
                for reply in respond(ControlPacket::from_prefix(&buf[..n])) {
                    let _ = socket.send_to(&reply, src).await;
                }
            }
        });
        addr
    }

    fn answer(request: ControlPacket, id: ControlId) -> ControlPacket {
        let mut reply = request;
        reply.id = id;
        reply
    }

    #[tokio::test]
    async fn stale_responses_are_skipped() {
        let device = fake_device(|req| {
            let mut stale = answer(req, ControlId::GOT_REGISTER);
            stale.seq = req.seq.wrapping_add(100);
            let mut good = answer(req, ControlId::GOT_REGISTER);
            let mut args = req.reg_args();
            args.data = 0xABCD;
            good.set_reg_args(&args);
            vec![stale.encode().to_vec(), good.encode().to_vec()]
        })
        .await;

        let ctrl = ControlClient::connect_addr(device, Duration::from_secs(1)).await.unwrap();
        assert_eq!(ctrl.peek32(0x10).await.unwrap(), 0xABCD);
    }

    #[tokio::test]
    async fn address_reply_means_version_mismatch() {
        let device = fake_device(|req| {
            let mut reply = answer(req, ControlId::WAZZUP_DUDE);
            reply.proto_ver = 9;
            vec![reply.encode().to_vec()]
        })
        .await;

        let ctrl = ControlClient::connect_addr(device, Duration::from_secs(1)).await.unwrap();
        let err = ctrl.poke32(0, 1).await.unwrap_err();
        assert!(
            matches!(err, Error::ProtocolVersionMismatch { expected: 12, actual: 9 }),
            "got {err:?}"
        );
        assert!(matches!(
            ctrl.probe_address().await,
            Err(Error::ProtocolVersionMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn umtrx_address_reply_means_version_mismatch() {
        let device = fake_device(|req| {
            let mut reply = answer(req, ControlId::UMTRX_RESPONSE);
            reply.proto_ver = 9;
            vec![reply.encode().to_vec()]
        })
        .await;

        let ctrl = ControlClient::connect_addr(device, Duration::from_secs(1)).await.unwrap();
        assert!(matches!(
            ctrl.peek32(0).await,
            Err(Error::ProtocolVersionMismatch { expected: 12, actual: 9 })
        ));
    }

    #[tokio::test]
    async fn probe_falls_back_to_umtrx() {
        let device = fake_device(|req| {
            let reply = if req.id == ControlId::UMTRX_REQUEST {
                let mut reply = answer(req, ControlId::UMTRX_RESPONSE);
                reply.set_ip_addr(Ipv4Addr::new(10, 0, 0, 7));
                reply
            } else {
                answer(req, ControlId::HUH_WHAT)
            };
            vec![reply.encode().to_vec()]
        })
        .await;

        let ctrl = ControlClient::connect_addr(device, Duration::from_secs(1)).await.unwrap();
        assert_eq!(ctrl.probe_address().await.unwrap(), Ipv4Addr::new(10, 0, 0, 7));
    }

    #[tokio::test]
    async fn probe_fails_when_no_variant_recognized() {
        let device = fake_device(|req| vec![answer(req, ControlId::HUH_WHAT).encode().to_vec()]).await;
        let ctrl = ControlClient::connect_addr(device, Duration::from_secs(1)).await.unwrap();
        assert!(matches!(ctrl.probe_address().await, Err(Error::Protocol(_))));
    }

    #[tokio::test]
    async fn silent_device_times_out() {
        let device = fake_device(|_| Vec::new()).await;
        let ctrl = ControlClient::connect_addr(device, Duration::from_millis(50)).await.unwrap();
        assert!(matches!(ctrl.peek32(0).await, Err(Error::Timeout)));
    }

    #[tokio::test]
    async fn unexpected_reply_is_protocol_error() {
        let device = fake_device(|req| vec![answer(req, ControlId::HUH_WHAT).encode().to_vec()]).await;
        let ctrl = ControlClient::connect_addr(device, Duration::from_secs(1)).await.unwrap();
        assert!(matches!(ctrl.echo(64).await, Err(Error::Protocol(_))));
    }

    #[tokio::test]
    async fn oversized_requests_rejected_locally() {
        let device = fake_device(|_| Vec::new()).await;
        let ctrl = ControlClient::connect_addr(device, Duration::from_millis(50)).await.unwrap();
        assert!(matches!(ctrl.read_i2c(0x50, 21).await, Err(Error::InvalidParameter(_))));
        assert!(matches!(ctrl.write_i2c(0x50, &[0; 21]).await, Err(Error::InvalidParameter(_))));
        assert!(matches!(ctrl.echo(MAX_ECHO_LEN + 1).await, Err(Error::InvalidParameter(_))));
        assert!(matches!(ctrl.echo(8).await, Err(Error::InvalidParameter(_))));
    }
}
