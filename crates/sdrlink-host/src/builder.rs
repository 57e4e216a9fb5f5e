//! DeviceBuilder -- fluent builder for constructing [`Device`] instances,
//! and [`StreamArgs`] for configuring streamers.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use sdrlink_host::builder::DeviceBuilder;
//! use sdrlink_host::control::{ControlClient, DEFAULT_CONTROL_TIMEOUT};
//!
//! # async fn example(data: Arc<dyn sdrlink_core::DataTransport>) -> sdrlink_core::Result<()> {
//! let ctrl = ControlClient::connect("192.168.10.2".parse().unwrap(), DEFAULT_CONTROL_TIMEOUT).await?;
//! let device = DeviceBuilder::new()
//!     .registers(Arc::new(ctrl))
//!     .transport(data)
//!     .tick_rate(64e6)
//!     .build()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use sdrlink_core::error::{Error, Result};
use sdrlink_core::transport::{DataTransport, RegisterIface};
use sdrlink_core::{CpuFormat, OtwFormat};
use sdrlink_wire::ports::{MAX_PACKET_BYTES, RX_SID_BASE, TX_ASYNC_SID};
use sdrlink_wire::regs::NUM_RX_LANES;

use crate::async_queue::{AsyncEventQueue, AsyncEventSink, DEFAULT_ASYNC_QUEUE_DEPTH};
use crate::atomic::AtomicF64;
use crate::demux::{DemuxConfig, RecvDemuxer};
use crate::device::Device;
use crate::dsp::{RxDsp, TxDsp};
use crate::registry::StreamerRegistry;

/// Default number of receive DSPs.
const DEFAULT_NUM_RX_DSPS: usize = 2;

/// Default device clock rate.
const DEFAULT_TICK_RATE: f64 = 100e6;

/// Default frames buffered per receive path.
const DEFAULT_DEMUX_QUEUE_DEPTH: usize = 64;

/// Default demultiplexer poll interval.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default sc8 scalar.
pub const DEFAULT_SC8_SCALAR: u32 = 0x400;

// ---------------------------------------------------------------------------
// StreamArgs
// ---------------------------------------------------------------------------

/// Streamer configuration.
///
/// Recognized keys in `args`: `spp` (samples per packet, may only lower
/// the default), `noclear` (skip resetting the DSP), `scalar` (sc8
/// scalar), `underflow_policy` (transmit only).
#[derive(Debug, Clone)]
pub struct StreamArgs {
    pub cpu_format: CpuFormat,
    /// Wire format; sc16 when `None`.
    pub otw_format: Option<OtwFormat>,
    /// DSP indices; `[0]` when empty.
    pub channels: Vec<usize>,
    pub args: HashMap<String, String>,
}

impl StreamArgs {
    pub fn new(cpu_format: CpuFormat) -> Self {
        StreamArgs {
            cpu_format,
            otw_format: None,
            channels: Vec::new(),
            args: HashMap::new(),
        }
    }

    pub fn otw_format(mut self, otw: OtwFormat) -> Self {
        self.otw_format = Some(otw);
        self
    }

    pub fn channels(mut self, channels: &[usize]) -> Self {
        self.channels = channels.to_vec();
        self
    }

    /// Set one key, with an optional value.
    pub fn arg(mut self, key: &str, value: &str) -> Self {
        self.args.insert(key.to_string(), value.to_string());
        self
    }

    /// Add `key=value` pairs separated by commas. A key without `=` is
    /// stored with an empty value.
    pub fn parse_args(mut self, s: &str) -> Self {
        for pair in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            self.args.insert(key.trim().to_string(), value.trim().to_string());
        }
        self
    }

    pub fn has_arg(&self, key: &str) -> bool {
        self.args.contains_key(key)
    }

    pub fn get_arg(&self, key: &str) -> Option<&str> {
        self.args.get(key).map(String::as_str)
    }

    pub(crate) fn otw(&self) -> OtwFormat {
        self.otw_format.unwrap_or(OtwFormat::Sc16)
    }

    pub(crate) fn channel_list(&self) -> Vec<usize> {
        if self.channels.is_empty() {
            vec![0]
        } else {
            self.channels.clone()
        }
    }

    pub(crate) fn scalar(&self) -> Result<u32> {
        match self.get_arg("scalar") {
            None => Ok(DEFAULT_SC8_SCALAR),
            Some(s) => s
                .parse::<f64>()
                .map(|v| v as u32)
                .map_err(|_| Error::InvalidParameter(format!("bad scalar: {s}"))),
        }
    }

    /// Samples per packet: the largest that fits, or a smaller requested
    /// value.
    pub(crate) fn spp(&self, max_spp: usize) -> Result<usize> {
        let Some(s) = self.get_arg("spp") else {
            return Ok(max_spp);
        };
        let requested: usize = s
            .parse()
            .map_err(|_| Error::InvalidParameter(format!("bad spp: {s}")))?;
        if requested == 0 {
            return Err(Error::InvalidParameter("spp must be nonzero".into()));
        }
        Ok(requested.min(max_spp))
    }
}

// ---------------------------------------------------------------------------
// DeviceBuilder
// ---------------------------------------------------------------------------

/// Fluent builder for [`Device`].
pub struct DeviceBuilder {
    transport: Option<Arc<dyn DataTransport>>,
    registers: Option<Arc<dyn RegisterIface>>,
    num_rx_dsps: usize,
    tick_rate: f64,
    async_queue_depth: usize,
    demux_queue_depth: usize,
    poll_interval: Duration,
    max_packet_bytes: usize,
}

impl DeviceBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        DeviceBuilder {
            transport: None,
            registers: None,
            num_rx_dsps: DEFAULT_NUM_RX_DSPS,
            tick_rate: DEFAULT_TICK_RATE,
            async_queue_depth: DEFAULT_ASYNC_QUEUE_DEPTH,
            demux_queue_depth: DEFAULT_DEMUX_QUEUE_DEPTH,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_packet_bytes: MAX_PACKET_BYTES,
        }
    }

    /// Set the data transport carrying sample and status packets.
    pub fn transport(mut self, transport: Arc<dyn DataTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Set the register path used by the DSP proxies.
    pub fn registers(mut self, registers: Arc<dyn RegisterIface>) -> Self {
        self.registers = Some(registers);
        self
    }

    /// Set the number of receive DSPs (default: 2, at most 4).
    pub fn num_rx_dsps(mut self, n: usize) -> Self {
        self.num_rx_dsps = n;
        self
    }

    /// Set the device clock rate (default: 100 MHz).
    pub fn tick_rate(mut self, rate: f64) -> Self {
        self.tick_rate = rate;
        self
    }

    /// Set the async event queue capacity (default: 100).
    pub fn async_queue_depth(mut self, depth: usize) -> Self {
        self.async_queue_depth = depth;
        self
    }

    /// Set the frames buffered per receive path (default: 64).
    pub fn demux_queue_depth(mut self, depth: usize) -> Self {
        self.demux_queue_depth = depth;
        self
    }

    /// Set how often the demultiplexer re-checks for shutdown while idle
    /// (default: 100ms).
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the largest packet in bytes (default: 2048). The transport's own
    /// limit applies if smaller.
    pub fn max_packet_bytes(mut self, bytes: usize) -> Self {
        self.max_packet_bytes = bytes;
        self
    }

    /// Program the DSP stream ids and start the demultiplexer.
    pub async fn build(self) -> Result<Device> {
        let transport = self.transport.ok_or_else(|| {
            Error::InvalidParameter("transport is required: call .transport() before .build()".into())
        })?;
        let registers = self.registers.ok_or_else(|| {
            Error::InvalidParameter("registers are required: call .registers() before .build()".into())
        })?;
        if self.num_rx_dsps == 0 || self.num_rx_dsps > NUM_RX_LANES {
            return Err(Error::InvalidParameter(format!(
                "{} receive DSPs requested, device has 1..={}",
                self.num_rx_dsps, NUM_RX_LANES
            )));
        }
        let max_packet_bytes = self.max_packet_bytes.min(transport.max_frame_size());

        let tick_rate = Arc::new(AtomicF64::new(self.tick_rate));

        let mut rx_dsps = Vec::with_capacity(self.num_rx_dsps);
        for lane in 0..self.num_rx_dsps {
            let dsp = RxDsp::new(registers.clone(), lane, tick_rate.clone())?;
            dsp.set_stream_id(RX_SID_BASE + lane as u32).await?;
            rx_dsps.push(Arc::new(dsp));
        }
        let tx_dsp = TxDsp::new(registers.clone(), tick_rate.clone());
        tx_dsp.set_report_sid(TX_ASYNC_SID).await?;

        let async_queue = Arc::new(AsyncEventQueue::new(self.async_queue_depth));
        let async_sink = Arc::new(AsyncEventSink::new(
            async_queue.clone(),
            tick_rate.clone(),
            TX_ASYNC_SID,
        ));

        let demuxer = Arc::new(RecvDemuxer::spawn(
            transport.clone(),
            DemuxConfig {
                num_paths: self.num_rx_dsps,
                sid_base: RX_SID_BASE,
                queue_depth: self.demux_queue_depth,
                poll_interval: self.poll_interval,
            },
            async_sink.clone(),
        ));

        tracing::info!(
            rx_dsps = self.num_rx_dsps,
            tick_rate = self.tick_rate,
            max_packet_bytes,
            "Device ready"
        );

        Ok(Device::new(
            transport,
            demuxer,
            async_queue,
            async_sink,
            rx_dsps,
            tx_dsp,
            StreamerRegistry::new(self.num_rx_dsps, 1),
            tick_rate,
            max_packet_bytes,
        ))
    }
}

impl Default for DeviceBuilder {
    fn default() -> Self {
        Self::new()
    }
}
