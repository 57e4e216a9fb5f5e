//! The host-side device: streamers, DSP proxies, rates, async events.
//!
//! A [`Device`] owns the receive demultiplexer and the async event queue
//! for one device. Streamers it creates are owned by the caller; the
//! device keeps only weak handles to their rates so later rate changes
//! reach them while they live.

use std::sync::Arc;
use std::time::Duration;

use sdrlink_core::error::{Error, Result};
use sdrlink_core::transport::DataTransport;
use sdrlink_core::{AsyncEvent, OtwFormat};
use sdrlink_wire::vrt::{RX_HEADER_BYTES, TX_HEADER_BYTES};

use crate::async_queue::{AsyncEventQueue, AsyncEventSink};
use crate::atomic::AtomicF64;
use crate::builder::StreamArgs;
use crate::demux::{DemuxStats, RecvDemuxer};
use crate::dsp::{OverflowHandler, RxDsp, StreamCmd, TxDsp};
use crate::registry::StreamerRegistry;
use crate::streamer::{RxStreamer, StreamerRates, TxStreamer};

/// Largest samples per packet for a packet budget.
fn max_spp(max_packet_bytes: usize, header_bytes: usize, otw: OtwFormat) -> Result<usize> {
    let spp = max_packet_bytes.saturating_sub(header_bytes) / otw.bytes_per_item();
    if spp == 0 {
        return Err(Error::InvalidParameter(format!(
            "{max_packet_bytes}-byte packets cannot carry samples"
        )));
    }
    Ok(spp)
}

/// A connected device.
pub struct Device {
    transport: Arc<dyn DataTransport>,
    demuxer: Arc<RecvDemuxer>,
    async_queue: Arc<AsyncEventQueue>,
    async_sink: Arc<AsyncEventSink>,
    rx_dsps: Vec<Arc<RxDsp>>,
    tx_dsp: TxDsp,
    registry: StreamerRegistry,
    tick_rate: Arc<AtomicF64>,
    rx_rates: Vec<AtomicF64>,
    tx_rate: AtomicF64,
    max_packet_bytes: usize,
}

impl Device {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        transport: Arc<dyn DataTransport>,
        demuxer: Arc<RecvDemuxer>,
        async_queue: Arc<AsyncEventQueue>,
        async_sink: Arc<AsyncEventSink>,
        rx_dsps: Vec<Arc<RxDsp>>,
        tx_dsp: TxDsp,
        registry: StreamerRegistry,
        tick_rate: Arc<AtomicF64>,
        max_packet_bytes: usize,
    ) -> Self {
        let rx_rates = rx_dsps.iter().map(|_| AtomicF64::new(0.0)).collect();
        Device {
            transport,
            demuxer,
            async_queue,
            async_sink,
            rx_dsps,
            tx_dsp,
            registry,
            tick_rate,
            rx_rates,
            tx_rate: AtomicF64::new(0.0),
            max_packet_bytes,
        }
    }

    /// Number of receive DSPs the device was built with.
    pub fn num_rx_dsps(&self) -> usize {
        self.rx_dsps.len()
    }

    fn rx_dsp(&self, dsp: usize) -> Result<&Arc<RxDsp>> {
        self.rx_dsps.get(dsp).ok_or_else(|| {
            Error::InvalidParameter(format!(
                "no receive DSP {dsp}, device has {}",
                self.rx_dsps.len()
            ))
        })
    }

    /// Create a receive streamer.
    ///
    /// For each channel's DSP: set the packet size, clear it unless
    /// `noclear` is given, select the wire format, and drop anything
    /// already queued on its path.
    pub async fn get_rx_stream(&self, args: &StreamArgs) -> Result<RxStreamer> {
        let otw = args.otw();
        let channels = args.channel_list();
        for &dsp in &channels {
            self.rx_dsp(dsp)?;
        }
        let scalar = args.scalar()?;
        let max_spp = max_spp(self.max_packet_bytes, RX_HEADER_BYTES, otw)?;
        let spp = args.spp(max_spp)?;

        let rates = StreamerRates::new();
        let mut streamer = RxStreamer::new(
            self.demuxer.clone(),
            otw,
            args.cpu_format,
            spp,
            rates.clone(),
        );

        for &dsp in &channels {
            let rx_dsp = self.rx_dsp(dsp)?;
            rx_dsp.set_nsamps_per_packet(spp).await?;
            if !args.has_arg("noclear") {
                rx_dsp.clear().await?;
            }
            rx_dsp.set_format(otw, scalar).await?;
            self.demuxer.flush(dsp).await;

            let overflow: Arc<dyn OverflowHandler> = rx_dsp.clone();
            streamer.add_channel(dsp, Some(overflow));
            self.registry.register_rx(dsp, &rates);
        }

        tracing::debug!(
            channels = ?channels,
            otw = %otw,
            cpu = %args.cpu_format,
            spp,
            "Rx stream created"
        );

        self.update_rates();
        Ok(streamer)
    }

    /// Create a transmit streamer. Only the sc16 wire format and DSP 0 are
    /// available.
    pub async fn get_tx_stream(&self, args: &StreamArgs) -> Result<TxStreamer> {
        let otw = args.otw();
        if otw != OtwFormat::Sc16 {
            return Err(Error::UnsupportedWireFormat(format!(
                "transmit cannot handle requested wire format: {otw}"
            )));
        }
        let channels = args.channel_list();
        if let Some(&dsp) = channels.iter().find(|&&dsp| dsp != 0) {
            return Err(Error::InvalidParameter(format!("no transmit DSP {dsp}")));
        }
        let max_spp = max_spp(self.max_packet_bytes, TX_HEADER_BYTES, otw)?;
        let spp = args.spp(max_spp)?;

        let rates = StreamerRates::new();
        let mut streamer = TxStreamer::new(self.transport.clone(), args.cpu_format, spp, rates.clone());

        for &dsp in &channels {
            if !args.has_arg("noclear") {
                self.tx_dsp.clear().await?;
            }
            if let Some(policy) = args.get_arg("underflow_policy") {
                self.tx_dsp.set_underflow_policy(policy).await?;
            }
            streamer.add_channel(dsp);
            self.registry.register_tx(dsp, &rates);
        }

        tracing::debug!(cpu = %args.cpu_format, spp, "Tx stream created");

        self.update_rates();
        Ok(streamer)
    }

    /// Push the current tick and sample rates to every live streamer.
    fn update_rates(&self) {
        self.registry.update_tick_rate(self.tick_rate.load());
        for (dsp, rx_dsp) in self.rx_dsps.iter().enumerate() {
            self.registry.update_rx_samp_rate(
                dsp,
                self.rx_rates[dsp].load(),
                rx_dsp.scaling_adjustment(),
            );
        }
        self.registry.update_tx_samp_rate(0, self.tx_rate.load());
    }

    /// Wait up to `timeout` for the next async event.
    pub async fn recv_async_msg(&self, timeout: Duration) -> Option<AsyncEvent> {
        self.async_queue.pop(timeout).await
    }

    /// The device clock rate.
    pub fn tick_rate(&self) -> f64 {
        self.tick_rate.load()
    }

    /// Change the device clock rate used for timestamps.
    pub fn set_tick_rate(&self, rate: f64) {
        tracing::debug!(rate, "Tick rate");
        self.tick_rate.store(rate);
        self.registry.update_tick_rate(rate);
    }

    /// Current host sample rate of receive DSP `dsp`.
    pub fn rx_rate(&self, dsp: usize) -> Option<f64> {
        self.rx_rates.get(dsp).map(AtomicF64::load)
    }

    /// Set the host sample rate of receive DSP `dsp`. Returns the rate
    /// achieved.
    pub async fn set_rx_rate(&self, dsp: usize, rate: f64) -> Result<f64> {
        let rx_dsp = self.rx_dsp(dsp)?;
        let actual = rx_dsp.set_host_rate(rate).await?;
        self.rx_rates[dsp].store(actual);
        self.registry
            .update_rx_samp_rate(dsp, actual, rx_dsp.scaling_adjustment());
        Ok(actual)
    }

    /// Last transmit sample rate set, in samples per second.
    pub fn tx_rate(&self) -> f64 {
        self.tx_rate.load()
    }

    /// Set the host sample rate of the transmit DSP. Returns the rate
    /// achieved.
    pub async fn set_tx_rate(&self, dsp: usize, rate: f64) -> Result<f64> {
        if dsp != 0 {
            return Err(Error::InvalidParameter(format!("no transmit DSP {dsp}")));
        }
        let actual = self.tx_dsp.set_host_rate(rate).await?;
        self.tx_rate.store(actual);
        self.registry.update_tx_samp_rate(dsp, actual);
        Ok(actual)
    }

    /// Send a stream command to receive DSP `dsp`.
    pub async fn issue_stream_cmd(&self, dsp: usize, cmd: &StreamCmd) -> Result<()> {
        self.rx_dsp(dsp)?.issue_stream_cmd(cmd).await
    }

    /// Demultiplexer counters.
    pub fn demux_stats(&self) -> &DemuxStats {
        self.demuxer.stats()
    }

    /// Status packets rejected as unknown.
    pub fn unknown_async_packets(&self) -> u64 {
        self.async_sink.unknown_packets()
    }

    /// Async events discarded because the queue was full.
    pub fn async_events_overwritten(&self) -> u64 {
        self.async_queue.overwritten()
    }

    /// Stop the demultiplexer. Streamers already handed out stop receiving.
    pub async fn shutdown(&self) {
        tracing::debug!("Device shutting down");
        self.demuxer.shutdown().await;
    }
}
