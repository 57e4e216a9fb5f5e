//! Receive streamer.
//!
//! Each channel reads its own demultiplexer path. A packet larger than the
//! caller's buffer is returned over several calls; the unread tail is kept
//! as the channel's current fragment. With more than one channel, every
//! call returns the same number of samples for each channel.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;

use sdrlink_core::error::{Error, Result};
use sdrlink_core::{CpuFormat, OtwFormat, TimeSpec};
use sdrlink_wire::vrt::{IfPacketInfo, PacketType, packets_lost, unpack_le};

use crate::async_queue::FASTPATH_TARGET;
use crate::convert::{Sample, items_in, wire_to_host};
use crate::demux::RecvDemuxer;
use crate::dsp::OverflowHandler;

use super::{RxErrorCode, RxMetadata, StreamerRates};

/// A received packet, possibly partly consumed.
struct Fragment {
    frame: Bytes,
    info: IfPacketInfo,
    consumed: usize,
}

impl Fragment {
    fn payload(&self) -> &[u8] {
        let start = self.info.payload_offset();
        &self.frame[start..start + self.info.payload_len()]
    }

    fn remaining(&self, otw: OtwFormat) -> usize {
        items_in(otw, self.info.payload_len()).saturating_sub(self.consumed)
    }

    fn same_time(&self, other: &Fragment) -> bool {
        self.info.has_time() == other.info.has_time()
            && self.info.tsi == other.info.tsi
            && self.info.tsf == other.info.tsf
    }
}

struct RxChannel {
    path: usize,
    overflow: Option<Arc<dyn OverflowHandler>>,
    current: Option<Fragment>,
    last_count: Option<u8>,
}

/// Receive streamer for one or more DSP channels.
pub struct RxStreamer {
    demuxer: Arc<RecvDemuxer>,
    channels: Vec<RxChannel>,
    otw: OtwFormat,
    cpu: CpuFormat,
    spp: usize,
    rates: Arc<StreamerRates>,
    sequence_errors: u64,
}

impl RxStreamer {
    pub(crate) fn new(
        demuxer: Arc<RecvDemuxer>,
        otw: OtwFormat,
        cpu: CpuFormat,
        spp: usize,
        rates: Arc<StreamerRates>,
    ) -> Self {
        RxStreamer {
            demuxer,
            channels: Vec::new(),
            otw,
            cpu,
            spp,
            rates,
            sequence_errors: 0,
        }
    }

    /// Attach a channel reading demultiplexer `path`.
    pub(crate) fn add_channel(&mut self, path: usize, overflow: Option<Arc<dyn OverflowHandler>>) {
        self.channels.push(RxChannel {
            path,
            overflow,
            current: None,
            last_count: None,
        });
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Samples per full packet.
    pub fn max_num_samps(&self) -> usize {
        self.spp
    }

    pub fn otw_format(&self) -> OtwFormat {
        self.otw
    }

    pub fn cpu_format(&self) -> CpuFormat {
        self.cpu
    }

    /// Rates shared with the device.
    pub fn rates(&self) -> &Arc<StreamerRates> {
        &self.rates
    }

    /// Packets lost so far, counted from packet-count gaps.
    pub fn sequence_errors(&self) -> u64 {
        self.sequence_errors
    }

    pub fn set_tick_rate(&self, rate: f64) {
        self.rates.set_tick_rate(rate);
    }

    pub fn set_samp_rate(&self, rate: f64) {
        self.rates.set_samp_rate(rate);
    }

    pub fn set_scale_factor(&self, scale: f64) {
        self.rates.set_scale_factor(scale);
    }

    /// Receive up to `buffs[ch].len()` samples on every channel.
    ///
    /// Streaming faults are reported in the metadata error code with a
    /// count of zero. `Err` is returned only for a buffer list that does
    /// not match the streamer.
    pub async fn recv<T: Sample>(
        &mut self,
        buffs: &mut [&mut [T]],
        timeout: Duration,
    ) -> Result<(usize, RxMetadata)> {
        if buffs.len() != self.channels.len() {
            return Err(Error::InvalidParameter(format!(
                "{} buffers for {} channels",
                buffs.len(),
                self.channels.len()
            )));
        }
        if T::FORMAT != self.cpu {
            return Err(Error::InvalidParameter(format!(
                "{} buffers for a {} stream",
                T::FORMAT,
                self.cpu
            )));
        }

        let deadline = Instant::now() + timeout;
        let mut out_of_sequence = false;

        for ch in 0..self.channels.len() {
            if self.channels[ch].current.is_some() {
                continue;
            }
            match self.next_packet(ch, deadline).await {
                Ok((fragment, lost)) => {
                    out_of_sequence |= lost;
                    self.channels[ch].current = Some(fragment);
                }
                Err(md) => return Ok((0, md)),
            }
        }

        if !self.aligned() {
            tracing::debug!("Rx channels misaligned, discarding current packets");
            for channel in &mut self.channels {
                channel.current = None;
            }
            return Ok((0, RxMetadata::error(RxErrorCode::Alignment)));
        }

        let otw = self.otw;
        let scale = self.rates.scale_factor();
        let mut md = self.fragment_metadata();
        md.out_of_sequence = out_of_sequence;

        let nsamps = self
            .channels
            .iter()
            .zip(buffs.iter())
            .map(|(c, b)| c.current.as_ref().map_or(0, |f| f.remaining(otw)).min(b.len()))
            .min()
            .unwrap_or(0);

        for (channel, buff) in self.channels.iter_mut().zip(buffs.iter_mut()) {
            let Some(fragment) = channel.current.as_mut() else {
                continue;
            };
            wire_to_host(otw, fragment.payload(), fragment.consumed, &mut buff[..nsamps], scale);
            fragment.consumed += nsamps;
            if fragment.remaining(otw) == 0 {
                channel.current = None;
            }
        }

        md.more_fragments = self.channels.iter().any(|c| c.current.is_some());
        md.end_of_burst &= !md.more_fragments;
        Ok((nsamps, md))
    }

    /// Metadata describing the first channel's current fragment.
    fn fragment_metadata(&self) -> RxMetadata {
        let Some(fragment) = self.channels.first().and_then(|c| c.current.as_ref()) else {
            return RxMetadata::default();
        };
        RxMetadata {
            has_time_spec: fragment.info.has_time(),
            time_spec: self.fragment_time(fragment),
            fragment_offset: fragment.consumed,
            start_of_burst: fragment.info.sob && fragment.consumed == 0,
            end_of_burst: fragment.info.eob,
            ..Default::default()
        }
    }

    fn fragment_time(&self, fragment: &Fragment) -> TimeSpec {
        if !fragment.info.has_time() {
            return TimeSpec::default();
        }
        let base = TimeSpec::from_ticks(
            i64::from(fragment.info.tsi),
            fragment.info.tsf,
            self.rates.tick_rate(),
        );
        let samp_rate = self.rates.samp_rate();
        if fragment.consumed == 0 || samp_rate <= 0.0 {
            return base;
        }
        TimeSpec::new(base.full_secs, base.frac_secs + fragment.consumed as f64 / samp_rate)
    }

    /// Fresh packets on every channel carry the same time.
    fn aligned(&self) -> bool {
        let mut fresh = self
            .channels
            .iter()
            .filter_map(|c| c.current.as_ref())
            .filter(|f| f.consumed == 0);
        let Some(first) = fresh.next() else {
            return true;
        };
        fresh.all(|f| f.same_time(first))
    }

    /// Wait for the next data packet on channel `ch`.
    ///
    /// Returns the packet and whether packets were lost before it, or the
    /// metadata to hand back to the caller.
    async fn next_packet(
        &mut self,
        ch: usize,
        deadline: Instant,
    ) -> std::result::Result<(Fragment, bool), RxMetadata> {
        let channel = &mut self.channels[ch];
        let remaining = deadline.saturating_duration_since(Instant::now());
        let Some(frame) = self.demuxer.get_buffer(channel.path, remaining).await else {
            return Err(RxMetadata::error(RxErrorCode::Timeout));
        };

        let info = match unpack_le(&frame) {
            Ok(info) => info,
            Err(e) => {
                tracing::debug!(path = channel.path, error = %e, "Bad packet on data path");
                return Err(RxMetadata::error(RxErrorCode::BadPacket));
            }
        };

        if info.packet_type == PacketType::Context {
            tracing::info!(target: FASTPATH_TARGET, "O");
            if let Some(handler) = &channel.overflow {
                handler.handle_overflow().await;
            }
            let fragment = Fragment {
                frame,
                info,
                consumed: 0,
            };
            let mut md = RxMetadata::error(RxErrorCode::Overflow);
            md.has_time_spec = info.has_time();
            md.time_spec = self.fragment_time(&fragment);
            return Err(md);
        }

        let mut lost = false;
        if let Some(previous) = channel.last_count {
            let missing = packets_lost(previous, info.packet_count);
            if missing > 0 {
                lost = true;
                self.sequence_errors += u64::from(missing);
                tracing::debug!(path = channel.path, missing, "Rx packets lost");
            }
        }
        channel.last_count = Some(info.packet_count);

        Ok((
            Fragment {
                frame,
                info,
                consumed: 0,
            },
            lost,
        ))
    }
}
