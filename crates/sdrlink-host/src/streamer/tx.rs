//! Transmit streamer.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;

use sdrlink_core::error::{Error, Result};
use sdrlink_core::transport::DataTransport;
use sdrlink_core::{CpuFormat, TimeSpec};
use sdrlink_wire::ports::TX_SID_BASE;
use sdrlink_wire::vrt::{IfPacketInfo, PacketType, header_words32, pack_le};

use crate::convert::{Sample, host_to_sc16};

use super::{StreamerRates, TxMetadata};

struct TxChannel {
    stream_id: u32,
    packet_count: u8,
}

/// Transmit streamer for one or more DSP channels. The wire format is
/// always sc16.
pub struct TxStreamer {
    transport: Arc<dyn DataTransport>,
    channels: Vec<TxChannel>,
    cpu: CpuFormat,
    spp: usize,
    rates: Arc<StreamerRates>,
}

impl TxStreamer {
    pub(crate) fn new(
        transport: Arc<dyn DataTransport>,
        cpu: CpuFormat,
        spp: usize,
        rates: Arc<StreamerRates>,
    ) -> Self {
        TxStreamer {
            transport,
            channels: Vec::new(),
            cpu,
            spp: spp.max(1),
            rates,
        }
    }

    /// Attach a channel feeding transmit DSP `dsp`.
    pub(crate) fn add_channel(&mut self, dsp: usize) {
        self.channels.push(TxChannel {
            stream_id: TX_SID_BASE + dsp as u32,
            packet_count: 0,
        });
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Samples per full packet.
    pub fn max_num_samps(&self) -> usize {
        self.spp
    }

    pub fn cpu_format(&self) -> CpuFormat {
        self.cpu
    }

    /// Rates shared with the device.
    pub fn rates(&self) -> &Arc<StreamerRates> {
        &self.rates
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

    /// Send the same number of samples on every channel.
    ///
    /// The samples are split into packets of at most
    /// [`max_num_samps`](Self::max_num_samps). The time spec goes on the
    /// first packet only, start of burst on the first, end of burst on the
    /// last. Returns the number of samples sent per channel, which is less
    /// than requested only when `timeout` expires.
    pub async fn send<T: Sample>(
        &mut self,
        buffs: &[&[T]],
        metadata: &TxMetadata,
        timeout: Duration,
    ) -> Result<usize> {
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

        if metadata.has_time_spec && u32::try_from(metadata.time_spec.full_secs).is_err() {
            return Err(Error::InvalidParameter(format!(
                "transmit time {} s does not fit the packet timestamp",
                metadata.time_spec.full_secs
            )));
        }

        let deadline = Instant::now() + timeout;
        let nsamps = buffs.iter().map(|b| b.len()).min().unwrap_or(0);

        // A burst flag with no samples still needs a packet to carry it.
        if nsamps == 0 {
            if metadata.start_of_burst || metadata.end_of_burst {
                self.send_packets(buffs, 0, 0, metadata, true, true, deadline)
                    .await?;
            }
            return Ok(0);
        }

        let mut sent = 0;
        while sent < nsamps {
            let len = self.spp.min(nsamps - sent);
            let first = sent == 0;
            let last = sent + len == nsamps;
            if !self
                .send_packets(buffs, sent, len, metadata, first, last, deadline)
                .await?
            {
                tracing::debug!(sent, requested = nsamps, "Tx send timed out");
                break;
            }
            sent += len;
        }
        Ok(sent)
    }

    /// Send one packet per channel. Returns false on timeout, in which
    /// case nothing was sent.
    ///
    /// Only the first channel's send is bounded by `deadline`. Once it has
    /// gone out the rest of the group is sent regardless, so every channel
    /// carries the same samples and packet counts.
    #[allow(clippy::too_many_arguments)]
    async fn send_packets<T: Sample>(
        &mut self,
        buffs: &[&[T]],
        offset: usize,
        len: usize,
        metadata: &TxMetadata,
        first: bool,
        last: bool,
        deadline: Instant,
    ) -> Result<bool> {
        let tick_rate = self.rates.tick_rate();
        let scale = self.rates.scale_factor();
        let timed = first && metadata.has_time_spec;
        let time = if timed {
            metadata.time_spec
        } else {
            TimeSpec::default()
        };

        for (index, (channel, buff)) in self.channels.iter_mut().zip(buffs).enumerate() {
            let mut info = IfPacketInfo {
                packet_type: PacketType::Data,
                stream_id: channel.stream_id,
                packet_count: channel.packet_count,
                has_tsi: timed,
                tsi: u32::try_from(time.full_secs).unwrap_or_default(),
                has_tsf: timed,
                tsf: time.tick_count(tick_rate),
                sob: first && metadata.start_of_burst,
                eob: last && metadata.end_of_burst,
                num_payload_words32: len,
                ..Default::default()
            };

            let mut frame = vec![0u8; header_words32(&info) * 4];
            host_to_sc16(&buff[offset..offset + len], &mut frame, scale);
            pack_le(&mut info, &mut frame)?;

            let send = self.transport.send_frame(Bytes::from(frame));
            if index == 0 {
                match tokio::time::timeout_at(deadline, send).await {
                    Ok(result) => result?,
                    Err(_) => return Ok(false),
                }
            } else {
                send.await?;
            }
            channel.packet_count = (channel.packet_count + 1) & 0x0F;
        }
        Ok(true)
    }
}
