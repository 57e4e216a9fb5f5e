//! Per-channel sample streamers.
//!
//! An [`RxStreamer`] pulls framed packets from the demultiplexer and turns
//! them into host samples; a [`TxStreamer`] does the reverse onto the data
//! transport. Both keep their rates in a shared [`StreamerRates`] so the
//! device can retune them while the application holds the streamer.

use std::sync::Arc;

use sdrlink_core::TimeSpec;

use crate::atomic::AtomicF64;

pub mod rx;
pub mod tx;

pub use rx::RxStreamer;
pub use tx::TxStreamer;

/// Rate state shared between a streamer and the device's rate registry.
#[derive(Debug)]
pub struct StreamerRates {
    tick_rate: AtomicF64,
    samp_rate: AtomicF64,
    scale_factor: AtomicF64,
}

impl StreamerRates {
    pub fn new() -> Arc<Self> {
        Arc::new(StreamerRates {
            tick_rate: AtomicF64::new(0.0),
            samp_rate: AtomicF64::new(0.0),
            scale_factor: AtomicF64::new(1.0),
        })
    }

    pub fn set_tick_rate(&self, rate: f64) {
        self.tick_rate.store(rate);
    }

    pub fn set_samp_rate(&self, rate: f64) {
        self.samp_rate.store(rate);
    }

    pub fn set_scale_factor(&self, scale: f64) {
        self.scale_factor.store(scale);
    }

    pub fn tick_rate(&self) -> f64 {
        self.tick_rate.load()
    }

    pub fn samp_rate(&self) -> f64 {
        self.samp_rate.load()
    }

    pub fn scale_factor(&self) -> f64 {
        self.scale_factor.load()
    }
}

/// Outcome of a receive call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RxErrorCode {
    #[default]
    None,
    /// No packet arrived within the timeout.
    Timeout,
    /// The device overflowed and discarded samples.
    Overflow,
    /// Channels delivered packets with different timestamps.
    Alignment,
    /// A packet on a data path could not be decoded.
    BadPacket,
}

/// Metadata returned with each receive call.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RxMetadata {
    pub has_time_spec: bool,
    /// Device time of the first sample returned.
    pub time_spec: TimeSpec,
    /// Samples of the current packet remain for the next call.
    pub more_fragments: bool,
    /// Offset, in samples, of the first sample returned within its packet.
    pub fragment_offset: usize,
    pub start_of_burst: bool,
    pub end_of_burst: bool,
    /// One or more packets were lost before this one.
    pub out_of_sequence: bool,
    pub error_code: RxErrorCode,
}

impl RxMetadata {
    pub(crate) fn error(code: RxErrorCode) -> Self {
        RxMetadata {
            error_code: code,
            ..Default::default()
        }
    }
}

/// Metadata supplied with each transmit call.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TxMetadata {
    /// Send the first sample at `time_spec` instead of immediately.
    pub has_time_spec: bool,
    pub time_spec: TimeSpec,
    pub start_of_burst: bool,
    pub end_of_burst: bool,
}
