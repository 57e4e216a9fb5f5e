//! sdrlink-host: host-side streaming engine.
//!
//! Turns the datagrams arriving from a device into per-channel sample
//! streams and a queue of async status events, and turns host samples into
//! framed transmit packets.
//!
//! # Components
//!
//! - [`demux::RecvDemuxer`] -- routes inbound packets to per-DSP queues by
//!   stream id; never blocks on a slow reader
//! - [`streamer::RxStreamer`] / [`streamer::TxStreamer`] -- packet to
//!   sample conversion with fragmentation
//! - [`async_queue::AsyncEventQueue`] -- bounded, drop-oldest event queue
//! - [`dsp::RxDsp`] / [`dsp::TxDsp`] -- register-level DSP proxies
//! - [`control::ControlClient`] -- UDP control-port client
//! - [`device::Device`] / [`builder::DeviceBuilder`] -- ties it together

pub mod async_queue;
pub mod atomic;
pub mod builder;
pub mod control;
pub mod convert;
pub mod demux;
pub mod device;
pub mod dsp;
pub mod registry;
pub mod streamer;

pub use async_queue::{AsyncEventQueue, AsyncEventSink};
pub use builder::{DeviceBuilder, StreamArgs};
pub use control::ControlClient;
pub use convert::Sample;
pub use demux::{ContextSink, DemuxConfig, RecvDemuxer};
pub use device::Device;
pub use dsp::{StreamCmd, StreamMode};
pub use registry::StreamerRegistry;
pub use streamer::{RxErrorCode, RxMetadata, RxStreamer, TxMetadata, TxStreamer};
