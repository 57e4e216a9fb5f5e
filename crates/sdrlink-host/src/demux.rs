//! Receive-side stream demultiplexer.
//!
//! One dispatch task owns the read side of the data transport. For every
//! frame it decodes the header and hands the frame to the path for its
//! stream id. Each path is a bounded queue with a single reader (its
//! streamer).
//!
//! The dispatch task never waits on a reader: when a path's queue is full
//! the frame is dropped and counted, so one stalled channel cannot hold up
//! the others. Frames for stream ids outside the configured range are
//! discarded, except status packets, which go to the [`ContextSink`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use sdrlink_core::error::Error;
use sdrlink_core::transport::DataTransport;
use sdrlink_wire::vrt::{IfPacketInfo, PacketType, unpack_le};

/// Receiver for status packets that do not belong to a data path.
pub trait ContextSink: Send + Sync {
    /// Handle one non-data packet.
    fn handle_context(&self, frame: &[u8], info: &IfPacketInfo);
}

/// Demultiplexer configuration.
#[derive(Debug, Clone)]
pub struct DemuxConfig {
    /// Number of data paths.
    pub num_paths: usize,
    /// Stream id of path 0; path `n` has stream id `sid_base + n`.
    pub sid_base: u32,
    /// Frames each path buffers before dropping.
    pub queue_depth: usize,
    /// How long one transport read waits before re-checking cancellation.
    pub poll_interval: Duration,
}

impl Default for DemuxConfig {
    fn default() -> Self {
        DemuxConfig {
            num_paths: 1,
            sid_base: sdrlink_wire::ports::RX_SID_BASE,
            queue_depth: 64,
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Demultiplexer counters.
#[derive(Debug, Default)]
pub struct DemuxStats {
    delivered: Vec<AtomicU64>,
    dropped: Vec<AtomicU64>,
    unroutable: AtomicU64,
    malformed: AtomicU64,
    context: AtomicU64,
    transport_errors: AtomicU64,
}

impl DemuxStats {
    fn new(num_paths: usize) -> Self {
        DemuxStats {
            delivered: (0..num_paths).map(|_| AtomicU64::new(0)).collect(),
            dropped: (0..num_paths).map(|_| AtomicU64::new(0)).collect(),
            ..Default::default()
        }
    }

    /// Frames queued on path `index`.
    pub fn delivered(&self, index: usize) -> u64 {
        self.delivered
            .get(index)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Frames dropped on path `index` because its queue was full.
    pub fn dropped(&self, index: usize) -> u64 {
        self.dropped
            .get(index)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Data frames for stream ids no path is configured for.
    pub fn unroutable(&self) -> u64 {
        self.unroutable.load(Ordering::Relaxed)
    }

    /// Frames whose header could not be decoded.
    pub fn malformed(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }

    /// Non-data frames handed to the context sink.
    pub fn context(&self) -> u64 {
        self.context.load(Ordering::Relaxed)
    }

    /// Failed transport reads, other than timeouts.
    pub fn transport_errors(&self) -> u64 {
        self.transport_errors.load(Ordering::Relaxed)
    }
}

/// The receive demultiplexer.
pub struct RecvDemuxer {
    paths: Vec<Mutex<mpsc::Receiver<Bytes>>>,
    sid_base: u32,
    stats: Arc<DemuxStats>,
    cancel: CancellationToken,
    task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl RecvDemuxer {
    /// Start the dispatch task on `transport`.
    pub fn spawn(
        transport: Arc<dyn DataTransport>,
        config: DemuxConfig,
        sink: Arc<dyn ContextSink>,
    ) -> Self {
        let depth = config.queue_depth.max(1);
        let mut senders = Vec::with_capacity(config.num_paths);
        let mut paths = Vec::with_capacity(config.num_paths);
        for _ in 0..config.num_paths {
            let (tx, rx) = mpsc::channel(depth);
            senders.push(tx);
            paths.push(Mutex::new(rx));
        }

        let stats = Arc::new(DemuxStats::new(config.num_paths));
        let cancel = CancellationToken::new();

        tracing::debug!(
            num_paths = config.num_paths,
            sid_base = config.sid_base,
            queue_depth = depth,
            "Starting receive demultiplexer"
        );

        let task = tokio::spawn(dispatch_loop(
            transport,
            senders,
            config.sid_base,
            config.poll_interval,
            sink,
            stats.clone(),
            cancel.clone(),
        ));

        RecvDemuxer {
            paths,
            sid_base: config.sid_base,
            stats,
            cancel,
            task: std::sync::Mutex::new(Some(task)),
        }
    }

    /// Number of data paths.
    pub fn num_paths(&self) -> usize {
        self.paths.len()
    }

    /// Stream id routed to path `index`.
    pub fn stream_id(&self, index: usize) -> u32 {
        self.sid_base + index as u32
    }

    /// Counters.
    pub fn stats(&self) -> &DemuxStats {
        &self.stats
    }

    /// Next frame for path `index`, waiting up to `timeout`.
    ///
    /// Returns `None` on timeout, for an unknown path, or once the
    /// dispatch task has stopped and the path is drained.
    pub async fn get_buffer(&self, index: usize, timeout: Duration) -> Option<Bytes> {
        let path = self.paths.get(index)?;
        let mut rx = path.lock().await;
        tokio::time::timeout(timeout, rx.recv()).await.ok().flatten()
    }

    /// Discard every frame queued on path `index`. Returns the count.
    pub async fn flush(&self, index: usize) -> usize {
        let Some(path) = self.paths.get(index) else {
            return 0;
        };
        let mut rx = path.lock().await;
        let mut flushed = 0;
        while rx.try_recv().is_ok() {
            flushed += 1;
        }
        if flushed > 0 {
            tracing::debug!(path = index, flushed, "Flushed receive path");
        }
        flushed
    }

    /// True while the dispatch task is running.
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .ok()
            .and_then(|t| t.as_ref().map(|h| !h.is_finished()))
            .unwrap_or(false)
    }

    /// Stop the dispatch task and wait for it to exit.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let task = self.task.lock().ok().and_then(|mut t| t.take());
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

impl Drop for RecvDemuxer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// First pause after a failed transport read. Doubles on each further
/// failure up to [`MAX_ERROR_BACKOFF`].
const ERROR_BACKOFF: Duration = Duration::from_millis(10);
const MAX_ERROR_BACKOFF: Duration = Duration::from_millis(500);

async fn dispatch_loop(
    transport: Arc<dyn DataTransport>,
    senders: Vec<mpsc::Sender<Bytes>>,
    sid_base: u32,
    poll_interval: Duration,
    sink: Arc<dyn ContextSink>,
    stats: Arc<DemuxStats>,
    cancel: CancellationToken,
) {
    let mut backoff = ERROR_BACKOFF;
    loop {
        let result = tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                tracing::debug!("Demultiplexer cancelled");
                break;
            }

            r = transport.recv_frame(poll_interval) => r,
        };

        match result {
            Ok(frame) => {
                backoff = ERROR_BACKOFF;
                route(&frame, &senders, sid_base, sink.as_ref(), &stats);
            }
            Err(Error::Timeout) => backoff = ERROR_BACKOFF,
            Err(Error::StreamClosed | Error::NotConnected) => {
                tracing::debug!("Data transport closed, demultiplexer exiting");
                break;
            }
            Err(e) => {
                stats.transport_errors.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    error = %e,
                    backoff_ms = backoff.as_millis() as u64,
                    "Data transport receive error"
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(backoff) => {}
                }
                backoff = (backoff * 2).min(MAX_ERROR_BACKOFF);
            }
        }
    }
}

fn route(
    frame: &Bytes,
    senders: &[mpsc::Sender<Bytes>],
    sid_base: u32,
    sink: &dyn ContextSink,
    stats: &DemuxStats,
) {
    let info = match unpack_le(frame) {
        Ok(info) => info,
        Err(e) => {
            stats.malformed.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(error = %e, len = frame.len(), "Discarding malformed frame");
            return;
        }
    };

    let index = info.stream_id.wrapping_sub(sid_base) as usize;
    if let Some(tx) = senders.get(index) {
        // Context packets on a data path carry overflow notices for the
        // streamer, so they travel with the samples.
        match tx.try_send(frame.clone()) {
            Ok(()) => {
                stats.delivered[index].fetch_add(1, Ordering::Relaxed);
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                stats.dropped[index].fetch_add(1, Ordering::Relaxed);
                tracing::trace!(path = index, "Receive path full, frame dropped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                stats.dropped[index].fetch_add(1, Ordering::Relaxed);
            }
        }
        return;
    }

    if info.packet_type != PacketType::Data {
        stats.context.fetch_add(1, Ordering::Relaxed);
        sink.handle_context(frame, &info);
        return;
    }

    stats.unroutable.fetch_add(1, Ordering::Relaxed);
    tracing::trace!(error = %Error::UnroutableStream(info.stream_id), "Frame discarded");
}
