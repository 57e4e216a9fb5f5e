//! Bounded queue of device-originated async events.
//!
//! The dispatch task pushes, the application pops. `push` never blocks:
//! when the queue is full the oldest event is discarded to make room.
//! `pop` waits up to a timeout and returns `None` on expiry.
//!
//! The queue state is only touched under a short synchronous lock, and the
//! wait itself holds no lock. Dropping a `pop` future mid-wait therefore
//! leaves the queue exactly as it was.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;

use sdrlink_core::{AsyncEvent, EventCode, TimeSpec};
use sdrlink_wire::vrt::{IfPacketInfo, PacketType, context_code};

use crate::atomic::AtomicF64;
use crate::demux::ContextSink;

/// Default queue capacity.
pub const DEFAULT_ASYNC_QUEUE_DEPTH: usize = 100;

/// Target for single-character fast-path markers (`U`, `S`, `L`).
pub const FASTPATH_TARGET: &str = "sdrlink::fastpath";

/// A bounded, drop-oldest queue of [`AsyncEvent`]s.
#[derive(Debug)]
pub struct AsyncEventQueue {
    events: Mutex<VecDeque<AsyncEvent>>,
    notify: Notify,
    capacity: usize,
    overwritten: AtomicU64,
}

impl AsyncEventQueue {
    /// An empty queue holding at most `capacity` events (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        AsyncEventQueue {
            events: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
            capacity,
            overwritten: AtomicU64::new(0),
        }
    }

    /// Add an event, discarding the oldest one if the queue is full.
    pub fn push(&self, event: AsyncEvent) {
        {
            let mut events = match self.events.lock() {
                Ok(events) => events,
                Err(poisoned) => poisoned.into_inner(),
            };
            if events.len() >= self.capacity {
                events.pop_front();
                self.overwritten.fetch_add(1, Ordering::Relaxed);
            }
            events.push_back(event);
        }
        self.notify.notify_one();
    }

    /// Remove the oldest event without waiting.
    pub fn try_pop(&self) -> Option<AsyncEvent> {
        match self.events.lock() {
            Ok(mut events) => events.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        }
    }

    /// Remove the oldest event, waiting up to `timeout` for one to arrive.
    pub async fn pop(&self, timeout: Duration) -> Option<AsyncEvent> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register interest before checking, so a push between the
            // check and the wait is not missed.
            notified.as_mut().enable();

            if let Some(event) = self.try_pop() {
                return Some(event);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.try_pop();
            }
        }
    }

    /// Number of queued events.
    pub fn len(&self) -> usize {
        self.events.lock().map(|e| e.len()).unwrap_or(0)
    }

    /// True when no events are queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of queued events.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of events discarded to make room for newer ones.
    pub fn overwritten(&self) -> u64 {
        self.overwritten.load(Ordering::Relaxed)
    }
}

impl Default for AsyncEventQueue {
    fn default() -> Self {
        Self::new(DEFAULT_ASYNC_QUEUE_DEPTH)
    }
}

// ---------------------------------------------------------------------------
// Sink for status packets
// ---------------------------------------------------------------------------

/// Turns status packets from the demultiplexer into queued events.
///
/// Only non-data packets on the reserved async stream id produce events.
/// Anything else reaching the sink is a protocol error: it is logged and
/// counted, never fatal.
#[derive(Debug)]
pub struct AsyncEventSink {
    queue: Arc<AsyncEventQueue>,
    tick_rate: Arc<AtomicF64>,
    async_sid: u32,
    unknown: AtomicU64,
}

impl AsyncEventSink {
    /// A sink feeding `queue`, timestamping with the shared `tick_rate`.
    pub fn new(queue: Arc<AsyncEventQueue>, tick_rate: Arc<AtomicF64>, async_sid: u32) -> Self {
        AsyncEventSink {
            queue,
            tick_rate,
            async_sid,
            unknown: AtomicU64::new(0),
        }
    }

    /// Number of packets rejected as unknown.
    pub fn unknown_packets(&self) -> u64 {
        self.unknown.load(Ordering::Relaxed)
    }

    /// Decode a status packet into an event.
    ///
    /// The event code is the first payload word. The time is present only
    /// when both timestamp fields are.
    pub fn decode(&self, frame: &[u8], info: &IfPacketInfo) -> Option<AsyncEvent> {
        if info.packet_type == PacketType::Data || info.stream_id != self.async_sid {
            return None;
        }
        let code = context_code(frame, info)?;
        let has_time_spec = info.has_tsi && info.has_tsf;
        let time_spec = if has_time_spec {
            TimeSpec::from_ticks(i64::from(info.tsi), info.tsf, self.tick_rate.load())
        } else {
            TimeSpec::default()
        };
        Some(AsyncEvent {
            channel: 0,
            has_time_spec,
            time_spec,
            event_code: EventCode(code),
        })
    }
}

impl ContextSink for AsyncEventSink {
    fn handle_context(&self, frame: &[u8], info: &IfPacketInfo) {
        match self.decode(frame, info) {
            Some(event) => {
                if let Some(marker) = event.event_code.fastpath_marker() {
                    tracing::info!(target: FASTPATH_TARGET, "{}", marker);
                }
                tracing::debug!(
                    code = ?event.event_code,
                    has_time = event.has_time_spec,
                    "Async event"
                );
                self.queue.push(event);
            }
            None => {
                self.unknown.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    sid = format!("0x{:08X}", info.stream_id),
                    packet_type = ?info.packet_type,
                    "Unknown async packet"
                );
            }
        }
    }
}
