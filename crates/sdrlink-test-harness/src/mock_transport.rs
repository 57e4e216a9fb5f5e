//! In-memory data transport.
//!
//! [`MockDataTransport`] implements [`DataTransport`] with an unbounded
//! inbound queue that tests fill with [`push_frame`](MockDataTransport::push_frame)
//! and an outbound log that records every frame sent.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use bytes::Bytes;
//! use sdrlink_core::DataTransport;
//! use sdrlink_test_harness::MockDataTransport;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let mock = Arc::new(MockDataTransport::new());
//! mock.push_frame(Bytes::from_static(&[1, 2, 3, 4]));
//! let frame = mock.recv_frame(Duration::from_millis(10)).await.unwrap();
//! assert_eq!(&frame[..], &[1, 2, 3, 4]);
//! # }
//! ```

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use sdrlink_core::error::{Error, Result};
use sdrlink_core::transport::DataTransport;

/// Default largest frame, matching the device packet buffer.
const DEFAULT_MAX_FRAME: usize = 2048;

/// A [`DataTransport`] backed by in-memory queues.
#[derive(Debug)]
pub struct MockDataTransport {
    inbound_tx: Mutex<Option<mpsc::UnboundedSender<Bytes>>>,
    inbound_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Bytes>>,
    sent: Mutex<Vec<Bytes>>,
    max_frame_size: usize,
}

impl MockDataTransport {
    /// A transport with the default maximum frame size.
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME)
    }

    /// A transport with a specific maximum frame size.
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        MockDataTransport {
            inbound_tx: Mutex::new(Some(tx)),
            inbound_rx: tokio::sync::Mutex::new(rx),
            sent: Mutex::new(Vec::new()),
            max_frame_size,
        }
    }

    /// Queue a frame for the next `recv_frame` call.
    ///
    /// Frames pushed after [`close`](Self::close) are discarded.
    pub fn push_frame(&self, frame: impl Into<Bytes>) {
        if let Ok(guard) = self.inbound_tx.lock() {
            if let Some(tx) = guard.as_ref() {
                let _ = tx.send(frame.into());
            }
        }
    }

    /// Close the inbound side. Once the queued frames are drained,
    /// `recv_frame` returns [`Error::StreamClosed`].
    pub fn close(&self) {
        if let Ok(mut guard) = self.inbound_tx.lock() {
            guard.take();
        }
    }

    /// Every frame sent so far, in order.
    pub fn sent_frames(&self) -> Vec<Bytes> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl Default for MockDataTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataTransport for MockDataTransport {
    async fn recv_frame(&self, timeout: Duration) -> Result<Bytes> {
        let mut rx = self.inbound_rx.lock().await;
        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Some(frame)) => Ok(frame),
            Ok(None) => Err(Error::StreamClosed),
            Err(_) => Err(Error::Timeout),
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
        self.sent
            .lock()
            .map_err(|_| Error::Transport("sent log poisoned".into()))?
            .push(frame);
        Ok(())
    }

    fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}
