//! Error types for sdrlink.
//!
//! All fallible operations across the workspace return [`Result<T>`], which
//! uses [`Error`] as the error type. Transport-layer, wire-format, and
//! stream-setup errors are all captured here.

/// The error type for all sdrlink operations.
///
/// Steady-state streaming faults (underflow, sequence errors, late
/// packets) are *not* represented here: they are delivered as
/// [`AsyncEvent`](crate::events::AsyncEvent)s or as receive metadata
/// error codes so that no blocking call ever fails because of them.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (socket, in-memory channel).
    #[error("transport error: {0}")]
    Transport(String),

    /// A protocol-level error (unexpected response id, bad field value).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A framed packet header could not be decoded.
    ///
    /// Raised when the buffer is shorter than the minimum header, or when
    /// the declared packet size does not fit the buffer.
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// The device answered with a different protocol compatibility number.
    #[error("protocol version mismatch: expected {expected}, got {actual}")]
    ProtocolVersionMismatch {
        /// The compatibility number this build speaks.
        expected: u32,
        /// The compatibility number the peer reported.
        actual: u32,
    },

    /// A buffer arrived for a stream id that has no configured path.
    #[error("unroutable stream id 0x{0:08X}")]
    UnroutableStream(u32),

    /// The requested over-the-wire sample format cannot be produced by
    /// the hardware path.
    #[error("unsupported wire format: {0}")]
    UnsupportedWireFormat(String),

    /// An invalid parameter was passed to a stream or control operation.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Timed out waiting for a response from the device.
    #[error("timeout waiting for response")]
    Timeout,

    /// No connection to the device has been established.
    #[error("not connected")]
    NotConnected,

    /// A sample or event stream was closed unexpectedly.
    #[error("stream closed")]
    StreamClosed,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;
