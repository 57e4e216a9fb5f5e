//! sdrlink-test-harness: Test utilities and mocks for sdrlink.
//!
//! - [`MockBoard`] implements every device collaborator trait in memory,
//!   for deterministic firmware tests without hardware.
//! - [`MockDataTransport`] carries frames through in-memory queues, for
//!   demultiplexer and streamer tests.
//! - [`MockRegisterIface`] records register writes and serves reads from a
//!   map, for DSP proxy tests.

pub mod mock_board;
pub mod mock_regs;
pub mod mock_transport;

pub use mock_board::MockBoard;
pub use mock_regs::MockRegisterIface;
pub use mock_transport::MockDataTransport;
