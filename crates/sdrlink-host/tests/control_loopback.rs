//! The control client against the firmware dispatcher, over loopback UDP.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sdrlink_core::hal::{SpiFlags, SpiTransfer};
use sdrlink_firmware::{Capabilities, Dispatcher};
use sdrlink_host::control::{ControlClient, SpiEdge};
use sdrlink_test_harness::mock_board::{MOCK_IP, MockVctcxo};
use sdrlink_test_harness::MockBoard;
use tokio::net::UdpSocket;

type Device = Arc<Mutex<(Dispatcher, MockBoard)>>;

/// Serve control requests from a dispatcher and board on a loopback port.
async fn serve(capabilities: Capabilities, board: MockBoard) -> (SocketAddr, Device) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    let device: Device = Arc::new(Mutex::new((Dispatcher::new(capabilities), board)));

    let state = device.clone();
    tokio::spawn(async move {
        let mut buf = [0u8; 2048];
        while let Ok((n, src)) = socket.recv_from(&mut buf).await {
            let SocketAddr::V4(src) = src else { continue };
            let reply = {
                let mut guard = state.lock().unwrap();
                let (dispatcher, board) = &mut *guard;
                dispatcher.handle(board, &buf[..n], src)
            };
            let _ = socket.send_to(&reply.bytes, SocketAddr::V4(reply.dest)).await;
        }
    });

    (addr, device)
}

async fn client(addr: SocketAddr) -> ControlClient {
    ControlClient::connect_addr(addr, Duration::from_secs(1)).await.unwrap()
}

#[tokio::test]
async fn probe_returns_board_address() {
    let (addr, _device) = serve(Capabilities::STANDARD, MockBoard::new()).await;
    let ctrl = client(addr).await;
    assert_eq!(ctrl.probe_address().await.unwrap(), MOCK_IP);
}

#[tokio::test]
async fn probe_reaches_umtrx_build() {
    let (addr, _device) = serve(Capabilities::UMTRX, MockBoard::new()).await;
    let ctrl = client(addr).await;
    assert_eq!(ctrl.probe_address().await.unwrap(), MOCK_IP);

    // Later requests are unaffected by the rejected standard probe.
    ctrl.poke32(0xD0C0, 7).await.unwrap();
    assert_eq!(ctrl.peek32(0xD0C0).await.unwrap(), 7);
}

#[tokio::test]
async fn registers_round_trip_through_board() {
    let (addr, device) = serve(Capabilities::STANDARD, MockBoard::new()).await;
    let ctrl = client(addr).await;

    ctrl.poke32(0xD0C0, 0x1234_5678).await.unwrap();
    assert_eq!(ctrl.peek32(0xD0C0).await.unwrap(), 0x1234_5678);
    ctrl.poke16(0xC000, 0xBEEF).await.unwrap();
    assert_eq!(ctrl.peek16(0xC000).await.unwrap(), 0xBEEF);

    let guard = device.lock().unwrap();
    assert_eq!(guard.1.register(0xD0C0), 0x1234_5678);
}

#[tokio::test]
async fn firmware_registers_are_separate() {
    let (addr, device) = serve(Capabilities::STANDARD, MockBoard::new()).await;
    let ctrl = client(addr).await;

    ctrl.fw_poke32(3, 99).await.unwrap();
    assert_eq!(ctrl.fw_peek32(3).await.unwrap(), 99);
    // Out of range: ignored on write, zero on read.
    ctrl.fw_poke32(10_000, 1).await.unwrap();
    assert_eq!(ctrl.fw_peek32(10_000).await.unwrap(), 0);

    let guard = device.lock().unwrap();
    assert_eq!(guard.0.registers().peek(3), Some(99));
    assert!(guard.1.pokes().is_empty());
}

#[tokio::test]
async fn spi_transaction_with_readback() {
    let mut board = MockBoard::new();
    if let Some(spi) = board.spi.as_mut() {
        spi.readback = 0x00AB_CDEF;
    }
    let (addr, device) = serve(Capabilities::STANDARD, board).await;
    let ctrl = client(addr).await;

    let word = ctrl
        .transact_spi(2, 0x0012_3456, 24, SpiEdge::Rise, SpiEdge::Rise, true)
        .await
        .unwrap();
    assert_eq!(word, 0x00AB_CDEF);

    let guard = device.lock().unwrap();
    let calls = &guard.1.spi.as_ref().unwrap().calls;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].transfer, SpiTransfer::TxRx);
    assert_eq!(calls[0].dev, 2);
    assert_eq!(calls[0].num_bits, 24);
    assert_eq!(calls[0].flags, SpiFlags::PUSH_FALL.union(SpiFlags::LATCH_RISE));
}

#[tokio::test]
async fn i2c_read_and_write() {
    let mut board = MockBoard::new();
    if let Some(i2c) = board.i2c.as_mut() {
        i2c.devices.insert(0x50, vec![1, 2, 3, 4]);
    }
    let (addr, device) = serve(Capabilities::STANDARD, board).await;
    let ctrl = client(addr).await;

    assert_eq!(ctrl.read_i2c(0x50, 3).await.unwrap(), vec![1, 2, 3]);
    ctrl.write_i2c(0x51, &[9, 8]).await.unwrap();

    let guard = device.lock().unwrap();
    assert_eq!(guard.1.i2c.as_ref().unwrap().writes, vec![(0x51, vec![9, 8])]);
}

#[tokio::test]
async fn echo_comes_back_at_requested_length() {
    let (addr, _device) = serve(Capabilities::STANDARD, MockBoard::new()).await;
    let ctrl = client(addr).await;
    assert_eq!(ctrl.echo(1500).await.unwrap(), 1500);
    assert_eq!(ctrl.echo(64).await.unwrap(), 64);
}

#[tokio::test]
async fn vctcxo_dac_on_umtrx_build() {
    let mut board = MockBoard::new();
    board.vctcxo = Some(MockVctcxo { value: 2048 });
    let (addr, device) = serve(Capabilities::UMTRX, board).await;
    let ctrl = client(addr).await;

    assert_eq!(ctrl.vctcxo_dac().await.unwrap(), 2048);
    ctrl.set_vctcxo_dac(1500).await.unwrap();
    assert_eq!(ctrl.vctcxo_dac().await.unwrap(), 1500);

    let guard = device.lock().unwrap();
    assert_eq!(guard.1.vctcxo.as_ref().unwrap().value, 1500);
}

#[tokio::test]
async fn standard_build_rejects_vctcxo_requests() {
    let (addr, _device) = serve(Capabilities::STANDARD, MockBoard::new()).await;
    let ctrl = client(addr).await;
    assert!(ctrl.vctcxo_dac().await.is_err());
}

#[tokio::test]
async fn device_serves_register_interface() {
    use sdrlink_core::RegisterIface;

    let (addr, _device) = serve(Capabilities::STANDARD, MockBoard::new()).await;
    let regs: Arc<dyn RegisterIface> = Arc::new(client(addr).await);
    regs.poke32(0xD100, 7).await.unwrap();
    assert_eq!(regs.peek32(0xD100).await.unwrap(), 7);
}
