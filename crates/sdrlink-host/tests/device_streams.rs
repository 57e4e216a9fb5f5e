//! Device-level stream setup and data flow against mock register and data
//! transports.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use sdrlink_core::{Complex, CpuFormat, Error, EventCode, OtwFormat};
use sdrlink_host::{Device, DeviceBuilder, RxErrorCode, StreamArgs, TxMetadata};
use sdrlink_test_harness::{MockDataTransport, MockRegisterIface};
use sdrlink_wire::ports::{RX_SID_BASE, TX_ASYNC_SID, TX_SID_BASE};
use sdrlink_wire::regs::{
    self, RX_CTRL_CLEAR, RX_CTRL_FORMAT, RX_CTRL_NSAMPS_PER_PKT, RX_CTRL_VRT_SID, RX_FORMAT_SC8,
    TX_CTRL_CLEAR_STATE, TX_CTRL_POLICY, TX_CTRL_REPORT_SID, TX_POLICY_NEXT_BURST,
};
use sdrlink_wire::vrt::{IfPacketInfo, PacketType, header_words32, pack_le, unpack_le};

const TIMEOUT: Duration = Duration::from_millis(500);

async fn device(num_rx: usize) -> (Arc<MockDataTransport>, Arc<MockRegisterIface>, Device) {
    let data = Arc::new(MockDataTransport::new());
    let regs = Arc::new(MockRegisterIface::new());
    let dev = DeviceBuilder::new()
        .transport(data.clone())
        .registers(regs.clone())
        .num_rx_dsps(num_rx)
        .poll_interval(Duration::from_millis(10))
        .build()
        .await
        .unwrap();
    regs.clear_log();
    (data, regs, dev)
}

fn rx_ctrl(lane: usize, offset: u32) -> u32 {
    regs::rx_ctrl_addr(lane, offset).unwrap()
}

fn data_packet(sid: u32, count: u8, tsi: u32, samples: &[(i16, i16)]) -> Bytes {
    let mut info = IfPacketInfo {
        stream_id: sid,
        packet_count: count,
        has_tsi: true,
        tsi,
        has_tsf: true,
        tsf: 0,
        has_tlr: true,
        num_payload_words32: samples.len(),
        ..Default::default()
    };
    let hdr = header_words32(&info) * 4;
    let mut buf = vec![0u8; hdr + samples.len() * 4 + 4];
    for (k, (i, q)) in samples.iter().enumerate() {
        let w = (*i as u16 as u32) << 16 | *q as u16 as u32;
        buf[hdr + 4 * k..hdr + 4 * k + 4].copy_from_slice(&w.to_le_bytes());
    }
    pack_le(&mut info, &mut buf).unwrap();
    Bytes::from(buf)
}

fn status_packet(sid: u32, code: u32) -> Bytes {
    let mut info = IfPacketInfo {
        packet_type: PacketType::Context,
        stream_id: sid,
        num_payload_words32: 1,
        ..Default::default()
    };
    let mut buf = vec![0u8; 64];
    let offset = header_words32(&info) * 4;
    buf[offset..offset + 4].copy_from_slice(&code.to_le_bytes());
    pack_le(&mut info, &mut buf).unwrap();
    buf.truncate(info.packet_len());
    Bytes::from(buf)
}

#[tokio::test]
async fn build_programs_stream_ids() {
    let data = Arc::new(MockDataTransport::new());
    let regs = Arc::new(MockRegisterIface::new());
    let dev = DeviceBuilder::new()
        .transport(data)
        .registers(regs.clone())
        .num_rx_dsps(2)
        .build()
        .await
        .unwrap();

    assert_eq!(dev.num_rx_dsps(), 2);
    assert_eq!(regs.pokes_to(rx_ctrl(0, RX_CTRL_VRT_SID)), vec![RX_SID_BASE]);
    assert_eq!(regs.pokes_to(rx_ctrl(1, RX_CTRL_VRT_SID)), vec![RX_SID_BASE + 1]);
    assert_eq!(
        regs.pokes_to(regs::tx_ctrl_addr(TX_CTRL_REPORT_SID)),
        vec![TX_ASYNC_SID]
    );
}

#[tokio::test]
async fn builder_requires_transports() {
    let result = DeviceBuilder::new()
        .registers(Arc::new(MockRegisterIface::new()))
        .build()
        .await;
    assert!(matches!(result, Err(Error::InvalidParameter(_))));
}

#[tokio::test]
async fn rx_stream_configures_every_channel() {
    let (_data, regs, dev) = device(2).await;
    let args = StreamArgs::new(CpuFormat::Fc32).channels(&[0, 1]);
    let rx = dev.get_rx_stream(&args).await.unwrap();

    // (2048 - 24) / 4
    assert_eq!(rx.max_num_samps(), 506);
    assert_eq!(rx.num_channels(), 2);
    for lane in 0..2 {
        assert_eq!(regs.pokes_to(rx_ctrl(lane, RX_CTRL_NSAMPS_PER_PKT)), vec![506]);
        assert_eq!(regs.pokes_to(rx_ctrl(lane, RX_CTRL_CLEAR)), vec![1]);
        assert_eq!(regs.pokes_to(rx_ctrl(lane, RX_CTRL_FORMAT)), vec![0x400]);
    }
}

#[tokio::test]
async fn rx_stream_args() {
    let (_data, regs, dev) = device(1).await;
    let args = StreamArgs::new(CpuFormat::Sc16)
        .otw_format(OtwFormat::Sc8)
        .parse_args("spp=100,noclear,scalar=2048");
    let rx = dev.get_rx_stream(&args).await.unwrap();

    assert_eq!(rx.max_num_samps(), 100);
    assert_eq!(rx.otw_format(), OtwFormat::Sc8);
    assert!(regs.pokes_to(rx_ctrl(0, RX_CTRL_CLEAR)).is_empty());
    assert_eq!(
        regs.pokes_to(rx_ctrl(0, RX_CTRL_FORMAT)),
        vec![RX_FORMAT_SC8 | 2048]
    );
}

#[tokio::test]
async fn rx_stream_rejects_missing_dsp() {
    let (_data, _regs, dev) = device(2).await;
    let args = StreamArgs::new(CpuFormat::Fc32).channels(&[2]);
    assert!(matches!(
        dev.get_rx_stream(&args).await,
        Err(Error::InvalidParameter(_))
    ));
}

#[tokio::test]
async fn rx_samples_flow_from_transport() {
    let (data, _regs, dev) = device(2).await;
    let args = StreamArgs::new(CpuFormat::Sc16).channels(&[1]);
    let mut rx = dev.get_rx_stream(&args).await.unwrap();

    data.push_frame(data_packet(RX_SID_BASE + 1, 0, 5, &[(1, -1), (2, -2), (3, -3)]));

    let mut buf = [Complex::<i16>::default(); 8];
    let (n, md) = rx.recv(&mut [&mut buf[..]], TIMEOUT).await.unwrap();
    assert_eq!(n, 3);
    assert_eq!(md.error_code, RxErrorCode::None);
    assert!(md.has_time_spec);
    assert_eq!(md.time_spec.full_secs, 5);
    assert_eq!(buf[2], Complex::new(3, -3));
    assert_eq!(dev.demux_stats().delivered(1), 1);
}

#[tokio::test]
async fn rx_recv_times_out_without_packets() {
    let (_data, _regs, dev) = device(1).await;
    let mut rx = dev
        .get_rx_stream(&StreamArgs::new(CpuFormat::Fc32))
        .await
        .unwrap();
    let mut buf = [Complex::<f32>::default(); 4];
    let (n, md) = rx
        .recv(&mut [&mut buf[..]], Duration::from_millis(20))
        .await
        .unwrap();
    assert_eq!(n, 0);
    assert_eq!(md.error_code, RxErrorCode::Timeout);
}

#[tokio::test]
async fn rate_changes_reach_live_streamers_only() {
    let (_data, _regs, dev) = device(1).await;
    let rx = dev
        .get_rx_stream(&StreamArgs::new(CpuFormat::Fc32))
        .await
        .unwrap();
    let rates = rx.rates().clone();
    assert_eq!(rates.tick_rate(), 100e6);

    let actual = dev.set_rx_rate(0, 1e6).await.unwrap();
    assert_eq!(actual, 1e6);
    assert_eq!(rates.samp_rate(), 1e6);
    // CIC gain correction for a decimation of 100.
    let expected_scale = 2f64.powi(27) / (1.65 * 1e8);
    assert!((rates.scale_factor() - expected_scale).abs() < 1e-12);

    dev.set_tick_rate(64e6);
    assert_eq!(rates.tick_rate(), 64e6);

    drop(rx);
    drop(rates);
    // No streamer left: the device still accepts the change.
    assert!(dev.set_rx_rate(0, 2e6).await.is_ok());
}

#[tokio::test]
async fn new_streamer_picks_up_current_rates() {
    let (_data, _regs, dev) = device(1).await;
    dev.set_rx_rate(0, 4e6).await.unwrap();
    dev.set_tx_rate(0, 2e6).await.unwrap();

    let rx = dev
        .get_rx_stream(&StreamArgs::new(CpuFormat::Fc32))
        .await
        .unwrap();
    let tx = dev
        .get_tx_stream(&StreamArgs::new(CpuFormat::Fc32))
        .await
        .unwrap();
    assert_eq!(rx.rates().samp_rate(), 4e6);
    assert_eq!(tx.rates().samp_rate(), 2e6);
    assert_eq!(dev.rx_rate(0), Some(4e6));
    assert_eq!(dev.tx_rate(), 2e6);
}

#[tokio::test]
async fn tx_stream_restrictions() {
    let (_data, _regs, dev) = device(1).await;

    let sc8 = StreamArgs::new(CpuFormat::Fc32).otw_format(OtwFormat::Sc8);
    assert!(matches!(
        dev.get_tx_stream(&sc8).await,
        Err(Error::UnsupportedWireFormat(_))
    ));

    let dsp1 = StreamArgs::new(CpuFormat::Fc32).channels(&[1]);
    assert!(matches!(
        dev.get_tx_stream(&dsp1).await,
        Err(Error::InvalidParameter(_))
    ));
}

#[tokio::test]
async fn tx_stream_setup_pokes() {
    let (_data, regs, dev) = device(1).await;
    let args = StreamArgs::new(CpuFormat::Fc32).arg("underflow_policy", "next_burst");
    let tx = dev.get_tx_stream(&args).await.unwrap();

    // (2048 - 20) / 4
    assert_eq!(tx.max_num_samps(), 507);
    assert_eq!(regs.pokes_to(regs::tx_ctrl_addr(TX_CTRL_CLEAR_STATE)), vec![1]);
    assert_eq!(
        regs.pokes_to(regs::tx_ctrl_addr(TX_CTRL_POLICY)),
        vec![TX_POLICY_NEXT_BURST]
    );

    regs.clear_log();
    let _tx = dev
        .get_tx_stream(&StreamArgs::new(CpuFormat::Fc32).parse_args("noclear"))
        .await
        .unwrap();
    assert!(regs.pokes_to(regs::tx_ctrl_addr(TX_CTRL_CLEAR_STATE)).is_empty());
}

#[tokio::test]
async fn tx_samples_reach_transport() {
    let (data, _regs, dev) = device(1).await;
    let mut tx = dev
        .get_tx_stream(&StreamArgs::new(CpuFormat::Sc16).arg("spp", "4"))
        .await
        .unwrap();

    let samples = [Complex::new(100i16, -100i16); 6];
    let md = TxMetadata {
        start_of_burst: true,
        end_of_burst: true,
        ..Default::default()
    };
    let sent = tx.send(&[&samples[..]], &md, TIMEOUT).await.unwrap();
    assert_eq!(sent, 6);

    let frames = data.sent_frames();
    assert_eq!(frames.len(), 2);
    let first = unpack_le(&frames[0]).unwrap();
    let second = unpack_le(&frames[1]).unwrap();
    assert_eq!(first.stream_id, TX_SID_BASE);
    assert_eq!(first.num_payload_words32, 4);
    assert_eq!(second.num_payload_words32, 2);
    assert!(first.sob && !first.eob);
    assert!(!second.sob && second.eob);
}

#[tokio::test]
async fn status_packets_become_async_events() {
    let (data, _regs, dev) = device(1).await;

    data.push_frame(status_packet(TX_ASYNC_SID, EventCode::UNDERFLOW.bits()));
    let event = dev.recv_async_msg(TIMEOUT).await.unwrap();
    assert_eq!(event.event_code, EventCode::UNDERFLOW);
    assert_eq!(event.channel, 0);
    assert!(!event.has_time_spec);

    data.push_frame(status_packet(0x99, EventCode::BURST_ACK.bits()));
    assert!(dev.recv_async_msg(Duration::from_millis(50)).await.is_none());
    assert_eq!(dev.unknown_async_packets(), 1);
}

#[tokio::test]
async fn slow_reader_does_not_stall_other_paths() {
    let data = Arc::new(MockDataTransport::new());
    let regs = Arc::new(MockRegisterIface::new());
    let dev = DeviceBuilder::new()
        .transport(data.clone())
        .registers(regs)
        .num_rx_dsps(2)
        .demux_queue_depth(2)
        .build()
        .await
        .unwrap();
    let mut rx1 = dev
        .get_rx_stream(&StreamArgs::new(CpuFormat::Sc16).channels(&[1]))
        .await
        .unwrap();

    // Nobody reads DSP 0.
    for count in 0..5 {
        data.push_frame(data_packet(RX_SID_BASE, count, 0, &[(0, 0)]));
    }
    data.push_frame(data_packet(RX_SID_BASE + 1, 0, 0, &[(7, 7)]));

    let mut buf = [Complex::<i16>::default(); 4];
    let (n, _) = rx1.recv(&mut [&mut buf[..]], TIMEOUT).await.unwrap();
    assert_eq!(n, 1);
    assert_eq!(buf[0], Complex::new(7, 7));
    assert_eq!(dev.demux_stats().delivered(0), 2);
    assert_eq!(dev.demux_stats().dropped(0), 3);
}

#[tokio::test]
async fn shutdown_ends_reception() {
    let (data, _regs, dev) = device(1).await;
    let mut rx = dev
        .get_rx_stream(&StreamArgs::new(CpuFormat::Sc16))
        .await
        .unwrap();
    dev.shutdown().await;

    data.push_frame(data_packet(RX_SID_BASE, 0, 0, &[(1, 1)]));
    let mut buf = [Complex::<i16>::default(); 4];
    let (n, md) = rx
        .recv(&mut [&mut buf[..]], Duration::from_millis(50))
        .await
        .unwrap();
    assert_eq!(n, 0);
    assert_eq!(md.error_code, RxErrorCode::Timeout);
}
