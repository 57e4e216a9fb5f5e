use std::net::IpAddr;
use std::sync::Arc;

use sdrlink_core::Result;
use sdrlink_host::control::{ControlClient, DEFAULT_CONTROL_TIMEOUT};
use sdrlink_host::{Device, DeviceBuilder};
use sdrlink_transport::UdpDataTransport;

/// A connected device: its control client and streaming facade.
pub struct Link {
    pub control: Arc<ControlClient>,
    pub device: Device,
}

/// Connect to the device at `ip` and open `num_rx_dsps` receive lanes.
///
/// Probes the control port first, so an unreachable device or one running
/// incompatible firmware fails here rather than on the first stream.
pub async fn connect(ip: IpAddr, num_rx_dsps: usize) -> Result<Link> {
    let control = Arc::new(ControlClient::connect(ip, DEFAULT_CONTROL_TIMEOUT).await?);
    let reported = control.probe_address().await?;
    tracing::info!(device = %ip, reported = %reported, "Device answered probe");

    let lanes: Vec<usize> = (0..num_rx_dsps).collect();
    let data = UdpDataTransport::open(ip, &lanes).await?;

    let device = DeviceBuilder::new()
        .transport(Arc::new(data))
        .registers(control.clone())
        .num_rx_dsps(num_rx_dsps)
        .build()
        .await?;

    Ok(Link { control, device })
}
