//! Receive a block of samples from one DSP.
//!
//! Starts a continuous stream at 1 MS/s, reads 100k samples as
//! `Complex<f32>`, and prints the mean power and any stream errors.
//!
//! # Usage
//!
//! ```sh
//! cargo run -p sdrlink --example receive_samples -- 192.168.10.2
//! ```

use std::time::Duration;

use sdrlink::host::{RxErrorCode, StreamArgs, StreamCmd, StreamMode};
use sdrlink::{Complex, CpuFormat};

const TOTAL: usize = 100_000;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let ip = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "192.168.10.2".to_string())
        .parse()?;

    println!("Connecting to {ip}...");
    let link = sdrlink::connect(ip, 1).await?;
    let device = &link.device;

    let rate = device.set_rx_rate(0, 1e6).await?;
    println!("Rate: {rate} samples/s");

    let mut rx = device.get_rx_stream(&StreamArgs::new(CpuFormat::Fc32)).await?;
    device
        .issue_stream_cmd(0, &StreamCmd::now(StreamMode::StartContinuous))
        .await?;

    let mut buf = vec![Complex::<f32>::default(); rx.max_num_samps()];
    let mut received = 0usize;
    let mut power = 0.0f64;

    while received < TOTAL {
        let (n, md) = rx.recv(&mut [&mut buf[..]], Duration::from_secs(1)).await?;
        match md.error_code {
            RxErrorCode::None => {}
            RxErrorCode::Overflow => println!("overflow"),
            RxErrorCode::Timeout => {
                println!("timed out waiting for samples");
                break;
            }
            other => println!("stream error: {other:?}"),
        }
        power += buf[..n]
            .iter()
            .map(|s| f64::from(s.re * s.re + s.im * s.im))
            .sum::<f64>();
        received += n;
    }

    device
        .issue_stream_cmd(0, &StreamCmd::now(StreamMode::StopContinuous))
        .await?;

    if received > 0 {
        let mean = power / received as f64;
        println!("{received} samples, mean power {:.1} dBFS", 10.0 * mean.log10());
    }

    device.shutdown().await;
    Ok(())
}
