//! Print async status events from the transmit path.
//!
//! Underflows, sequence errors, late packets and burst acknowledgements
//! are reported by the device as status packets and surface here through
//! `Device::recv_async_msg`.
//!
//! # Usage
//!
//! ```sh
//! cargo run -p sdrlink --example monitor_events -- 192.168.10.2
//! ```

use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let ip = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "192.168.10.2".to_string())
        .parse()?;

    let link = sdrlink::connect(ip, 1).await?;
    println!("Monitoring {ip} for 60 seconds...\n");

    let deadline = tokio::time::Instant::now() + Duration::from_secs(60);
    let start = tokio::time::Instant::now();

    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }
        if let Some(event) = link.device.recv_async_msg(remaining).await {
            let elapsed = start.elapsed();
            print!("[{:>8.3}s] {:?}", elapsed.as_secs_f64(), event.event_code);
            if event.has_time_spec {
                print!(" at device time {:.6}", event.time_spec.real_secs());
            }
            println!();
        }
    }

    println!(
        "\n{} unknown status packets, {} events overwritten",
        link.device.unknown_async_packets(),
        link.device.async_events_overwritten()
    );
    link.device.shutdown().await;
    Ok(())
}
