// sdrlink test application -- CLI tool for exercising a device's control
// port and sample streams.
//
// Usage:
//   sdrlink-test-app --addr 192.168.10.2 probe
//   sdrlink-test-app --addr 192.168.10.2 peek 0xD080
//   sdrlink-test-app --addr 192.168.10.2 poke 0xD080 0x1
//   sdrlink-test-app --addr 192.168.10.2 peek --fw 7
//   sdrlink-test-app --addr 192.168.10.2 echo --count 100
//   sdrlink-test-app --addr 192.168.10.2 rx --rate 1e6 --nsamps 1000000
//   sdrlink-test-app --addr 192.168.10.2 tx --rate 1e6 --nsamps 10000
//   sdrlink-test-app --addr 192.168.10.2 events --duration 10
//
// Logging is controlled by RUST_LOG (default: sdrlink=info). Fast-path
// markers (O, U, S, L) are logged on the `sdrlink::fastpath` target.

use std::net::IpAddr;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use rand::Rng;

use sdrlink::host::control::{ControlClient, DEFAULT_CONTROL_TIMEOUT, SpiEdge};
use sdrlink::host::{
    Device, RxErrorCode, RxStreamer, Sample, StreamArgs, StreamCmd, StreamMode, TxMetadata,
};
use sdrlink::wire::control::{CTRL_PACKET_SIZE, MAX_ECHO_LEN};
use sdrlink::{Complex, CpuFormat, EventCode, OtwFormat};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// sdrlink test application -- talks to a device from the command line.
#[derive(Parser)]
#[command(name = "sdrlink-test-app", version, about)]
struct Cli {
    /// Device IP address.
    #[arg(long)]
    addr: IpAddr,

    /// Number of receive DSPs to open.
    #[arg(long, default_value_t = 1)]
    rx_dsps: usize,

    #[command(subcommand)]
    command: Command,
}

/// Parse a number given in decimal or with a `0x` prefix.
fn parse_u32(s: &str) -> std::result::Result<u32, String> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    }
    .map_err(|e| format!("invalid number {s:?}: {e}"))
}

#[derive(Subcommand)]
enum Command {
    /// Ask the device for its address and check the protocol version.
    Probe,

    /// Read a register.
    Peek {
        #[arg(value_parser = parse_u32)]
        addr: u32,
        /// Read a firmware register (index) instead of a device register.
        #[arg(long)]
        fw: bool,
        /// 16-bit access.
        #[arg(long, conflicts_with = "fw")]
        short: bool,
    },

    /// Write a register.
    Poke {
        #[arg(value_parser = parse_u32)]
        addr: u32,
        #[arg(value_parser = parse_u32)]
        value: u32,
        /// Write a firmware register (index) instead of a device register.
        #[arg(long)]
        fw: bool,
        /// 16-bit access.
        #[arg(long, conflicts_with = "fw")]
        short: bool,
    },

    /// Run one SPI transaction.
    Spi {
        #[arg(value_parser = parse_u32)]
        dev: u32,
        #[arg(value_parser = parse_u32)]
        data: u32,
        #[arg(long, default_value_t = 24)]
        bits: u8,
        /// Read back the shifted-in word.
        #[arg(long)]
        readback: bool,
    },

    /// Read bytes from an I2C device.
    I2cRead {
        #[arg(value_parser = parse_u32)]
        addr: u32,
        #[arg(long, default_value_t = 1)]
        bytes: usize,
    },

    /// Write bytes to an I2C device.
    I2cWrite {
        #[arg(value_parser = parse_u32)]
        addr: u32,
        #[arg(value_parser = parse_u32, required = true)]
        bytes: Vec<u32>,
    },

    /// Echo round-trips with random lengths.
    Echo {
        #[arg(long, default_value_t = 10)]
        count: u32,
    },

    /// Receive samples and report stream health.
    Rx {
        #[arg(long, default_value_t = 1e6)]
        rate: f64,
        /// Samples to receive (0 = until Ctrl-C).
        #[arg(long, default_value_t = 1_000_000)]
        nsamps: u64,
        #[arg(long, default_value_t = 0)]
        dsp: usize,
        /// Host sample format: fc32, fc64, sc16.
        #[arg(long, default_value = "fc32")]
        cpu: CpuFormat,
        /// Wire format: sc16, sc8.
        #[arg(long, default_value = "sc16")]
        otw: OtwFormat,
        /// Extra stream args, e.g. "spp=200,noclear".
        #[arg(long, default_value = "")]
        args: String,
    },

    /// Send a constant-envelope tone burst and wait for its acknowledgement.
    Tx {
        #[arg(long, default_value_t = 1e6)]
        rate: f64,
        #[arg(long, default_value_t = 10_000)]
        nsamps: usize,
        /// Tone amplitude, 0.0 to 1.0.
        #[arg(long, default_value_t = 0.5)]
        ampl: f32,
        /// Extra stream args, e.g. "underflow_policy=next_burst".
        #[arg(long, default_value = "")]
        args: String,
    },

    /// Print async events as they arrive.
    Events {
        /// Duration in seconds (0 = run until Ctrl-C).
        #[arg(long, default_value_t = 0)]
        duration: u64,
    },
}

// ---------------------------------------------------------------------------
// Control commands
// ---------------------------------------------------------------------------

async fn cmd_probe(ctrl: &ControlClient) -> Result<()> {
    let ip = ctrl.probe_address().await?;
    println!("Device at {} reports address {ip}", ctrl.peer());
    Ok(())
}

async fn cmd_peek(ctrl: &ControlClient, addr: u32, fw: bool, short: bool) -> Result<()> {
    let value = if fw {
        ctrl.fw_peek32(addr).await?
    } else if short {
        u32::from(ctrl.peek16(addr).await?)
    } else {
        ctrl.peek32(addr).await?
    };
    println!("0x{addr:08X} = 0x{value:08X} ({value})");
    Ok(())
}

async fn cmd_poke(ctrl: &ControlClient, addr: u32, value: u32, fw: bool, short: bool) -> Result<()> {
    if fw {
        ctrl.fw_poke32(addr, value).await?;
    } else if short {
        let value = u16::try_from(value).context("16-bit poke value out of range")?;
        ctrl.poke16(addr, value).await?;
    } else {
        ctrl.poke32(addr, value).await?;
    }
    println!("0x{addr:08X} <- 0x{value:08X}");
    Ok(())
}

async fn cmd_echo(ctrl: &ControlClient, count: u32) -> Result<()> {
    let mut rng = rand::thread_rng();
    let mut failures = 0u32;
    let start = Instant::now();

    for i in 1..=count {
        let len = rng.gen_range(CTRL_PACKET_SIZE..=MAX_ECHO_LEN);
        match ctrl.echo(len).await {
            Ok(n) if n == len => {}
            Ok(n) => {
                eprintln!("[{i}/{count}] asked for {len} bytes, got {n}");
                failures += 1;
            }
            Err(e) => {
                eprintln!("[{i}/{count}] echo failed: {e}");
                failures += 1;
            }
        }
    }

    let elapsed = start.elapsed();
    println!(
        "{count} echoes, {failures} failures, {:.2} ms average",
        elapsed.as_secs_f64() * 1000.0 / f64::from(count.max(1))
    );
    if failures > 0 {
        bail!("{failures} echo failures");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Streaming commands
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RxStats {
    samples: u64,
    packets: u64,
    overflows: u64,
    timeouts: u64,
    misaligned: u64,
    bad_packets: u64,
}

async fn receive<T: Sample>(rx: &mut RxStreamer, nsamps: u64) -> RxStats {
    let mut buf = vec![T::default(); rx.max_num_samps()];
    let mut stats = RxStats::default();

    while nsamps == 0 || stats.samples < nsamps {
        let result = rx.recv(&mut [&mut buf[..]], Duration::from_secs(1)).await;
        let (n, md) = match result {
            Ok(r) => r,
            Err(e) => {
                eprintln!("recv failed: {e}");
                break;
            }
        };
        stats.samples += n as u64;
        if n > 0 {
            stats.packets += 1;
        }
        match md.error_code {
            RxErrorCode::None => {}
            RxErrorCode::Overflow => stats.overflows += 1,
            RxErrorCode::Alignment => stats.misaligned += 1,
            RxErrorCode::BadPacket => stats.bad_packets += 1,
            RxErrorCode::Timeout => {
                stats.timeouts += 1;
                if stats.timeouts >= 3 {
                    eprintln!("No samples for 3 seconds, giving up");
                    break;
                }
            }
        }
    }
    stats
}

async fn cmd_rx(
    device: &Device,
    rate: f64,
    nsamps: u64,
    dsp: usize,
    cpu: CpuFormat,
    otw: OtwFormat,
    extra: &str,
) -> Result<()> {
    let actual = device.set_rx_rate(dsp, rate).await?;
    println!("Rx rate: {actual} samples/s");

    let args = StreamArgs::new(cpu)
        .otw_format(otw)
        .channels(&[dsp])
        .parse_args(extra);
    let mut rx = device.get_rx_stream(&args).await?;
    println!(
        "Streaming {} over {} with {} samples per packet",
        rx.cpu_format(),
        rx.otw_format(),
        rx.max_num_samps()
    );

    device
        .issue_stream_cmd(dsp, &StreamCmd::now(StreamMode::StartContinuous))
        .await?;
    let start = Instant::now();
    let stats = match cpu {
        CpuFormat::Fc32 => receive::<Complex<f32>>(&mut rx, nsamps).await,
        CpuFormat::Fc64 => receive::<Complex<f64>>(&mut rx, nsamps).await,
        CpuFormat::Sc16 => receive::<Complex<i16>>(&mut rx, nsamps).await,
    };
    let elapsed = start.elapsed();
    device
        .issue_stream_cmd(dsp, &StreamCmd::now(StreamMode::StopContinuous))
        .await?;

    let secs = elapsed.as_secs_f64();
    println!("Received {} samples in {} calls over {secs:.2} s", stats.samples, stats.packets);
    if secs > 0.0 {
        println!("Throughput: {:.0} samples/s", stats.samples as f64 / secs);
    }
    println!(
        "Overflows: {}  Timeouts: {}  Misaligned: {}  Bad packets: {}  Sequence errors: {}",
        stats.overflows,
        stats.timeouts,
        stats.misaligned,
        stats.bad_packets,
        rx.sequence_errors()
    );
    let demux = device.demux_stats();
    println!(
        "Demux: delivered {}  dropped {}  unroutable {}  malformed {}",
        demux.delivered(dsp),
        demux.dropped(dsp),
        demux.unroutable(),
        demux.malformed()
    );
    Ok(())
}

async fn cmd_tx(device: &Device, rate: f64, nsamps: usize, ampl: f32, extra: &str) -> Result<()> {
    if !(0.0..=1.0).contains(&ampl) {
        bail!("amplitude {ampl} outside 0.0..=1.0");
    }
    let actual = device.set_tx_rate(0, rate).await?;
    println!("Tx rate: {actual} samples/s");

    let mut tx = device
        .get_tx_stream(&StreamArgs::new(CpuFormat::Fc32).parse_args(extra))
        .await?;

    // A tone at a tenth of the sample rate.
    let step = std::f32::consts::TAU / 10.0;
    let samples: Vec<Complex<f32>> = (0..nsamps)
        .map(|n| {
            let phase = step * n as f32;
            Complex::new(ampl * phase.cos(), ampl * phase.sin())
        })
        .collect();

    let md = TxMetadata {
        start_of_burst: true,
        end_of_burst: true,
        ..Default::default()
    };
    let sent = tx.send(&[&samples[..]], &md, Duration::from_secs(1)).await?;
    println!("Sent {sent} of {nsamps} samples");

    let deadline = Instant::now() + Duration::from_secs(1);
    while let Some(event) = device
        .recv_async_msg(deadline.saturating_duration_since(Instant::now()))
        .await
    {
        println!("[event] {:?}", event.event_code);
        if event.event_code.contains(EventCode::BURST_ACK) {
            println!("Burst acknowledged");
            return Ok(());
        }
    }
    bail!("no burst acknowledgement within 1 s");
}

async fn cmd_events(device: &Device, duration_secs: u64) -> Result<()> {
    println!("Waiting for async events (Ctrl-C to stop)...");

    let deadline = (duration_secs > 0).then(|| Instant::now() + Duration::from_secs(duration_secs));

    loop {
        let timeout = match deadline {
            Some(dl) => {
                let remaining = dl.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }
                remaining
            }
            None => Duration::from_secs(3600),
        };

        if let Some(event) = device.recv_async_msg(timeout).await {
            if event.has_time_spec {
                println!(
                    "[event] ch{} {:?} at {:.9} s",
                    event.channel,
                    event.event_code,
                    event.time_spec.real_secs()
                );
            } else {
                println!("[event] ch{} {:?}", event.channel, event.event_code);
            }
        }
    }

    println!(
        "Done. Unknown status packets: {}  Events overwritten: {}",
        device.unknown_async_packets(),
        device.async_events_overwritten()
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

async fn connect_control(addr: IpAddr) -> Result<ControlClient> {
    ControlClient::connect(addr, DEFAULT_CONTROL_TIMEOUT)
        .await
        .with_context(|| format!("connecting to {addr}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("sdrlink=info")),
        )
        .init();

    let cli = Cli::parse();

    // Control-only commands need no data path.
    let ctrl = || connect_control(cli.addr);
    match &cli.command {
        Command::Probe => return cmd_probe(&ctrl().await?).await,
        Command::Peek { addr, fw, short } => return cmd_peek(&ctrl().await?, *addr, *fw, *short).await,
        Command::Poke {
            addr,
            value,
            fw,
            short,
        } => return cmd_poke(&ctrl().await?, *addr, *value, *fw, *short).await,
        Command::Spi {
            dev,
            data,
            bits,
            readback,
        } => {
            let word = ctrl()
                .await?
                .transact_spi(*dev, *data, *bits, SpiEdge::Rise, SpiEdge::Rise, *readback)
                .await?;
            println!("SPI dev {dev}: wrote 0x{data:06X}, read 0x{word:06X}");
            return Ok(());
        }
        Command::I2cRead { addr, bytes } => {
            let addr = u8::try_from(*addr).context("I2C address out of range")?;
            let data = ctrl().await?.read_i2c(addr, *bytes).await?;
            println!("I2C 0x{addr:02X}: {data:02X?}");
            return Ok(());
        }
        Command::I2cWrite { addr, bytes } => {
            let addr = u8::try_from(*addr).context("I2C address out of range")?;
            let data = bytes
                .iter()
                .map(|&b| u8::try_from(b))
                .collect::<std::result::Result<Vec<u8>, _>>()
                .context("I2C data byte out of range")?;
            ctrl().await?.write_i2c(addr, &data).await?;
            println!("I2C 0x{addr:02X} <- {data:02X?}");
            return Ok(());
        }
        Command::Echo { count } => return cmd_echo(&ctrl().await?, *count).await,
        _ => {}
    }

    let link = sdrlink::connect(cli.addr, cli.rx_dsps)
        .await
        .with_context(|| format!("opening device at {}", cli.addr))?;
    let device = &link.device;

    let result = match &cli.command {
        Command::Rx {
            rate,
            nsamps,
            dsp,
            cpu,
            otw,
            args,
        } => cmd_rx(device, *rate, *nsamps, *dsp, *cpu, *otw, args).await,
        Command::Tx {
            rate,
            nsamps,
            ampl,
            args,
        } => cmd_tx(device, *rate, *nsamps, *ampl, args).await,
        Command::Events { duration } => cmd_events(device, *duration).await,
        _ => Ok(()),
    };

    device.shutdown().await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_numbers() {
        assert_eq!(parse_u32("0xD080"), Ok(0xD080));
        assert_eq!(parse_u32("42"), Ok(42));
        assert!(parse_u32("0xZZ").is_err());
    }

    #[test]
    fn cli_parses_rx() {
        let cli = Cli::try_parse_from([
            "sdrlink-test-app",
            "--addr",
            "192.168.10.2",
            "rx",
            "--otw",
            "sc8",
            "--cpu",
            "sc16",
            "--args",
            "spp=100",
        ])
        .unwrap();
        match cli.command {
            Command::Rx { otw, cpu, args, .. } => {
                assert_eq!(otw, OtwFormat::Sc8);
                assert_eq!(cpu, CpuFormat::Sc16);
                assert_eq!(args, "spp=100");
            }
            _ => panic!("expected rx"),
        }
    }

    #[test]
    fn fw_and_short_conflict() {
        assert!(
            Cli::try_parse_from(["sdrlink-test-app", "--addr", "10.0.0.1", "peek", "--fw", "--short", "1"])
                .is_err()
        );
    }
}
