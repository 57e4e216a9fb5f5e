//! Proxies for the device's receive and transmit DSP chains.
//!
//! Each proxy owns nothing but a lane index and a [`RegisterIface`]; every
//! operation is a short sequence of register pokes. The stream command
//! sequence is order-sensitive: the command word and the seconds register
//! are staged, and the write to the ticks register latches all three.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use sdrlink_core::error::{Error, Result};
use sdrlink_core::transport::RegisterIface;
use sdrlink_core::{OtwFormat, TimeSpec};
use sdrlink_wire::regs::{
    self, RX_CTRL_CLEAR, RX_CTRL_CMD, RX_CTRL_FORMAT, RX_CTRL_NSAMPS_PER_PKT, RX_CTRL_TIME_SECS,
    RX_CTRL_TIME_TICKS, RX_CTRL_VRT_SID, RX_DSP_DECIM, RX_FORMAT_SC8, RX_FORMAT_SCALAR_MASK,
    TX_CTRL_CLEAR_STATE, TX_CTRL_POLICY, TX_CTRL_REPORT_SID, TX_DSP_INTERP,
    TX_POLICY_NEXT_BURST, TX_POLICY_NEXT_PACKET,
};

use crate::atomic::AtomicF64;

/// Largest sample count a stream command can carry.
pub const MAX_STREAM_CMD_SAMPS: u32 = 0x0FFF_FFFF;

/// Largest decimation or interpolation factor the DSP accepts.
const MAX_RATE_FACTOR: u32 = 0xFF;

/// What a stream command asks the receive DSP to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    /// Stream until told to stop.
    StartContinuous,
    /// Stop a continuous stream.
    StopContinuous,
    /// Deliver `num_samps` samples and end the burst.
    NumSampsAndDone,
    /// Deliver `num_samps` samples and expect another command.
    NumSampsAndMore,
}

/// A receive stream command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamCmd {
    pub mode: StreamMode,
    pub num_samps: u32,
    /// Execute on receipt rather than at `time_spec`.
    pub stream_now: bool,
    pub time_spec: TimeSpec,
}

impl StreamCmd {
    /// A command to execute immediately.
    pub fn now(mode: StreamMode) -> Self {
        StreamCmd {
            mode,
            num_samps: 0,
            stream_now: true,
            time_spec: TimeSpec::default(),
        }
    }

    /// The command word: `reload<<31 | chain<<30 | samps<<29 | now<<28 | nsamps`.
    pub fn command_word(&self) -> Result<u32> {
        if self.num_samps > MAX_STREAM_CMD_SAMPS {
            return Err(Error::InvalidParameter(format!(
                "stream command of {} samples exceeds maximum {}",
                self.num_samps, MAX_STREAM_CMD_SAMPS
            )));
        }
        let (reload, chain, samps) = match self.mode {
            StreamMode::StartContinuous => (true, true, false),
            StreamMode::StopContinuous => (false, false, false),
            StreamMode::NumSampsAndDone => (false, false, true),
            StreamMode::NumSampsAndMore => (false, true, true),
        };
        Ok((reload as u32) << 31
            | (chain as u32) << 30
            | (samps as u32) << 29
            | (self.stream_now as u32) << 28
            | self.num_samps)
    }
}

/// Something that reacts to a receive overflow.
#[async_trait]
pub trait OverflowHandler: Send + Sync {
    async fn handle_overflow(&self);
}

/// CIC gain correction for a decimation factor.
fn cic_scaling_adjustment(decim: u32) -> f64 {
    let rate_pow = f64::from(decim & MAX_RATE_FACTOR).powi(4);
    if rate_pow <= 0.0 {
        return 1.0;
    }
    2f64.powf(rate_pow.log2().ceil()) / (1.65 * rate_pow)
}

fn rate_factor(tick_rate: f64, rate: f64) -> Result<u32> {
    if rate.is_nan() || rate <= 0.0 || tick_rate.is_nan() || tick_rate <= 0.0 {
        return Err(Error::InvalidParameter(format!(
            "rate {rate} with tick rate {tick_rate}"
        )));
    }
    Ok(((tick_rate / rate).round() as u32).clamp(1, MAX_RATE_FACTOR))
}

// ---------------------------------------------------------------------------
// Receive DSP
// ---------------------------------------------------------------------------

/// Proxy for one receive DSP lane.
pub struct RxDsp {
    iface: Arc<dyn RegisterIface>,
    lane: usize,
    tick_rate: Arc<AtomicF64>,
    continuous: AtomicBool,
    scaling_adjustment: AtomicF64,
}

impl RxDsp {
    /// Proxy for `lane`, timing commands against the shared `tick_rate`.
    pub fn new(iface: Arc<dyn RegisterIface>, lane: usize, tick_rate: Arc<AtomicF64>) -> Result<Self> {
        if lane >= regs::NUM_RX_LANES {
            return Err(Error::InvalidParameter(format!("no receive DSP {lane}")));
        }
        Ok(RxDsp {
            iface,
            lane,
            tick_rate,
            continuous: AtomicBool::new(false),
            scaling_adjustment: AtomicF64::new(1.0),
        })
    }

    /// The lane index.
    pub fn lane(&self) -> usize {
        self.lane
    }

    fn ctrl(&self, offset: u32) -> u32 {
        // Lane validated in `new`.
        regs::rx_ctrl_addr(self.lane, offset).unwrap_or_default()
    }

    fn dsp(&self, offset: u32) -> u32 {
        regs::rx_dsp_addr(self.lane, offset).unwrap_or_default()
    }

    /// Set the stream id stamped on this lane's packets.
    pub async fn set_stream_id(&self, sid: u32) -> Result<()> {
        self.iface.poke32(self.ctrl(RX_CTRL_VRT_SID), sid).await
    }

    pub async fn set_nsamps_per_packet(&self, nsamps: usize) -> Result<()> {
        self.iface
            .poke32(self.ctrl(RX_CTRL_NSAMPS_PER_PKT), nsamps as u32)
            .await
    }

    /// Reset the framer state machine.
    pub async fn clear(&self) -> Result<()> {
        self.iface.poke32(self.ctrl(RX_CTRL_CLEAR), 1).await
    }

    /// Select the wire format. `scalar` scales samples before they are
    /// truncated to 8 bits and is ignored by the 16-bit format.
    pub async fn set_format(&self, otw: OtwFormat, scalar: u32) -> Result<()> {
        let format = match otw {
            OtwFormat::Sc16 => 0,
            OtwFormat::Sc8 => RX_FORMAT_SC8,
        };
        self.iface
            .poke32(self.ctrl(RX_CTRL_FORMAT), format | (scalar & RX_FORMAT_SCALAR_MASK))
            .await
    }

    /// Program the decimation for `rate` samples/s and return the rate
    /// actually achieved.
    pub async fn set_host_rate(&self, rate: f64) -> Result<f64> {
        let tick_rate = self.tick_rate.load();
        let decim = rate_factor(tick_rate, rate)?;
        self.iface.poke32(self.dsp(RX_DSP_DECIM), decim).await?;
        self.scaling_adjustment.store(cic_scaling_adjustment(decim));
        let actual = tick_rate / f64::from(decim);
        tracing::debug!(lane = self.lane, requested = rate, actual, decim, "Rx DSP rate");
        Ok(actual)
    }

    /// Gain correction the host applies to converted samples.
    pub fn scaling_adjustment(&self) -> f64 {
        self.scaling_adjustment.load()
    }

    /// Issue a stream command. The ticks write latches it.
    pub async fn issue_stream_cmd(&self, cmd: &StreamCmd) -> Result<()> {
        let word = cmd.command_word()?;
        let tick_rate = self.tick_rate.load();
        self.continuous
            .store(cmd.mode == StreamMode::StartContinuous, Ordering::Relaxed);

        tracing::debug!(
            lane = self.lane,
            mode = ?cmd.mode,
            num_samps = cmd.num_samps,
            now = cmd.stream_now,
            "Rx stream command"
        );
        self.iface.poke32(self.ctrl(RX_CTRL_CMD), word).await?;
        self.iface
            .poke32(self.ctrl(RX_CTRL_TIME_SECS), cmd.time_spec.full_secs as u32)
            .await?;
        self.iface
            .poke32(
                self.ctrl(RX_CTRL_TIME_TICKS),
                cmd.time_spec.tick_count(tick_rate) as u32,
            )
            .await
    }

    /// True after a continuous start until the next other command.
    pub fn is_continuous(&self) -> bool {
        self.continuous.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl OverflowHandler for RxDsp {
    /// The device stops streaming on overflow. A continuous stream is
    /// restarted immediately.
    async fn handle_overflow(&self) {
        if !self.is_continuous() {
            return;
        }
        tracing::debug!(lane = self.lane, "Restarting continuous stream after overflow");
        if let Err(e) = self
            .issue_stream_cmd(&StreamCmd::now(StreamMode::StartContinuous))
            .await
        {
            tracing::warn!(lane = self.lane, error = %e, "Overflow restart failed");
        }
    }
}

// ---------------------------------------------------------------------------
// Transmit DSP
// ---------------------------------------------------------------------------

/// Proxy for the transmit DSP.
pub struct TxDsp {
    iface: Arc<dyn RegisterIface>,
    tick_rate: Arc<AtomicF64>,
}

impl TxDsp {
    pub fn new(iface: Arc<dyn RegisterIface>, tick_rate: Arc<AtomicF64>) -> Self {
        TxDsp { iface, tick_rate }
    }

    /// Reset the deframer state machine.
    pub async fn clear(&self) -> Result<()> {
        self.iface.poke32(regs::tx_ctrl_addr(TX_CTRL_CLEAR_STATE), 1).await
    }

    /// Set the stream id async reports are sent on.
    pub async fn set_report_sid(&self, sid: u32) -> Result<()> {
        self.iface.poke32(regs::tx_ctrl_addr(TX_CTRL_REPORT_SID), sid).await
    }

    /// Set the underflow policy: `"next_packet"` or `"next_burst"`.
    pub async fn set_underflow_policy(&self, policy: &str) -> Result<()> {
        let value = match policy {
            "next_packet" => TX_POLICY_NEXT_PACKET,
            "next_burst" => TX_POLICY_NEXT_BURST,
            other => {
                return Err(Error::InvalidParameter(format!(
                    "unknown underflow policy: {other}"
                )));
            }
        };
        self.iface.poke32(regs::tx_ctrl_addr(TX_CTRL_POLICY), value).await
    }

    /// Program the interpolation for `rate` samples/s and return the rate
    /// actually achieved.
    pub async fn set_host_rate(&self, rate: f64) -> Result<f64> {
        let tick_rate = self.tick_rate.load();
        let interp = rate_factor(tick_rate, rate)?;
        self.iface.poke32(regs::tx_dsp_addr(TX_DSP_INTERP), interp).await?;
        Ok(tick_rate / f64::from(interp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdrlink_test_harness::MockRegisterIface;

    fn rx(lane: usize) -> (Arc<MockRegisterIface>, RxDsp) {
        let regs = Arc::new(MockRegisterIface::new());
        let dsp = RxDsp::new(regs.clone(), lane, Arc::new(AtomicF64::new(100e6))).unwrap();
        (regs, dsp)
    }

    #[test]
    fn command_words() {
        let cont = StreamCmd::now(StreamMode::StartContinuous);
        assert_eq!(cont.command_word().unwrap(), 0xD000_0000);

        let stop = StreamCmd::now(StreamMode::StopContinuous);
        assert_eq!(stop.command_word().unwrap(), 0x1000_0000);

        let mut done = StreamCmd::now(StreamMode::NumSampsAndDone);
        done.num_samps = 1000;
        done.stream_now = false;
        assert_eq!(done.command_word().unwrap(), 0x2000_0000 | 1000);

        let mut more = StreamCmd::now(StreamMode::NumSampsAndMore);
        more.num_samps = MAX_STREAM_CMD_SAMPS + 1;
        assert!(more.command_word().is_err());
    }

    #[tokio::test]
    async fn stream_cmd_latches_on_ticks() {
        let (regs, dsp) = rx(1);
        let cmd = StreamCmd {
            mode: StreamMode::NumSampsAndDone,
            num_samps: 10,
            stream_now: false,
            time_spec: TimeSpec::new(5, 0.25),
        };
        dsp.issue_stream_cmd(&cmd).await.unwrap();

        let addr = |off| regs::rx_ctrl_addr(1, off).unwrap();
        assert_eq!(
            regs.pokes(),
            vec![
                (addr(RX_CTRL_CMD), 0x2000_000A),
                (addr(RX_CTRL_TIME_SECS), 5),
                (addr(RX_CTRL_TIME_TICKS), 25_000_000),
            ]
        );
    }

    #[tokio::test]
    async fn overflow_restarts_only_continuous() {
        let (regs, dsp) = rx(0);
        dsp.handle_overflow().await;
        assert!(regs.pokes().is_empty());

        dsp.issue_stream_cmd(&StreamCmd::now(StreamMode::StartContinuous))
            .await
            .unwrap();
        regs.clear_log();
        dsp.handle_overflow().await;
        let cmd = regs::rx_ctrl_addr(0, RX_CTRL_CMD).unwrap();
        assert_eq!(regs.pokes_to(cmd), vec![0xD000_0000]);
    }

    #[tokio::test]
    async fn format_word() {
        let (regs, dsp) = rx(0);
        dsp.set_format(OtwFormat::Sc8, 0x400).await.unwrap();
        dsp.set_format(OtwFormat::Sc16, 0x400).await.unwrap();
        let addr = regs::rx_ctrl_addr(0, RX_CTRL_FORMAT).unwrap();
        assert_eq!(regs.pokes_to(addr), vec![RX_FORMAT_SC8 | 0x400, 0x400]);
    }

    #[tokio::test]
    async fn host_rate_sets_decimation() {
        let (regs, dsp) = rx(0);
        let actual = dsp.set_host_rate(1e6).await.unwrap();
        assert!((actual - 100e6 / 100.0).abs() < 1e-6);
        assert_eq!(regs.value(regs::rx_dsp_addr(0, RX_DSP_DECIM).unwrap()), 100);
        assert!(dsp.scaling_adjustment() > 0.0);
        assert!(dsp.set_host_rate(0.0).await.is_err());
    }

    #[test]
    fn unknown_lane_rejected() {
        let regs = Arc::new(MockRegisterIface::new());
        assert!(RxDsp::new(regs, 4, Arc::new(AtomicF64::new(1.0))).is_err());
    }

    #[tokio::test]
    async fn underflow_policy() {
        let regs = Arc::new(MockRegisterIface::new());
        let tx = TxDsp::new(regs.clone(), Arc::new(AtomicF64::new(100e6)));
        tx.set_underflow_policy("next_burst").await.unwrap();
        assert_eq!(
            regs.value(regs::tx_ctrl_addr(TX_CTRL_POLICY)),
            TX_POLICY_NEXT_BURST
        );
        assert!(tx.set_underflow_policy("sometimes").await.is_err());
    }
}
