//! Core data types shared by the device and host sides of sdrlink.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Integer tag identifying a logical sample flow.
pub type StreamId = u32;

// ---------------------------------------------------------------------------
// MacAddr
// ---------------------------------------------------------------------------

/// A 48-bit Ethernet link-layer address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    /// The all-ones broadcast address.
    pub const BROADCAST: MacAddr = MacAddr([0xFF; 6]);

    /// Raw address octets.
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

// ---------------------------------------------------------------------------
// TimeSpec
// ---------------------------------------------------------------------------

/// A device time: whole seconds plus a fractional second.
///
/// On the wire a time is carried as an integer-seconds word (TSI) and a
/// tick count (TSF); the tick rate of the device clock converts between the
/// two representations.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TimeSpec {
    /// Whole seconds.
    pub full_secs: i64,
    /// Fractional seconds in `[0.0, 1.0)`.
    pub frac_secs: f64,
}

impl TimeSpec {
    /// Create a time from whole and fractional seconds, normalizing the
    /// fractional part into `[0.0, 1.0)`.
    pub fn new(full_secs: i64, frac_secs: f64) -> Self {
        let carry = frac_secs.floor();
        TimeSpec {
            full_secs: full_secs + carry as i64,
            frac_secs: frac_secs - carry,
        }
    }

    /// Create a time from whole seconds and a tick count at `tick_rate`.
    pub fn from_ticks(full_secs: i64, ticks: u64, tick_rate: f64) -> Self {
        if tick_rate <= 0.0 {
            return TimeSpec::new(full_secs, 0.0);
        }
        TimeSpec::new(full_secs, ticks as f64 / tick_rate)
    }

    /// Fractional part expressed as ticks at `tick_rate`, rounded to the
    /// nearest tick.
    pub fn tick_count(&self, tick_rate: f64) -> u64 {
        (self.frac_secs * tick_rate).round() as u64
    }

    /// Total time in seconds as a float.
    pub fn real_secs(&self) -> f64 {
        self.full_secs as f64 + self.frac_secs
    }
}

// ---------------------------------------------------------------------------
// Complex samples
// ---------------------------------------------------------------------------

/// A complex (IQ) sample.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Complex<T> {
    /// In-phase component.
    pub re: T,
    /// Quadrature component.
    pub im: T,
}

impl<T> Complex<T> {
    /// Create a sample from its I and Q components.
    pub const fn new(re: T, im: T) -> Self {
        Complex { re, im }
    }
}

// ---------------------------------------------------------------------------
// Sample formats
// ---------------------------------------------------------------------------

/// Over-the-wire sample format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OtwFormat {
    /// Complex signed 16-bit, one sample per 32-bit word.
    Sc16,
    /// Complex signed 8-bit, two samples per 32-bit word.
    Sc8,
}

impl OtwFormat {
    /// Bytes occupied by one complex sample on the wire.
    pub fn bytes_per_item(&self) -> usize {
        match self {
            OtwFormat::Sc16 => 4,
            OtwFormat::Sc8 => 2,
        }
    }

    /// Canonical lowercase name (e.g. `"sc16"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            OtwFormat::Sc16 => "sc16",
            OtwFormat::Sc8 => "sc8",
        }
    }
}

impl fmt::Display for OtwFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OtwFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sc16" => Ok(OtwFormat::Sc16),
            "sc8" => Ok(OtwFormat::Sc8),
            other => Err(Error::UnsupportedWireFormat(other.to_string())),
        }
    }
}

/// Host-side (CPU) sample format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CpuFormat {
    /// `Complex<f32>`, normalized to `[-1.0, 1.0]`.
    Fc32,
    /// `Complex<f64>`, normalized to `[-1.0, 1.0]`.
    Fc64,
    /// `Complex<i16>`, raw integer samples.
    Sc16,
}

impl CpuFormat {
    /// Canonical lowercase name (e.g. `"fc32"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            CpuFormat::Fc32 => "fc32",
            CpuFormat::Fc64 => "fc64",
            CpuFormat::Sc16 => "sc16",
        }
    }
}

impl fmt::Display for CpuFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CpuFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fc32" => Ok(CpuFormat::Fc32),
            "fc64" => Ok(CpuFormat::Fc64),
            "sc16" => Ok(CpuFormat::Sc16),
            other => Err(Error::InvalidParameter(format!(
                "unknown cpu format: {other}"
            ))),
        }
    }
}
