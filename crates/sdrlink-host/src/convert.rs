//! Sample conversion between wire items and host samples.
//!
//! Wire items are packed into little-endian 32-bit words:
//!
//! ```text
//! sc16   one item per word     I[31:16] Q[15:0]
//! sc8    two items per word    item0 in [15:0], item1 in [31:16], each I[15:8] Q[7:0]
//! ```
//!
//! Float host samples are normalized against the wire full scale and
//! multiplied by the streamer's scale factor.

use sdrlink_core::{Complex, CpuFormat, OtwFormat};

const SC16_FULL_SCALE: f64 = 32767.0;
const SC8_FULL_SCALE: f64 = 127.0;

/// A host sample type a streamer can fill or drain.
pub trait Sample: Copy + Default + Send + Sync + 'static {
    /// The matching CPU format tag.
    const FORMAT: CpuFormat;

    /// Build a sample from a raw wire item of format `otw`.
    fn from_wire(i: i16, q: i16, otw: OtwFormat, scale: f64) -> Self;

    /// Produce a 16-bit wire item.
    fn to_sc16(self, scale: f64) -> (i16, i16);
}

fn saturate(x: f64) -> i16 {
    x.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16
}

impl Sample for Complex<f32> {
    const FORMAT: CpuFormat = CpuFormat::Fc32;

    fn from_wire(i: i16, q: i16, otw: OtwFormat, scale: f64) -> Self {
        let k = scale / full_scale(otw);
        Complex::new((i as f64 * k) as f32, (q as f64 * k) as f32)
    }

    fn to_sc16(self, scale: f64) -> (i16, i16) {
        let k = SC16_FULL_SCALE * scale;
        (saturate(self.re as f64 * k), saturate(self.im as f64 * k))
    }
}

impl Sample for Complex<f64> {
    const FORMAT: CpuFormat = CpuFormat::Fc64;

    fn from_wire(i: i16, q: i16, otw: OtwFormat, scale: f64) -> Self {
        let k = scale / full_scale(otw);
        Complex::new(i as f64 * k, q as f64 * k)
    }

    fn to_sc16(self, scale: f64) -> (i16, i16) {
        let k = SC16_FULL_SCALE * scale;
        (saturate(self.re * k), saturate(self.im * k))
    }
}

impl Sample for Complex<i16> {
    const FORMAT: CpuFormat = CpuFormat::Sc16;

    // Integer samples are passed through; 8-bit items are widened to
    // 16-bit full scale.
    fn from_wire(i: i16, q: i16, otw: OtwFormat, _scale: f64) -> Self {
        match otw {
            OtwFormat::Sc16 => Complex::new(i, q),
            OtwFormat::Sc8 => Complex::new(i << 8, q << 8),
        }
    }

    fn to_sc16(self, _scale: f64) -> (i16, i16) {
        (self.re, self.im)
    }
}

/// Full-scale magnitude of a wire format.
pub fn full_scale(otw: OtwFormat) -> f64 {
    match otw {
        OtwFormat::Sc16 => SC16_FULL_SCALE,
        OtwFormat::Sc8 => SC8_FULL_SCALE,
    }
}

/// Number of items in a payload of `payload_len` bytes.
pub fn items_in(otw: OtwFormat, payload_len: usize) -> usize {
    payload_len / otw.bytes_per_item()
}

fn word(payload: &[u8], index: usize) -> u32 {
    u32::from_le_bytes([
        payload[index * 4],
        payload[index * 4 + 1],
        payload[index * 4 + 2],
        payload[index * 4 + 3],
    ])
}

/// Raw I/Q of wire item `index`.
fn item(otw: OtwFormat, payload: &[u8], index: usize) -> (i16, i16) {
    match otw {
        OtwFormat::Sc16 => {
            let w = word(payload, index);
            ((w >> 16) as u16 as i16, w as u16 as i16)
        }
        OtwFormat::Sc8 => {
            let w = word(payload, index / 2);
            let half = if index % 2 == 0 { w as u16 } else { (w >> 16) as u16 };
            ((half >> 8) as u8 as i8 as i16, half as u8 as i8 as i16)
        }
    }
}

/// Convert wire items starting at `first` into `out`.
///
/// Converts as many items as fit in `out` or remain in `payload`, and
/// returns the count.
pub fn wire_to_host<T: Sample>(
    otw: OtwFormat,
    payload: &[u8],
    first: usize,
    out: &mut [T],
    scale: f64,
) -> usize {
    let available = items_in(otw, payload.len()).saturating_sub(first);
    let n = available.min(out.len());
    for (k, slot) in out[..n].iter_mut().enumerate() {
        let (i, q) = item(otw, payload, first + k);
        *slot = T::from_wire(i, q, otw, scale);
    }
    n
}

/// Convert host samples into sc16 wire words appended to `out`.
pub fn host_to_sc16<T: Sample>(samples: &[T], out: &mut Vec<u8>, scale: f64) {
    out.reserve(samples.len() * 4);
    for s in samples {
        let (i, q) = s.to_sc16(scale);
        let w = (i as u16 as u32) << 16 | q as u16 as u32;
        out.extend_from_slice(&w.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sc16_word(i: i16, q: i16) -> [u8; 4] {
        ((i as u16 as u32) << 16 | q as u16 as u32).to_le_bytes()
    }

    #[test]
    fn sc16_to_fc32() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&sc16_word(32767, -32767));
        payload.extend_from_slice(&sc16_word(0, 16384));

        let mut out = [Complex::<f32>::default(); 4];
        let n = wire_to_host(OtwFormat::Sc16, &payload, 0, &mut out, 1.0);
        assert_eq!(n, 2);
        assert!((out[0].re - 1.0).abs() < 1e-6);
        assert!((out[0].im + 1.0).abs() < 1e-6);
        assert!((out[1].im - 0.5).abs() < 1e-3);
    }

    #[test]
    fn scale_factor_applies_to_floats() {
        let payload = sc16_word(32767, 0);
        let mut out = [Complex::<f64>::default(); 1];
        wire_to_host(OtwFormat::Sc16, &payload, 0, &mut out, 0.5);
        assert!((out[0].re - 0.5).abs() < 1e-9);
    }

    #[test]
    fn sc16_passthrough_and_offset() {
        let mut payload = Vec::new();
        for k in 0..3i16 {
            payload.extend_from_slice(&sc16_word(k, -k));
        }
        let mut out = [Complex::<i16>::default(); 8];
        let n = wire_to_host(OtwFormat::Sc16, &payload, 1, &mut out, 3.0);
        assert_eq!(n, 2);
        assert_eq!(out[0], Complex::new(1, -1));
        assert_eq!(out[1], Complex::new(2, -2));
    }

    #[test]
    fn sc8_two_items_per_word() {
        // item0 = (I=1, Q=-1), item1 = (I=-128, Q=127)
        let item0 = (1u8 as u16) << 8 | (-1i8 as u8 as u16);
        let item1 = ((-128i8) as u8 as u16) << 8 | 127u8 as u16;
        let w = (item1 as u32) << 16 | item0 as u32;
        let payload = w.to_le_bytes();

        let mut out = [Complex::<i16>::default(); 2];
        assert_eq!(wire_to_host(OtwFormat::Sc8, &payload, 0, &mut out, 1.0), 2);
        assert_eq!(out[0], Complex::new(1 << 8, -1 << 8));
        assert_eq!(out[1], Complex::new(-128 << 8, 127 << 8));

        let mut f = [Complex::<f32>::default(); 2];
        wire_to_host(OtwFormat::Sc8, &payload, 0, &mut f, 1.0);
        assert!((f[1].im - 1.0).abs() < 1e-6);
    }

    #[test]
    fn integer_widening_follows_wire_format() {
        assert_eq!(
            Complex::<i16>::from_wire(127, -1, OtwFormat::Sc16, 1.0),
            Complex::new(127, -1)
        );
        assert_eq!(
            Complex::<i16>::from_wire(127, -1, OtwFormat::Sc8, 1.0),
            Complex::new(127 << 8, -1 << 8)
        );
        let f = Complex::<f64>::from_wire(127, 0, OtwFormat::Sc8, 1.0);
        assert!((f.re - 1.0).abs() < 1e-9);
    }

    #[test]
    fn host_to_sc16_saturates() {
        let samples = [Complex::new(2.0f32, -2.0), Complex::new(0.5, 0.0)];
        let mut out = Vec::new();
        host_to_sc16(&samples, &mut out, 1.0);
        assert_eq!(out.len(), 8);
        assert_eq!(&out[..4], &sc16_word(i16::MAX, i16::MIN));
        assert_eq!(&out[4..], &sc16_word(16384, 0));
    }

    #[test]
    fn items_per_payload() {
        assert_eq!(items_in(OtwFormat::Sc16, 2024), 506);
        assert_eq!(items_in(OtwFormat::Sc8, 2024), 1012);
    }
}
