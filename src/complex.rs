//! Complex sample formats carried by the capture stream.

use byte_slice_cast::AsByteSlice;
use num_complex::Complex;

/// Narrow sample as delivered by integer front-ends.
pub type ComplexI16 = Complex<i16>;
/// Wide sample for front-ends that stream floats.
pub type ComplexF32 = Complex<f32>;

/// Period of the ramp pattern written by the synthetic producer.
pub const RAMP_PERIOD: u64 = 1000;

/// Scalar width of one complex sample on the wire, fixed for the lifetime
/// of a capture run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleFormat {
    /// Two adjacent `i16` components, 4 bytes per sample.
    Ci16,
    /// Two adjacent `f32` components, 8 bytes per sample.
    Cf32,
}

impl SampleFormat {
    pub const fn bytes_per_sample(self) -> u32 {
        match self {
            SampleFormat::Ci16 => 4,
            SampleFormat::Cf32 => 8,
        }
    }

    /// Look a format up by its wire width; unsupported widths get `None`.
    pub fn from_bytes_per_sample(bytes: u32) -> Option<Self> {
        match bytes {
            4 => Some(SampleFormat::Ci16),
            8 => Some(SampleFormat::Cf32),
            _ => None,
        }
    }
}

/// Fill `dst` with interleaved re/im scalars of a wrapping ramp starting
/// at `count`, returning the updated counter. Both components of a sample
/// carry the ramp value, so continuity can be checked on either one.
/// Scalars land in native byte order, as a streaming front-end would
/// deliver them.
pub fn fill_ramp(dst: &mut [u8], format: SampleFormat, mut count: u64) -> u64 {
    match format {
        SampleFormat::Ci16 => {
            let mut scalars: Vec<i16> = Vec::with_capacity(dst.len() / 2);
            for _ in 0..dst.len() / 4 {
                let v = (count % RAMP_PERIOD) as i16;
                let sample = ComplexI16::new(v, v);
                scalars.push(sample.re);
                scalars.push(sample.im);
                count += 1;
            }
            dst.copy_from_slice(scalars.as_byte_slice());
        }
        SampleFormat::Cf32 => {
            let mut scalars: Vec<f32> = Vec::with_capacity(dst.len() / 4);
            for _ in 0..dst.len() / 8 {
                let v = (count % RAMP_PERIOD) as f32;
                let sample = ComplexF32::new(v, v);
                scalars.push(sample.re);
                scalars.push(sample.im);
                count += 1;
            }
            dst.copy_from_slice(scalars.as_byte_slice());
        }
    }
    count
}

/// Decode the ramp counter back out of each sample's real component.
pub fn ramp_values(bytes: &[u8], format: SampleFormat) -> Vec<u64> {
    let step = format.bytes_per_sample() as usize;
    bytes
        .chunks_exact(step)
        .map(|s| match format {
            SampleFormat::Ci16 => {
                let sample = ComplexI16::new(
                    i16::from_ne_bytes([s[0], s[1]]),
                    i16::from_ne_bytes([s[2], s[3]]),
                );
                sample.re as u64
            }
            SampleFormat::Cf32 => {
                let sample = ComplexF32::new(
                    f32::from_ne_bytes([s[0], s[1], s[2], s[3]]),
                    f32::from_ne_bytes([s[4], s[5], s[6], s[7]]),
                );
                sample.re as u64
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widths_round_trip() {
        for format in [SampleFormat::Ci16, SampleFormat::Cf32] {
            assert_eq!(
                SampleFormat::from_bytes_per_sample(format.bytes_per_sample()),
                Some(format)
            );
        }
        assert_eq!(SampleFormat::from_bytes_per_sample(3), None);
    }

    #[test]
    fn ramp_survives_both_formats() {
        for format in [SampleFormat::Ci16, SampleFormat::Cf32] {
            let mut buf = vec![0u8; 16 * format.bytes_per_sample() as usize];
            let next = fill_ramp(&mut buf, format, RAMP_PERIOD - 4);
            assert_eq!(next, RAMP_PERIOD + 12);
            let values = ramp_values(&buf, format);
            assert_eq!(&values[..4], &[996, 997, 998, 999]);
            // counter wraps back to zero mid-burst
            assert_eq!(&values[4..8], &[0, 1, 2, 3]);
        }
    }
}
