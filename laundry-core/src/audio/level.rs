//! Numerically guarded level measurements.
//!
//! Every function here returns a finite value for any input, including empty
//! slices and slices containing NaN or infinities. Callers never need to
//! re-check the result.

/// Largest magnitude of signed 16-bit audio. Used to map raw RMS into an
/// approximately unit range.
pub const I16_FULL_SCALE: f32 = 32_768.0;

/// Replace NaN and ±Inf with silence.
#[inline]
pub fn sanitize_sample(sample: f32) -> f32 {
    if sample.is_finite() {
        sample
    } else {
        0.0
    }
}

/// Root-mean-square of `samples`, or `0.0` when the slice is empty or the
/// computation does not produce a finite number.
///
/// Accumulates in `f64` so 24/32-bit magnitudes over long clips do not
/// overflow the sum.
pub fn safe_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples
        .iter()
        .map(|&s| {
            let s = f64::from(s);
            s * s
        })
        .sum();
    let rms = (sum_sq / samples.len() as f64).sqrt() as f32;
    if rms.is_finite() {
        rms
    } else {
        0.0
    }
}

/// RMS mapped onto the 16-bit full-scale range.
#[inline]
pub fn normalized_level(rms: f32) -> f32 {
    if rms == 0.0 || !rms.is_finite() {
        0.0
    } else {
        rms / I16_FULL_SCALE
    }
}

/// Largest absolute finite sample value.
pub fn peak_abs(samples: &[f32]) -> f32 {
    samples
        .iter()
        .filter(|s| s.is_finite())
        .fold(0.0f32, |peak, s| peak.max(s.abs()))
}

/// Whether any sample's magnitude is strictly above `threshold`.
pub fn exceeds_peak(samples: &[f32], threshold: f32) -> bool {
    samples
        .iter()
        .any(|s| s.is_finite() && s.abs() > threshold)
}
