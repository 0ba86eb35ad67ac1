//! Signal ingestion: WAV container bytes → mono [`AudioClip`].
//!
//! # Representation
//!
//! Integer PCM is converted to `f32` without rescaling, so downstream
//! thresholds work in the raw units of the source bit depth:
//!
//! | Source           | Range after decode          |
//! |------------------|-----------------------------|
//! | 8-bit PCM        | `[-128, 127]` (zero-centred) |
//! | 16-bit PCM       | `[-32768, 32767]`           |
//! | 24/32-bit PCM    | native integer magnitude    |
//! | 32-bit IEEE float| passed through              |
//!
//! Non-finite samples are replaced by `0.0` before channels are mixed, and
//! multi-channel audio is averaged down to mono frame by frame.

pub mod clip;
pub mod level;

pub use clip::AudioClip;

use std::io::{Cursor, Read};
use std::path::Path;

use hound::{SampleFormat, WavReader};
use tracing::debug;

use crate::error::{AlertError, Result};
use level::sanitize_sample;

/// Decode an in-memory WAV file.
///
/// # Errors
/// - `AlertError::Decode` for malformed, truncated or non-WAV bytes.
/// - `AlertError::UnsupportedFormat` for a zero sample rate.
/// - `AlertError::EmptyClip` when the container holds no complete frame.
pub fn decode_wav(bytes: &[u8]) -> Result<AudioClip> {
    decode_wav_reader(Cursor::new(bytes))
}

/// Read and decode a WAV file from disk.
///
/// A missing or unreadable path surfaces as `AlertError::Io`.
pub fn read_wav_file(path: &Path) -> Result<AudioClip> {
    let bytes = std::fs::read(path)?;
    decode_wav(&bytes)
}

/// Decode a WAV stream from any reader.
pub fn decode_wav_reader<R: Read>(reader: R) -> Result<AudioClip> {
    let reader = WavReader::new(reader)?;
    let spec = reader.spec();

    if spec.sample_rate == 0 {
        return Err(AlertError::UnsupportedFormat(
            "sample rate is zero".into(),
        ));
    }
    let channels = usize::from(spec.channels);
    if channels == 0 {
        return Err(AlertError::UnsupportedFormat("no channels".into()));
    }

    let interleaved = read_interleaved(reader, spec.sample_format, spec.bits_per_sample)?;
    let samples = mix_to_mono(&interleaved, channels);

    debug!(
        sample_rate = spec.sample_rate,
        channels,
        bits = spec.bits_per_sample,
        frames = samples.len(),
        "decoded wav"
    );

    if samples.is_empty() {
        return Err(AlertError::EmptyClip);
    }

    Ok(AudioClip::new(samples, spec.sample_rate))
}

fn read_interleaved<R: Read>(
    mut reader: WavReader<R>,
    format: SampleFormat,
    bits_per_sample: u16,
) -> Result<Vec<f32>> {
    let samples = match format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .map(|s| s.map(sanitize_sample))
            .collect::<std::result::Result<Vec<_>, _>>()?,
        SampleFormat::Int if bits_per_sample <= 16 => reader
            .samples::<i16>()
            .map(|s| s.map(f32::from))
            .collect::<std::result::Result<Vec<_>, _>>()?,
        SampleFormat::Int => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32))
            .collect::<std::result::Result<Vec<_>, _>>()?,
    };
    Ok(samples)
}

/// Average interleaved channels into one sample per frame. A trailing
/// incomplete frame is dropped.
fn mix_to_mono(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels == 1 {
        return interleaved.iter().copied().map(sanitize_sample).collect();
    }

    interleaved
        .chunks_exact(channels)
        .map(|frame| {
            let sum: f32 = frame.iter().copied().map(sanitize_sample).sum();
            sanitize_sample(sum / channels as f32)
        })
        .collect()
}
