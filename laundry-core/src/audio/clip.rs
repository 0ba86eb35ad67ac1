//! Decoded mono clip handed from ingestion to the classifier.

/// A contiguous block of mono samples at a known sample rate.
///
/// Samples keep the magnitude of their source bit depth (16-bit PCM stays in
/// roughly `[-32768, 32767]`) and are always finite.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    pub samples: Vec<f32>,
    /// Sample rate in Hz (e.g. 16000, 44100, 48000).
    pub sample_rate: u32,
}

impl AudioClip {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Returns the duration of this clip in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Consecutive full windows of `size` samples. A trailing partial window
    /// is not yielded.
    pub fn windows(&self, size: usize) -> std::slice::ChunksExact<'_, f32> {
        self.samples.chunks_exact(size.max(1))
    }
}
