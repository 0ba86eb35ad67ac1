//! Self-calibrating energy VAD with smoothing, onset debounce and hangover.
//!
//! ## Algorithm
//!
//! 1. Compute the window RMS and map it onto the 16-bit full-scale range.
//! 2. Average the last `smoothing_windows` levels.
//! 3. For the first `calibration_windows` windows, record the smoothed level
//!    and report silence. Afterwards the 90th-percentile level becomes the
//!    background noise and fixes the detection threshold for good.
//! 4. A window is active when its smoothed level exceeds the threshold.
//!    `onset_windows` consecutive active windows start speech; speech ends
//!    after `silence_duration_ms` worth of inactive windows.

use std::collections::VecDeque;

use tracing::{debug, trace};

use super::{VadDecision, VoiceActivityDetector};
use crate::audio::level::{normalized_level, safe_rms};

/// Tuning for [`AdaptiveVad`]. `Default` is the production profile.
#[derive(Debug, Clone, PartialEq)]
pub struct VadConfig {
    /// Samples per window.
    pub chunk_size: usize,
    /// Length of the level smoothing buffer.
    pub smoothing_windows: usize,
    /// Windows observed before detection starts.
    pub calibration_windows: usize,
    /// Rank (0..1) of the calibration level taken as background noise.
    pub noise_percentile: f64,
    /// Multiplier applied on top of twice the background noise.
    pub sensitivity: f32,
    /// Lower bound for the detection threshold, in normalized units.
    pub min_threshold: f32,
    /// Consecutive active windows required to start speech.
    pub onset_windows: u32,
    /// Inactive time that ends speech.
    pub silence_duration_ms: u64,
    /// Active time below which an interrupted burst is forgotten.
    pub min_speech_duration_ms: u64,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            chunk_size: 128,
            smoothing_windows: 5,
            calibration_windows: 30,
            noise_percentile: 0.9,
            sensitivity: 1.5,
            min_threshold: 0.015,
            onset_windows: 3,
            silence_duration_ms: 1_500,
            min_speech_duration_ms: 100,
        }
    }
}

/// Window count covering `duration_ms` at the given rate, never below one.
fn frames_for(duration_ms: u64, sample_rate: u32, chunk_size: usize) -> u32 {
    let per_window = (chunk_size.max(1) as u64).saturating_mul(1_000);
    let frames = duration_ms.saturating_mul(u64::from(sample_rate)) / per_window;
    u32::try_from(frames).unwrap_or(u32::MAX).max(1)
}

#[derive(Debug, Clone)]
pub struct AdaptiveVad {
    config: VadConfig,
    sample_rate: u32,
    silence_threshold_frames: u32,
    min_speech_frames: u32,

    calibrating: bool,
    calibration_count: usize,
    noise_levels: Vec<f32>,

    background_noise: f32,
    base_threshold: f32,
    adaptive_threshold: f32,

    levels: VecDeque<f32>,

    is_speaking: bool,
    silence_counter: u32,
    speech_counter: u32,
}

impl AdaptiveVad {
    pub fn new(sample_rate: u32, config: VadConfig) -> Self {
        let mut config = config;
        config.chunk_size = config.chunk_size.max(1);
        config.smoothing_windows = config.smoothing_windows.max(1);
        config.calibration_windows = config.calibration_windows.max(1);

        let silence_threshold_frames =
            frames_for(config.silence_duration_ms, sample_rate, config.chunk_size);
        let min_speech_frames =
            frames_for(config.min_speech_duration_ms, sample_rate, config.chunk_size);

        Self {
            sample_rate,
            silence_threshold_frames,
            min_speech_frames,
            calibrating: true,
            calibration_count: 0,
            noise_levels: Vec::with_capacity(config.calibration_windows),
            background_noise: 0.0,
            base_threshold: config.min_threshold,
            adaptive_threshold: config.min_threshold,
            levels: VecDeque::with_capacity(config.smoothing_windows + 1),
            is_speaking: false,
            silence_counter: 0,
            speech_counter: 0,
            config,
        }
    }

    /// Feed the next window; returns whether speech is active afterwards.
    ///
    /// An empty window returns `false` and leaves the detector untouched.
    pub fn process_window(&mut self, samples: &[f32]) -> bool {
        if samples.is_empty() {
            return false;
        }

        let level = normalized_level(safe_rms(samples));

        self.levels.push_back(level);
        while self.levels.len() > self.config.smoothing_windows {
            self.levels.pop_front();
        }
        let smoothed_level = self.levels.iter().sum::<f32>() / self.levels.len() as f32;

        if self.calibrating {
            self.noise_levels.push(smoothed_level);
            self.calibration_count += 1;
            if self.calibration_count >= self.config.calibration_windows {
                self.finish_calibration();
            }
            return false;
        }

        if smoothed_level > self.adaptive_threshold {
            self.silence_counter = 0;
            self.speech_counter = self.speech_counter.saturating_add(1);
            if !self.is_speaking && self.speech_counter >= self.config.onset_windows {
                self.is_speaking = true;
                trace!(smoothed_level, "speech onset");
            }
        } else {
            if self.speech_counter < self.min_speech_frames {
                self.speech_counter = 0;
            }
            if self.is_speaking {
                self.silence_counter += 1;
                if self.silence_counter >= self.silence_threshold_frames {
                    self.is_speaking = false;
                    self.speech_counter = 0;
                    trace!(silence_frames = self.silence_counter, "speech ended");
                }
            }
        }

        self.is_speaking
    }

    fn finish_calibration(&mut self) {
        self.noise_levels.sort_by(|a, b| a.total_cmp(b));
        let count = self.noise_levels.len();
        let rank = (self.config.noise_percentile * count as f64).floor() as usize;
        let index = rank.min(count.saturating_sub(1));

        self.background_noise = self.noise_levels.get(index).copied().unwrap_or(0.0);
        self.base_threshold = self.config.min_threshold.max(self.background_noise * 2.0);
        self.adaptive_threshold = self
            .base_threshold
            .max(self.background_noise * 2.0 * self.config.sensitivity);
        self.calibrating = false;

        debug!(
            sample_rate = self.sample_rate,
            background_noise = self.background_noise,
            base_threshold = self.base_threshold,
            adaptive_threshold = self.adaptive_threshold,
            "vad calibration complete"
        );
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn config(&self) -> &VadConfig {
        &self.config
    }

    pub fn is_calibrating(&self) -> bool {
        self.calibrating
    }

    pub fn is_speaking(&self) -> bool {
        self.is_speaking
    }

    pub fn calibration_count(&self) -> usize {
        self.calibration_count
    }

    pub fn background_noise(&self) -> f32 {
        self.background_noise
    }

    pub fn base_threshold(&self) -> f32 {
        self.base_threshold
    }

    pub fn adaptive_threshold(&self) -> f32 {
        self.adaptive_threshold
    }

    pub fn speech_counter(&self) -> u32 {
        self.speech_counter
    }

    pub fn silence_counter(&self) -> u32 {
        self.silence_counter
    }

    pub fn silence_threshold_frames(&self) -> u32 {
        self.silence_threshold_frames
    }

    pub fn min_speech_frames(&self) -> u32 {
        self.min_speech_frames
    }
}

impl VoiceActivityDetector for AdaptiveVad {
    fn classify(&mut self, window: &[f32]) -> VadDecision {
        self.process_window(window).into()
    }

    fn window_size(&self) -> usize {
        self.config.chunk_size
    }

    fn warmup_windows(&self) -> usize {
        self.config.calibration_windows
    }
}
