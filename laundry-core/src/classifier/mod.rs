//! `ClipClassifier`: whole-clip classification entry point.
//!
//! ## Flow
//!
//! ```text
//! WAV bytes ─► decode_wav ─► AudioClip
//!                               │
//!                     RMS > sound_threshold ? ──no──► neutral (has_sound = false)
//!                               │ yes
//!             speech pass (fresh AdaptiveVad) + clapping pass
//!                               │
//!                      ClassificationResult
//! ```
//!
//! `classify` never fails: decode errors, empty clips and unreadable files
//! all produce [`ClassificationResult::NEUTRAL`] and a warning in the log.
//! Callers that need the underlying error use [`ClipClassifier::analyze`].

pub mod passes;

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    audio::{
        decode_wav,
        level::{peak_abs, safe_rms},
        AudioClip,
    },
    error::Result,
    events::ClassificationResult,
    vad::{AdaptiveVad, VadConfig, VoiceActivityDetector},
};
use passes::{detect_clapping, run_speech_pass};

/// Whole-clip RMS (raw sample units) above which a clip counts as sound.
pub const SOUND_THRESHOLD: f32 = 100.0;

/// Absolute sample value above which a clip counts as clapping/knocking.
pub const PEAK_THRESHOLD: f32 = 20_000.0;

pub const SPEECH_CONFIDENCE: f32 = 0.8;
pub const CLAP_CONFIDENCE: f32 = 0.9;

/// How speech and clapping detections combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventPolicy {
    /// Run both passes; the higher confidence wins.
    #[default]
    Combined,
    /// A detected clap skips the speech pass entirely.
    ClapFirst,
}

impl FromStr for EventPolicy {
    type Err = String;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "combined" => Ok(EventPolicy::Combined),
            "clap_first" | "exclusive" => Ok(EventPolicy::ClapFirst),
            other => Err(format!("unknown event policy: {other}")),
        }
    }
}

impl std::fmt::Display for EventPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventPolicy::Combined => f.write_str("combined"),
            EventPolicy::ClapFirst => f.write_str("clap_first"),
        }
    }
}

/// Configuration for `ClipClassifier`.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierConfig {
    /// Whole-clip RMS gate. Default: 100.0.
    pub sound_threshold: f32,
    /// Clapping peak gate. Default: 20000.0.
    pub peak_threshold: f32,
    /// Confidence reported for speech. Default: 0.8.
    pub speech_confidence: f32,
    /// Confidence reported for clapping. Default: 0.9.
    pub clap_confidence: f32,
    pub policy: EventPolicy,
    /// Detector tuning; a fresh detector is built from this per clip.
    pub vad: VadConfig,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            sound_threshold: SOUND_THRESHOLD,
            peak_threshold: PEAK_THRESHOLD,
            speech_confidence: SPEECH_CONFIDENCE,
            clap_confidence: CLAP_CONFIDENCE,
            policy: EventPolicy::Combined,
            vad: VadConfig::default(),
        }
    }
}

/// Per-clip measurements, reported alongside the result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ClipStats {
    pub sample_rate: u32,
    pub frames: usize,
    pub duration_secs: f64,
    pub rms: f32,
    pub peak: f32,
    pub vad_windows: usize,
    pub vad_active_windows: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClipAnalysis {
    pub result: ClassificationResult,
    pub stats: ClipStats,
}

/// Stateless classifier; safe to share across threads; each call builds
/// its own detector.
#[derive(Debug, Clone, Default)]
pub struct ClipClassifier {
    config: ClassifierConfig,
}

impl ClipClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Classify WAV bytes. Any failure yields the neutral result.
    pub fn classify(&self, bytes: &[u8]) -> ClassificationResult {
        match self.analyze(bytes) {
            Ok(analysis) => analysis.result,
            Err(e) => {
                warn!(error = %e, "classification failed; reporting neutral result");
                ClassificationResult::NEUTRAL
            }
        }
    }

    /// Classify a WAV file on disk. A missing or unreadable path yields the
    /// neutral result.
    pub fn classify_file(&self, path: &Path) -> ClassificationResult {
        match std::fs::read(path) {
            Ok(bytes) => self.classify(&bytes),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not read clip; reporting neutral result");
                ClassificationResult::NEUTRAL
            }
        }
    }

    /// Decode and analyse, surfacing decode errors to the caller.
    pub fn analyze(&self, bytes: &[u8]) -> Result<ClipAnalysis> {
        let clip = decode_wav(bytes)?;
        Ok(self.analyze_clip(&clip))
    }

    /// Analyse an already-decoded clip with a fresh `AdaptiveVad`.
    pub fn analyze_clip(&self, clip: &AudioClip) -> ClipAnalysis {
        let mut vad = AdaptiveVad::new(clip.sample_rate, self.config.vad.clone());
        self.analyze_with(clip, &mut vad)
    }

    /// Analyse a clip using the supplied detector. The detector must be
    /// fresh; its state is consumed by this clip.
    pub fn analyze_with<V>(&self, clip: &AudioClip, vad: &mut V) -> ClipAnalysis
    where
        V: VoiceActivityDetector + ?Sized,
    {
        let rms = safe_rms(&clip.samples);
        let mut stats = ClipStats {
            sample_rate: clip.sample_rate,
            frames: clip.len(),
            duration_secs: clip.duration_secs(),
            rms,
            peak: peak_abs(&clip.samples),
            ..ClipStats::default()
        };

        if rms <= self.config.sound_threshold {
            debug!(rms, threshold = self.config.sound_threshold, "clip below sound threshold");
            return ClipAnalysis {
                result: ClassificationResult::NEUTRAL,
                stats,
            };
        }

        let mut result = ClassificationResult {
            has_sound: true,
            ..ClassificationResult::NEUTRAL
        };

        let clapping = detect_clapping(&clip.samples, self.config.peak_threshold);
        let skip_speech = clapping && self.config.policy == EventPolicy::ClapFirst;

        if !skip_speech {
            let speech = run_speech_pass(vad, clip);
            stats.vad_windows = speech.windows;
            stats.vad_active_windows = speech.active_windows;
            if speech.detected() {
                result.is_speech = true;
                result.is_voice = true;
                result.confidence = self.config.speech_confidence;
            }
        }

        if clapping {
            result.is_clapping = true;
            result.confidence = result.confidence.max(self.config.clap_confidence);
        }

        debug!(
            rms,
            peak = stats.peak,
            windows = stats.vad_windows,
            active_windows = stats.vad_active_windows,
            is_speech = result.is_speech,
            is_clapping = result.is_clapping,
            confidence = result.confidence,
            "clip classified"
        );

        ClipAnalysis { result, stats }
    }
}
