//! Voice Activity Detection (VAD) abstraction.
//!
//! The `VoiceActivityDetector` trait is the seam the classifier drives:
//! `AdaptiveVad` is the production detector, tests substitute scripted ones.
//! Detectors are single-use: one instance per clip, dropped afterwards.

pub mod adaptive;

pub use adaptive::{AdaptiveVad, VadConfig};

/// Whether speech is active after a given window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadDecision {
    /// Sustained speech-like energy is present (including the hangover period).
    Speech,
    /// No speech, or the detector is still calibrating.
    Silence,
}

impl VadDecision {
    pub fn is_speech(self) -> bool {
        self == VadDecision::Speech
    }
}

impl From<bool> for VadDecision {
    fn from(speaking: bool) -> Self {
        if speaking {
            VadDecision::Speech
        } else {
            VadDecision::Silence
        }
    }
}

/// Trait for all VAD implementations.
///
/// Implementors are stateful: windows must be fed in clip order.
pub trait VoiceActivityDetector: Send {
    /// Analyse one window and return the decision after it.
    fn classify(&mut self, window: &[f32]) -> VadDecision;

    /// Number of samples per window this detector expects.
    fn window_size(&self) -> usize;

    /// Leading windows consumed before the detector can report speech.
    fn warmup_windows(&self) -> usize {
        0
    }
}
