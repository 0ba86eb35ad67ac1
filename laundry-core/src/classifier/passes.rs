//! Analysis passes run over a decoded clip.
//!
//! ```text
//! clip ──► whole-clip RMS ──► has_sound?
//!                                │ yes
//!                ┌───────────────┴───────────────┐
//!          speech pass                      clapping pass
//!   (windowed, stateful VAD)          (sample-wise peak scan)
//! ```

use crate::audio::{level::exceeds_peak, AudioClip};
use crate::vad::VoiceActivityDetector;

/// Window counts gathered while driving a detector across a clip.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpeechPass {
    /// Full windows fed to the detector.
    pub windows: usize,
    /// Windows past warm-up on which the detector reported speech.
    pub active_windows: usize,
    /// Leading windows the detector spends calibrating.
    pub warmup_windows: usize,
}

impl SpeechPass {
    /// Windows that were eligible for a speech decision.
    pub fn valid_windows(&self) -> usize {
        self.windows.saturating_sub(self.warmup_windows)
    }

    pub fn detected(&self) -> bool {
        self.valid_windows() > 0 && self.active_windows > 0
    }
}

/// Feed `clip` to `vad` in consecutive windows of its preferred size.
/// A trailing partial window is dropped.
pub fn run_speech_pass<V>(vad: &mut V, clip: &AudioClip) -> SpeechPass
where
    V: VoiceActivityDetector + ?Sized,
{
    let size = vad.window_size();
    let warmup_windows = vad.warmup_windows();
    let mut pass = SpeechPass {
        warmup_windows,
        ..SpeechPass::default()
    };

    for (index, window) in clip.windows(size).enumerate() {
        pass.windows += 1;
        let decision = vad.classify(window);
        if index >= warmup_windows && decision.is_speech() {
            pass.active_windows += 1;
        }
    }

    pass
}

/// Percussive impacts show up as isolated samples far above speech level.
pub fn detect_clapping(samples: &[f32], peak_threshold: f32) -> bool {
    exceeds_peak(samples, peak_threshold)
}
