//! Frame classification

use crate::core::audio::AudioFrame;

/// Binary voice activity decision for one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameClass {
    Speech,
    Silence,
}

impl FrameClass {
    pub fn is_speech(self) -> bool {
        matches!(self, FrameClass::Speech)
    }
}

/// Speech/silence classifier over fixed-size frames.
///
/// Implementations must be pure with respect to the frame: the same input
/// always yields the same class.
pub trait FrameClassifier: Send + Sync {
    fn classify(&self, frame: &AudioFrame) -> FrameClass;
}

/// RMS energy threshold classifier
#[derive(Debug, Clone, Copy)]
pub struct EnergyClassifier {
    threshold: f32,
}

impl EnergyClassifier {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Root-mean-square of the frame normalized to 0.0 - 1.0
    pub fn rms(frame: &AudioFrame) -> f32 {
        let mut sum = 0.0f64;
        let mut count = 0usize;
        for sample in frame.samples() {
            let normalized = sample as f64 / i16::MAX as f64;
            sum += normalized * normalized;
            count += 1;
        }
        if count == 0 {
            return 0.0;
        }
        (sum / count as f64).sqrt() as f32
    }
}

impl FrameClassifier for EnergyClassifier {
    fn classify(&self, frame: &AudioFrame) -> FrameClass {
        if Self::rms(frame) >= self.threshold {
            FrameClass::Speech
        } else {
            FrameClass::Silence
        }
    }
}

/// Treats every frame as speech
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysSpeech;

impl FrameClassifier for AlwaysSpeech {
    fn classify(&self, _frame: &AudioFrame) -> FrameClass {
        FrameClass::Speech
    }
}
