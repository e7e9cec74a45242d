//! Segmenter configuration types

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::core::audio::FrameFormat;

/// Frame classifier selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VADBackend {
    /// Energy-based - RMS threshold detection
    #[default]
    Energy,
}

impl std::fmt::Display for VADBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VADBackend::Energy => write!(f, "energy"),
        }
    }
}

/// What happens to the silence counted down before an utterance closes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TrailingSilence {
    /// Utterance ends on its last speech frame
    #[default]
    Trim,
    /// Utterance carries the countdown frames (at most the threshold)
    Keep,
}

impl std::fmt::Display for TrailingSilence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrailingSilence::Trim => write!(f, "trim"),
            TrailingSilence::Keep => write!(f, "keep"),
        }
    }
}

impl std::str::FromStr for TrailingSilence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "trim" => Ok(Self::Trim),
            "keep" => Ok(Self::Keep),
            other => Err(format!("unknown trailing silence policy '{other}' (expected trim or keep)")),
        }
    }
}

/// How utterance boundaries are found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SegmentationMode {
    /// Voice activity detection with a silence threshold
    #[default]
    Vad,
    /// Every frame is speech; utterances end only on an explicit end message
    Manual,
}

impl std::fmt::Display for SegmentationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SegmentationMode::Vad => write!(f, "vad"),
            SegmentationMode::Manual => write!(f, "manual"),
        }
    }
}

impl std::str::FromStr for SegmentationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "vad" => Ok(Self::Vad),
            "manual" | "push_to_talk" => Ok(Self::Manual),
            other => Err(format!("unknown segmentation mode '{other}' (expected vad or manual)")),
        }
    }
}

/// Configuration for utterance segmentation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VADConfig {
    /// Classifier backend
    pub backend: VADBackend,

    /// Boundary detection mode
    pub mode: SegmentationMode,

    /// Normalized RMS (0.0 - 1.0) at or above which a frame counts as speech
    pub energy_threshold: f32,

    /// Silence that closes an utterance (ms)
    pub silence_threshold_ms: u32,

    /// Trailing silence handling when an utterance closes
    pub trailing_silence: TrailingSilence,

    /// Force-close utterances longer than this (ms)
    pub max_utterance_ms: Option<u32>,

    /// Inbound frame format the classifier is calibrated for
    pub format: FrameFormat,
}

impl Default for VADConfig {
    fn default() -> Self {
        Self {
            backend: VADBackend::Energy,
            mode: SegmentationMode::Vad,
            energy_threshold: 0.02,
            silence_threshold_ms: 3000,
            trailing_silence: TrailingSilence::Trim,
            max_utterance_ms: None,
            format: FrameFormat::default(),
        }
    }
}

impl VADConfig {
    /// Create a new VADConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorter silence window for snappier turn ends
    pub fn low_latency() -> Self {
        Self {
            silence_threshold_ms: 800,
            ..Default::default()
        }
    }

    /// Calculate frame duration in milliseconds
    pub fn frame_duration_ms(&self) -> u32 {
        self.format.frame_duration_ms
    }

    /// Calculate number of frames for a given duration in milliseconds
    pub fn frames_for_duration(&self, duration_ms: u32) -> usize {
        self.format.frames_for_duration(duration_ms)
    }

    /// Consecutive silence frames tolerated inside an utterance
    pub fn silence_threshold_frames(&self) -> usize {
        self.frames_for_duration(self.silence_threshold_ms)
    }

    pub fn max_utterance_frames(&self) -> Option<usize> {
        self.max_utterance_ms.map(|ms| self.frames_for_duration(ms))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.energy_threshold) {
            anyhow::bail!("VAD energy_threshold must be between 0.0 and 1.0");
        }
        if let Err(e) = self.format.validate() {
            anyhow::bail!("VAD frame format invalid: {e}");
        }
        if self.silence_threshold_ms == 0 {
            anyhow::bail!("VAD silence_threshold_ms must be greater than 0");
        }
        if let Some(max) = self.max_utterance_ms
            && max < self.frame_duration_ms()
        {
            anyhow::bail!("VAD max_utterance_ms must cover at least one frame");
        }
        Ok(())
    }
}
