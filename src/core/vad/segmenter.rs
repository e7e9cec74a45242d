//! Utterance segmentation over classified frames

use bytes::{Bytes, BytesMut};
use std::time::Duration;
use tracing::{debug, trace};

use super::config::{SegmentationMode, TrailingSilence, VADConfig};
use super::energy::{AlwaysSpeech, EnergyClassifier, FrameClass, FrameClassifier};
use crate::core::audio::AudioFrame;

/// A contiguous run of speech frames handed to the turn controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    frames: Vec<AudioFrame>,
    sample_rate: u32,
    frame_duration_ms: u32,
}

impl Utterance {
    /// Returns `None` for an empty frame list
    pub fn from_frames(frames: Vec<AudioFrame>, sample_rate: u32, frame_duration_ms: u32) -> Option<Self> {
        if frames.is_empty() {
            return None;
        }
        Some(Self {
            frames,
            sample_rate,
            frame_duration_ms,
        })
    }

    pub fn frames(&self) -> &[AudioFrame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn first_seq(&self) -> u64 {
        self.frames.first().map(|f| f.seq).unwrap_or_default()
    }

    pub fn last_seq(&self) -> u64 {
        self.frames.last().map(|f| f.seq).unwrap_or_default()
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.frame_duration_ms as u64 * self.frames.len() as u64)
    }

    /// Concatenated PCM of every frame
    pub fn to_pcm(&self) -> Bytes {
        let total = self.frames.iter().map(AudioFrame::len).sum();
        let mut pcm = BytesMut::with_capacity(total);
        for frame in &self.frames {
            pcm.extend_from_slice(&frame.data);
        }
        pcm.freeze()
    }
}

/// Output of [`Segmenter::consume`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmenterEvent {
    /// First speech frame after silence
    SpeechStarted { seq: u64 },
    /// Utterance closed by silence or an explicit end
    UtteranceEnded(Utterance),
    /// Utterance closed by the length cap while speech goes on. The next
    /// fragment continues without another `SpeechStarted`.
    LengthCapReached(Utterance),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmenterState {
    Idle,
    Accumulating,
}

/// Running counters for one segmenter
#[derive(Debug, Clone, Default)]
pub struct SegmenterStats {
    pub total_frames: u64,
    pub speech_frames: u64,
    pub utterances: u64,
}

impl std::fmt::Display for SegmenterStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ratio = if self.total_frames > 0 {
            self.speech_frames as f32 / self.total_frames as f32 * 100.0
        } else {
            0.0
        };
        write!(
            f,
            "Segmenter Stats: {} frames ({:.1}% speech), {} utterances",
            self.total_frames, ratio, self.utterances
        )
    }
}

/// Two-state utterance segmenter.
///
/// Silence frames seen while accumulating are held aside until either speech
/// resumes (they are committed to the utterance) or the silence threshold is
/// reached (the utterance closes and the held frames follow the
/// [`TrailingSilence`] policy).
pub struct Segmenter {
    classifier: Box<dyn FrameClassifier>,
    config: VADConfig,
    state: SegmenterState,
    buffer: Vec<AudioFrame>,
    trailing: Vec<AudioFrame>,
    silence_frames: usize,
    silence_threshold: usize,
    max_frames: Option<usize>,
    stats: SegmenterStats,
}

impl std::fmt::Debug for Segmenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segmenter")
            .field("state", &self.state)
            .field("buffered", &self.buffer.len())
            .field("silence_frames", &self.silence_frames)
            .field("silence_threshold", &self.silence_threshold)
            .finish()
    }
}

impl Segmenter {
    /// Build a segmenter with the classifier implied by the config
    pub fn new(config: VADConfig) -> Self {
        let classifier: Box<dyn FrameClassifier> = match config.mode {
            SegmentationMode::Vad => Box::new(EnergyClassifier::new(config.energy_threshold)),
            SegmentationMode::Manual => Box::new(AlwaysSpeech),
        };
        Self::with_classifier(config, classifier)
    }

    pub fn with_classifier(config: VADConfig, classifier: Box<dyn FrameClassifier>) -> Self {
        let silence_threshold = config.silence_threshold_frames().max(1);
        let max_frames = config.max_utterance_frames();
        debug!(
            "Segmenter initialized: mode={}, threshold={} frames ({}ms), trailing={}",
            config.mode, silence_threshold, config.silence_threshold_ms, config.trailing_silence
        );
        Self {
            classifier,
            config,
            state: SegmenterState::Idle,
            buffer: Vec::new(),
            trailing: Vec::new(),
            silence_frames: 0,
            silence_threshold,
            max_frames,
            stats: SegmenterStats::default(),
        }
    }

    pub fn state(&self) -> SegmenterState {
        self.state
    }

    pub fn config(&self) -> &VADConfig {
        &self.config
    }

    pub fn stats(&self) -> &SegmenterStats {
        &self.stats
    }

    pub fn silence_threshold_frames(&self) -> usize {
        self.silence_threshold
    }

    pub fn consume(&mut self, frame: AudioFrame) -> Option<SegmenterEvent> {
        let class = match self.config.mode {
            SegmentationMode::Manual => FrameClass::Speech,
            SegmentationMode::Vad => self.classifier.classify(&frame),
        };
        self.stats.total_frames += 1;
        if class.is_speech() {
            self.stats.speech_frames += 1;
        }
        trace!(seq = frame.seq, ?class, state = ?self.state, "Segmenter frame");

        match (self.state, class) {
            (SegmenterState::Idle, FrameClass::Silence) => None,
            (SegmenterState::Idle, FrameClass::Speech) => {
                let seq = frame.seq;
                self.state = SegmenterState::Accumulating;
                self.silence_frames = 0;
                self.buffer.push(frame);
                debug!(seq, "Speech started");
                Some(SegmenterEvent::SpeechStarted { seq })
            }
            (SegmenterState::Accumulating, FrameClass::Speech) => {
                self.buffer.append(&mut self.trailing);
                self.buffer.push(frame);
                self.silence_frames = 0;

                if let Some(max) = self.max_frames
                    && self.buffer.len() >= max
                {
                    debug!(frames = self.buffer.len(), "Utterance reached length cap");
                    let capped = self.finalize();
                    self.state = SegmenterState::Accumulating;
                    return capped.map(SegmenterEvent::LengthCapReached);
                }
                None
            }
            (SegmenterState::Accumulating, FrameClass::Silence) => {
                self.silence_frames += 1;
                self.trailing.push(frame);
                if self.silence_frames >= self.silence_threshold {
                    debug!(
                        silence_frames = self.silence_frames,
                        "Silence threshold reached, closing utterance"
                    );
                    return self.finalize().map(SegmenterEvent::UtteranceEnded);
                }
                None
            }
        }
    }

    /// Close the current utterance early (explicit end of speech)
    pub fn finish(&mut self) -> Option<Utterance> {
        match self.state {
            SegmenterState::Idle => None,
            SegmenterState::Accumulating => self.finalize(),
        }
    }

    /// Drop anything buffered and return to idle
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.trailing.clear();
        self.silence_frames = 0;
        self.state = SegmenterState::Idle;
    }

    fn finalize(&mut self) -> Option<Utterance> {
        if self.buffer.is_empty() {
            // Only silence since a length-capped fragment
            self.reset();
            return None;
        }
        let mut frames = std::mem::take(&mut self.buffer);
        match self.config.trailing_silence {
            TrailingSilence::Keep => frames.append(&mut self.trailing),
            TrailingSilence::Trim => self.trailing.clear(),
        }
        self.silence_frames = 0;
        self.state = SegmenterState::Idle;

        let utterance = Utterance::from_frames(
            frames,
            self.config.format.sample_rate,
            self.config.format.frame_duration_ms,
        )?;
        self.stats.utterances += 1;
        debug!(
            frames = utterance.len(),
            first_seq = utterance.first_seq(),
            last_seq = utterance.last_seq(),
            "Utterance ended"
        );
        Some(utterance)
    }
}
