//! Voice activity segmentation
//!
//! Turns the inbound frame stream into utterances:
//!
//! - each frame is classified speech or silence by a [`FrameClassifier`]
//! - the [`Segmenter`] reports the first speech frame after silence
//!   (used downstream as the barge-in signal)
//! - an utterance closes once silence lasts `silence_threshold_ms`
//! - with `max_utterance_ms`, long speech is split into fragments that
//!   carry on without a new speech start
//!
//! # Example
//!
//! ```rust,ignore
//! use turnline_gateway::core::vad::{Segmenter, SegmenterEvent, VADConfig};
//!
//! let mut segmenter = Segmenter::new(VADConfig::default());
//! for frame in frames {
//!     match segmenter.consume(frame) {
//!         Some(SegmenterEvent::SpeechStarted { seq }) => println!("speech at {seq}"),
//!         Some(SegmenterEvent::UtteranceEnded(utterance)) => println!("{} frames", utterance.len()),
//!         Some(SegmenterEvent::LengthCapReached(part)) => println!("{} frames, still talking", part.len()),
//!         None => {}
//!     }
//! }
//! ```

pub mod config;
pub mod energy;
pub mod segmenter;

pub use config::{SegmentationMode, TrailingSilence, VADBackend, VADConfig};
pub use energy::{AlwaysSpeech, EnergyClassifier, FrameClass, FrameClassifier};
pub use segmenter::{Segmenter, SegmenterEvent, SegmenterState, SegmenterStats, Utterance};
