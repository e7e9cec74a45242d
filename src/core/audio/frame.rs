//! Fixed-size PCM framing
//!
//! Every frame that flows through the turn-taking core has exactly
//! `FrameFormat::bytes_per_frame()` bytes of 16-bit little-endian mono PCM.
//! Transport chunks of arbitrary size are re-cut by [`PcmFramer`]; a short
//! tail is zero-padded when the stream is finished, never truncated.

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bytes per 16-bit PCM sample
pub const BYTES_PER_SAMPLE: usize = 2;

/// Sample rate and frame duration of a mono 16-bit PCM stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameFormat {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Duration of one frame in milliseconds
    pub frame_duration_ms: u32,
}

impl Default for FrameFormat {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            frame_duration_ms: 30,
        }
    }
}

impl FrameFormat {
    pub fn new(sample_rate: u32, frame_duration_ms: u32) -> Self {
        Self {
            sample_rate,
            frame_duration_ms,
        }
    }

    pub fn samples_per_frame(&self) -> usize {
        (self.sample_rate as usize * self.frame_duration_ms as usize) / 1000
    }

    pub fn bytes_per_frame(&self) -> usize {
        self.samples_per_frame() * BYTES_PER_SAMPLE
    }

    pub fn frame_duration(&self) -> Duration {
        Duration::from_millis(self.frame_duration_ms as u64)
    }

    /// Number of whole frames covering `duration_ms`, rounded up
    pub fn frames_for_duration(&self, duration_ms: u32) -> usize {
        if self.frame_duration_ms == 0 {
            return 0;
        }
        duration_ms.div_ceil(self.frame_duration_ms) as usize
    }

    /// Validate the format
    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate == 0 {
            return Err("sample_rate must be greater than 0".to_string());
        }
        if self.frame_duration_ms == 0 {
            return Err("frame_duration_ms must be greater than 0".to_string());
        }
        if self.samples_per_frame() == 0 {
            return Err(format!(
                "{} ms at {} Hz yields an empty frame",
                self.frame_duration_ms, self.sample_rate
            ));
        }
        Ok(())
    }
}

/// One fixed-size slice of PCM audio tagged with its position in the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    pub seq: u64,
    pub data: Bytes,
}

impl AudioFrame {
    pub fn new(seq: u64, data: Bytes) -> Self {
        Self { seq, data }
    }

    /// Decode the frame into signed 16-bit samples
    pub fn samples(&self) -> impl Iterator<Item = i16> + '_ {
        self.data
            .chunks_exact(BYTES_PER_SAMPLE)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Re-cuts a byte stream into fixed-size frames.
///
/// Bytes that do not fill a whole frame are carried over to the next
/// [`push`](Self::push). [`finish`](Self::finish) flushes the carry as one
/// zero-padded frame.
#[derive(Debug)]
pub struct PcmFramer {
    frame_bytes: usize,
    carry: BytesMut,
    next_seq: u64,
}

impl PcmFramer {
    pub fn new(format: FrameFormat) -> Self {
        Self::with_frame_bytes(format.bytes_per_frame())
    }

    pub fn with_frame_bytes(frame_bytes: usize) -> Self {
        Self {
            frame_bytes: frame_bytes.max(BYTES_PER_SAMPLE),
            carry: BytesMut::with_capacity(frame_bytes),
            next_seq: 0,
        }
    }

    pub fn frame_bytes(&self) -> usize {
        self.frame_bytes
    }

    /// Bytes waiting for the rest of their frame
    pub fn pending_bytes(&self) -> usize {
        self.carry.len()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<AudioFrame> {
        self.carry.extend_from_slice(chunk);

        let mut frames = Vec::with_capacity(self.carry.len() / self.frame_bytes);
        while self.carry.len() >= self.frame_bytes {
            let data = self.carry.split_to(self.frame_bytes).freeze();
            frames.push(self.tag(data));
        }
        frames
    }

    /// Zero-pad and emit the carried tail, if any
    pub fn finish(&mut self) -> Option<AudioFrame> {
        if self.carry.is_empty() {
            return None;
        }
        self.carry.resize(self.frame_bytes, 0);
        let data = self.carry.split().freeze();
        Some(self.tag(data))
    }

    /// Drop any carried bytes without emitting them
    pub fn clear(&mut self) {
        self.carry.clear();
    }

    fn tag(&mut self, data: Bytes) -> AudioFrame {
        let frame = AudioFrame::new(self.next_seq, data);
        self.next_seq += 1;
        frame
    }
}
