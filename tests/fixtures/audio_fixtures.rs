//! Audio Test Fixtures
//!
//! Programmatically generated PCM so tests have no file dependencies.
//!
//! Audio formats:
//! - Bit depth: 16-bit signed little-endian PCM
//! - Channels: Mono
//! - Default inbound framing: 16kHz, 30ms (960 bytes per frame)

use std::f32::consts::PI;

/// Inbound sample rate used by the default configuration
pub const SAMPLE_RATE: u32 = 16000;

/// Inbound frame duration used by the default configuration
pub const FRAME_MS: u32 = 30;

/// Samples in one default inbound frame
pub const FRAME_SAMPLES: usize = (SAMPLE_RATE as usize / 1000) * FRAME_MS as usize;

/// Convert samples to little-endian bytes
pub fn samples_to_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Generate silence (zeros)
pub fn generate_silence(duration_samples: usize) -> Vec<i16> {
    vec![0i16; duration_samples]
}

/// Generate a sine wave tone at `SAMPLE_RATE`
pub fn generate_sine_wave(duration_samples: usize, frequency: f32, amplitude: f32) -> Vec<i16> {
    let max_amplitude = amplitude * i16::MAX as f32;
    let angular_freq = 2.0 * PI * frequency / SAMPLE_RATE as f32;

    (0..duration_samples)
        .map(|i| ((angular_freq * i as f32).sin() * max_amplitude) as i16)
        .collect()
}

/// Low-level hiss that stays under the default energy threshold
pub fn generate_background_noise(duration_samples: usize) -> Vec<i16> {
    let mut state: u64 = 12345;
    (0..duration_samples)
        .map(|_| {
            // Linear congruential generator
            state = state.wrapping_mul(1103515245).wrapping_add(12345);
            let random = ((state >> 16) & 0x7FFF) as f32 / 0x7FFF as f32;
            ((random * 2.0 - 1.0) * 0.005 * i16::MAX as f32) as i16
        })
        .collect()
}

/// `count` default-format frames of a 440Hz tone, as one byte buffer
pub fn speech_frames(count: usize) -> Vec<u8> {
    samples_to_bytes(&generate_sine_wave(count * FRAME_SAMPLES, 440.0, 0.5))
}

/// `count` default-format frames of silence, as one byte buffer
pub fn silence_frames(count: usize) -> Vec<u8> {
    samples_to_bytes(&generate_silence(count * FRAME_SAMPLES))
}

/// `count` default-format frames of sub-threshold noise
pub fn noise_frames(count: usize) -> Vec<u8> {
    samples_to_bytes(&generate_background_noise(count * FRAME_SAMPLES))
}

/// A single speech frame of `frame_bytes` bytes
pub fn speech_frame_bytes(frame_bytes: usize) -> Vec<u8> {
    let samples = generate_sine_wave(frame_bytes / 2, 440.0, 0.5);
    samples_to_bytes(&samples)
}
