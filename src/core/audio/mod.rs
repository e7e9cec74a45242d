//! PCM frame types shared by the inbound and outbound paths.

mod frame;

pub use frame::{AudioFrame, BYTES_PER_SAMPLE, FrameFormat, PcmFramer};
