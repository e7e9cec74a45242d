//! Voice call WebSocket
//!
//! # Protocol
//!
//! ## Client → Server
//!
//! - **Binary frames**: raw PCM, 16-bit little-endian mono at the inbound rate
//! - **end_utterance**: close the current utterance without waiting for silence
//! - **interrupt**: cancel the reply in progress
//! - **stop**: end the call
//!
//! ## Server → Client
//!
//! - **session_created**: session id and negotiated sample rates
//! - **transcription**: what the caller said
//! - **ai_response**: the reply text, sent before its audio
//! - **audio_start** / **audio_end**: bracket the reply audio
//! - **interrupt_ack**: the reply was cancelled by a barge-in
//! - **error**: a turn stage failed (`stage`, `message`)
//! - **Binary frames**: paced reply audio at the outbound rate

mod handler;
pub mod messages;

pub use handler::call_handler;
