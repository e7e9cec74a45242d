//! Call WebSocket message types

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::core::events::SessionEvent;

// =============================================================================
// Incoming Messages (Client -> Server)
// =============================================================================

/// Control messages from the caller. Audio arrives as binary frames.
#[derive(Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallIncomingMessage {
    /// Close the current utterance now (push-to-talk release)
    EndUtterance,
    /// Cancel the reply in progress
    Interrupt,
    /// Tear the session down
    Stop,
}

// =============================================================================
// Outgoing Messages (Server -> Client)
// =============================================================================

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallOutgoingMessage {
    SessionCreated {
        session_id: String,
        inbound_sample_rate: u32,
        outbound_sample_rate: u32,
    },
    Transcription {
        text: String,
    },
    AiResponse {
        text: String,
    },
    AudioStart,
    AudioEnd,
    InterruptAck,
    Error {
        /// Turn stage that failed, absent for protocol errors
        #[serde(skip_serializing_if = "Option::is_none")]
        stage: Option<String>,
        message: String,
    },
}

/// What the sender task writes next
#[derive(Debug)]
pub enum CallMessageRoute {
    Outgoing(CallOutgoingMessage),
    Audio(Bytes),
    Close,
}

impl From<SessionEvent> for CallMessageRoute {
    fn from(event: SessionEvent) -> Self {
        let message = match event {
            SessionEvent::Audio(frame) => return CallMessageRoute::Audio(frame),
            SessionEvent::Transcription { text } => CallOutgoingMessage::Transcription { text },
            SessionEvent::AiResponse { text } => CallOutgoingMessage::AiResponse { text },
            SessionEvent::AudioStart => CallOutgoingMessage::AudioStart,
            SessionEvent::AudioEnd => CallOutgoingMessage::AudioEnd,
            SessionEvent::InterruptAck => CallOutgoingMessage::InterruptAck,
            SessionEvent::Error { stage, message } => CallOutgoingMessage::Error {
                stage: Some(stage.as_str().to_string()),
                message,
            },
        };
        CallMessageRoute::Outgoing(message)
    }
}
