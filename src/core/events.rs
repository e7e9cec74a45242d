//! Events a session emits towards its transport.

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::errors::TurnStage;

/// Everything a session sends back to the caller, in emission order
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Transcription { text: String },
    AiResponse { text: String },
    AudioStart,
    /// One paced outbound frame
    Audio(Bytes),
    AudioEnd,
    InterruptAck,
    Error { stage: TurnStage, message: String },
}

impl SessionEvent {
    pub fn is_audio(&self) -> bool {
        matches!(self, SessionEvent::Audio(_))
    }
}

pub type EventSender = mpsc::Sender<SessionEvent>;
pub type EventReceiver = mpsc::Receiver<SessionEvent>;
