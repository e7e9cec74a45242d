use thiserror::Error;

/// Collaborator stage that failed during a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStage {
    Transcribe,
    Generate,
    Synthesize,
}

impl TurnStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnStage::Transcribe => "transcribe",
            TurnStage::Generate => "generate",
            TurnStage::Synthesize => "synthesize",
        }
    }

    /// Text shown to the caller when this stage fails
    pub fn user_message(&self) -> &'static str {
        match self {
            TurnStage::Transcribe => "Speech-to-text failed.",
            TurnStage::Generate => "Response generation failed.",
            TurnStage::Synthesize => "Text-to-speech failed.",
        }
    }
}

impl std::fmt::Display for TurnStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of an external transcription, generation or synthesis call
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Provider error ({status}): {message}")]
    Provider { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Audio encoding error: {0}")]
    Encoding(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for CollaboratorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CollaboratorError::Timeout(err.to_string())
        } else if err.is_decode() {
            CollaboratorError::InvalidResponse(err.to_string())
        } else {
            CollaboratorError::Network(err.to_string())
        }
    }
}

/// Context lookup failure; turns continue with an empty context
#[derive(Debug, Error)]
#[error("Context retrieval failed: {0}")]
pub struct ContextRetrievalError(pub String);

/// The caller's connection is gone or unusable
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection closed")]
    Closed,

    #[error("WebSocket error: {0}")]
    WebSocket(String),
}

/// A collaborator failure tagged with the stage it happened in
#[derive(Debug, Error)]
#[error("{stage} failed: {source}")]
pub struct TurnFailure {
    pub stage: TurnStage,
    #[source]
    pub source: CollaboratorError,
}

impl TurnFailure {
    pub fn new(stage: TurnStage, source: CollaboratorError) -> Self {
        Self { stage, source }
    }
}
