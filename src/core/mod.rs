pub mod audio;
pub mod collaborators;
pub mod events;
pub mod registry;
pub mod scheduler;
pub mod session;
pub mod turn;
pub mod vad;

// Re-export commonly used types for convenience
pub use audio::{AudioFrame, FrameFormat, PcmFramer};
pub use collaborators::{
    AudioStream, Collaborators, ContextRetriever, Exchange, GenerateRequest, Generator, NoContext,
    Synthesizer, Transcriber,
};
pub use events::{EventReceiver, EventSender, SessionEvent};
pub use registry::{SessionRegistry, SessionSummary};
pub use scheduler::OutboundScheduler;
pub use session::{Session, SessionHandle, SessionSettings};
pub use turn::{TurnController, TurnSettings, TurnState, TurnStats};
pub use vad::{
    SegmentationMode, Segmenter, SegmenterEvent, TrailingSilence, Utterance, VADConfig,
};
