use std::sync::atomic::{AtomicU8, Ordering};

/// Turn-taking state of one session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnState {
    /// No turn in flight
    #[default]
    Listening,
    /// Transcription or generation in flight, no audio yet
    Processing,
    /// Reply audio is queued or being transmitted
    Speaking,
    /// Cancellation cleanup after a barge-in
    Interrupted,
}

impl TurnState {
    fn as_u8(self) -> u8 {
        match self {
            TurnState::Listening => 0,
            TurnState::Processing => 1,
            TurnState::Speaking => 2,
            TurnState::Interrupted => 3,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => TurnState::Processing,
            2 => TurnState::Speaking,
            3 => TurnState::Interrupted,
            _ => TurnState::Listening,
        }
    }

    /// A turn is occupying the session
    pub fn is_busy(self) -> bool {
        matches!(self, TurnState::Processing | TurnState::Speaking)
    }
}

impl std::fmt::Display for TurnState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TurnState::Listening => write!(f, "listening"),
            TurnState::Processing => write!(f, "processing"),
            TurnState::Speaking => write!(f, "speaking"),
            TurnState::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// Lock-free holder for the current [`TurnState`].
///
/// Only the turn worker writes it; any task may read it.
#[derive(Debug, Default)]
pub struct TurnStateCell(AtomicU8);

impl TurnStateCell {
    pub fn new(state: TurnState) -> Self {
        Self(AtomicU8::new(state.as_u8()))
    }

    pub fn get(&self) -> TurnState {
        TurnState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Store `state`, returning the previous value
    pub fn set(&self, state: TurnState) -> TurnState {
        TurnState::from_u8(self.0.swap(state.as_u8(), Ordering::AcqRel))
    }
}
