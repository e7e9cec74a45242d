//! Process-wide index of live call sessions.

use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, info};

use super::session::SessionHandle;
use super::turn::TurnState;

/// Snapshot of one session for the HTTP API
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SessionSummary {
    pub session_id: String,
    pub state: String,
    pub age_seconds: u64,
    pub queued_frames: usize,
}

/// Live sessions keyed by id.
///
/// Entries are inserted by the transport when a session is created and
/// removed when it closes, so lookups never see a closed session for long.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, SessionHandle>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, handle: SessionHandle) {
        debug!(session_id = %handle.id, "Session registered");
        self.sessions.insert(handle.id.clone(), handle);
    }

    pub fn remove(&self, session_id: &str) -> Option<SessionHandle> {
        let removed = self.sessions.remove(session_id).map(|(_, handle)| handle);
        if removed.is_some() {
            debug!(session_id, "Session unregistered");
        }
        removed
    }

    pub fn get(&self, session_id: &str) -> Option<SessionHandle> {
        self.sessions.get(session_id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Sessions with a turn in flight
    pub fn active_turns(&self) -> usize {
        self.sessions
            .iter()
            .filter(|entry| entry.value().state().is_busy())
            .count()
    }

    pub fn summaries(&self) -> Vec<SessionSummary> {
        let mut summaries: Vec<_> = self
            .sessions
            .iter()
            .map(|entry| {
                let handle = entry.value();
                SessionSummary {
                    session_id: handle.id.clone(),
                    state: handle.state().to_string(),
                    age_seconds: handle.created_at.elapsed().as_secs(),
                    queued_frames: handle.queued_frames(),
                }
            })
            .collect();
        summaries.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        summaries
    }

    /// Cancel every session. Transports observe the cancellation and
    /// unregister themselves as they exit.
    pub fn shutdown_all(&self) -> usize {
        let count = self.sessions.len();
        for entry in self.sessions.iter() {
            entry.value().cancel();
        }
        if count > 0 {
            info!(count, "Cancelled all sessions");
        }
        count
    }

    pub fn state_of(&self, session_id: &str) -> Option<TurnState> {
        self.sessions.get(session_id).map(|entry| entry.value().state())
    }
}
