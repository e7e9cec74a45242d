//! One call session: inbound framing and segmentation feeding the turn
//! controller, with a paced outbound scheduler on the other side.

use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::core::audio::{FrameFormat, PcmFramer};
use crate::core::collaborators::Collaborators;
use crate::core::events::EventSender;
use crate::core::scheduler::OutboundScheduler;
use crate::core::turn::{TurnController, TurnSettings, TurnState};
use crate::core::vad::{Segmenter, SegmenterEvent, SegmenterStats, Utterance, VADConfig};

/// Per-session audio and turn settings
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub vad: VADConfig,
    pub outbound_format: FrameFormat,
    pub turn: TurnSettings,
}

impl SessionSettings {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            vad: config.vad_config(),
            outbound_format: config.outbound_format,
            turn: TurnSettings {
                history_limit: config.history_turns,
            },
        }
    }

    pub fn inbound_format(&self) -> FrameFormat {
        self.vad.format
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            vad: VADConfig::default(),
            outbound_format: FrameFormat::new(16000, 20),
            turn: TurnSettings::default(),
        }
    }
}

/// Shared view of a session, held by the registry
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub id: String,
    pub created_at: Instant,
    controller: Arc<TurnController>,
    scheduler: Arc<OutboundScheduler>,
    cancel: CancellationToken,
}

impl SessionHandle {
    pub fn state(&self) -> TurnState {
        self.controller.state()
    }

    pub fn queued_frames(&self) -> usize {
        self.scheduler.queued_frames()
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancel everything the session is doing. The owning transport still
    /// has to notice and drop its [`Session`].
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

/// A live call session, owned by its transport task
pub struct Session {
    id: String,
    created_at: Instant,
    framer: PcmFramer,
    segmenter: Segmenter,
    /// The segmenter is mid-way through a length-capped utterance
    continuing: bool,
    controller: Arc<TurnController>,
    scheduler: Arc<OutboundScheduler>,
    pacing: Option<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl Session {
    /// Create a session and start its turn worker and pacing loop.
    ///
    /// All events, paced audio included, are delivered on `events`.
    pub fn new(
        id: impl Into<String>,
        settings: SessionSettings,
        collaborators: Collaborators,
        events: EventSender,
    ) -> Self {
        let id = id.into();
        let cancel = CancellationToken::new();
        let scheduler = Arc::new(OutboundScheduler::new(settings.outbound_format));
        let pacing = scheduler.spawn(events.clone(), cancel.clone());
        let controller = Arc::new(TurnController::spawn(
            id.clone(),
            collaborators,
            Arc::clone(&scheduler),
            events,
            settings.turn.clone(),
            cancel.clone(),
        ));

        info!(
            session_id = %id,
            inbound = ?settings.inbound_format(),
            outbound = ?settings.outbound_format,
            mode = %settings.vad.mode,
            "Session created"
        );

        Self {
            framer: PcmFramer::new(settings.inbound_format()),
            segmenter: Segmenter::new(settings.vad),
            continuing: false,
            id,
            created_at: Instant::now(),
            controller,
            scheduler,
            pacing: Some(pacing),
            cancel,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> TurnState {
        self.controller.state()
    }

    pub fn segmenter_stats(&self) -> &SegmenterStats {
        self.segmenter.stats()
    }

    pub fn history(&self) -> Vec<crate::core::collaborators::Exchange> {
        self.controller.history()
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token cancelled when the session is closed from anywhere
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            id: self.id.clone(),
            created_at: self.created_at,
            controller: Arc::clone(&self.controller),
            scheduler: Arc::clone(&self.scheduler),
            cancel: self.cancel.clone(),
        }
    }

    /// Feed raw little-endian PCM from the caller.
    ///
    /// Chunks may be any length; partial frames are carried to the next call.
    pub fn ingest_audio(&mut self, pcm: &[u8]) {
        if self.is_closed() {
            return;
        }
        for frame in self.framer.push(pcm) {
            self.consume_frame(frame);
        }
    }

    /// Returns `true` if the frame closed an utterance that was handed off
    fn consume_frame(&mut self, frame: crate::core::audio::AudioFrame) -> bool {
        match self.segmenter.consume(frame) {
            Some(SegmenterEvent::SpeechStarted { seq }) => {
                self.continuing = false;
                if self.controller.barge_in() {
                    debug!(session_id = %self.id, seq, "Caller started speaking over reply");
                }
                false
            }
            Some(SegmenterEvent::LengthCapReached(utterance)) => {
                debug!(
                    session_id = %self.id,
                    frames = utterance.len(),
                    "Utterance split at length cap"
                );
                // The first fragment interrupts like any new utterance, the
                // rest queue behind it
                if std::mem::replace(&mut self.continuing, true) {
                    self.controller.enqueue(utterance)
                } else {
                    self.controller.submit(utterance)
                }
            }
            Some(SegmenterEvent::UtteranceEnded(utterance)) => {
                debug!(
                    session_id = %self.id,
                    frames = utterance.len(),
                    duration_ms = utterance.duration().as_millis() as u64,
                    "Utterance ended"
                );
                self.hand_off(utterance)
            }
            None => false,
        }
    }

    fn hand_off(&mut self, utterance: Utterance) -> bool {
        if std::mem::take(&mut self.continuing) {
            self.controller.enqueue(utterance)
        } else {
            self.controller.submit(utterance)
        }
    }

    /// Close the current utterance without waiting for trailing silence.
    ///
    /// Any partial frame is zero-padded and included. Returns `true` if an
    /// utterance was submitted, including when the padded frame itself was
    /// enough to close it.
    pub fn end_utterance(&mut self) -> bool {
        if self.is_closed() {
            return false;
        }
        let mut submitted = false;
        if let Some(frame) = self.framer.finish() {
            submitted = self.consume_frame(frame);
        }
        match self.segmenter.finish() {
            Some(utterance) => self.hand_off(utterance) || submitted,
            None => {
                self.continuing = false;
                if !submitted {
                    debug!(session_id = %self.id, "end_utterance with no buffered speech");
                }
                submitted
            }
        }
    }

    /// Explicit caller interrupt. Returns `true` if a turn was cancelled.
    pub fn interrupt(&self) -> bool {
        self.controller.barge_in()
    }

    /// Cancel any turn in flight, drop queued audio and stop the background
    /// tasks. Safe to call more than once.
    pub async fn close(&mut self) {
        self.cancel.cancel();
        self.scheduler.flush();
        self.framer.clear();
        self.segmenter.reset();
        self.continuing = false;
        self.controller.shutdown().await;
        if let Some(pacing) = self.pacing.take()
            && let Err(e) = pacing.await
        {
            warn!(session_id = %self.id, "Pacing loop ended abnormally: {e}");
        }
        let stats = self.controller.stats();
        info!(
            session_id = %self.id,
            completed = stats.completed,
            interrupted = stats.interrupted,
            failed = stats.failed,
            "Session closed"
        );
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
