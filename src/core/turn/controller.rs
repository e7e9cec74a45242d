//! Per-session turn state machine
//!
//! A single worker task takes utterances off a queue and runs each one as a
//! turn: transcribe, retrieve context, generate, synthesize. Because the
//! worker is sequential, at most one turn is ever in flight. Every turn gets a
//! child of the session's cancellation token when it is submitted, so a turn
//! still waiting in the queue can be cancelled just like a running one;
//! [`TurnController::barge_in`] does that from the ingestion side without
//! waiting on the worker.

use futures::StreamExt;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::state::{TurnState, TurnStateCell};
use crate::core::collaborators::{Collaborators, Exchange, GenerateRequest};
use crate::core::events::{EventSender, SessionEvent};
use crate::core::scheduler::OutboundScheduler;
use crate::core::vad::Utterance;
use crate::errors::{TurnFailure, TurnStage};

/// Utterances allowed to wait behind the active turn
const UTTERANCE_QUEUE_CAPACITY: usize = 8;

/// Tunables for a session's turns
#[derive(Debug, Clone)]
pub struct TurnSettings {
    /// Completed exchanges kept for the generator
    pub history_limit: usize,
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self { history_limit: 10 }
    }
}

/// How a turn ended
#[derive(Debug)]
enum TurnOutcome {
    Completed(Exchange),
    /// Nothing was transcribed
    Empty,
    Interrupted,
    Failed(TurnFailure),
}

/// Counters for one controller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TurnStats {
    pub completed: u64,
    pub interrupted: u64,
    pub failed: u64,
}

/// A submitted turn that has not finished yet
struct PendingTurn {
    id: u64,
    token: CancellationToken,
}

/// Queue entry for the worker
struct QueuedTurn {
    id: u64,
    token: CancellationToken,
    utterance: Utterance,
}

struct TurnShared {
    session_id: String,
    state: TurnStateCell,
    /// Queued and running turns, oldest first
    pending: Mutex<Vec<PendingTurn>>,
    next_turn_id: AtomicU64,
    /// An interrupt_ack that did not fit in the event channel
    ack_pending: AtomicBool,
    history: Mutex<Vec<Exchange>>,
    scheduler: Arc<OutboundScheduler>,
    events: EventSender,
    collaborators: Collaborators,
    settings: TurnSettings,
    cancel: CancellationToken,
    completed: AtomicU64,
    interrupted: AtomicU64,
    failed: AtomicU64,
}

/// Handle to a session's turn worker
pub struct TurnController {
    shared: Arc<TurnShared>,
    utterances: mpsc::Sender<QueuedTurn>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for TurnController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnController")
            .field("session_id", &self.shared.session_id)
            .field("state", &self.shared.state.get())
            .finish()
    }
}

impl TurnController {
    /// Start the turn worker for one session.
    ///
    /// `cancel` is the session token; cancelling it stops the worker and any
    /// turn in flight.
    pub fn spawn(
        session_id: impl Into<String>,
        collaborators: Collaborators,
        scheduler: Arc<OutboundScheduler>,
        events: EventSender,
        settings: TurnSettings,
        cancel: CancellationToken,
    ) -> Self {
        let shared = Arc::new(TurnShared {
            session_id: session_id.into(),
            state: TurnStateCell::new(TurnState::Listening),
            pending: Mutex::new(Vec::new()),
            next_turn_id: AtomicU64::new(0),
            ack_pending: AtomicBool::new(false),
            history: Mutex::new(Vec::new()),
            scheduler,
            events,
            collaborators,
            settings,
            cancel,
            completed: AtomicU64::new(0),
            interrupted: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        });
        let (tx, rx) = mpsc::channel(UTTERANCE_QUEUE_CAPACITY);
        let worker = tokio::spawn(run_worker(Arc::clone(&shared), rx));

        Self {
            shared,
            utterances: tx,
            worker: Mutex::new(Some(worker)),
        }
    }

    pub fn state(&self) -> TurnState {
        self.shared.state.get()
    }

    /// A turn is queued or running and has not been cancelled
    pub fn has_active_turn(&self) -> bool {
        self.shared
            .pending
            .lock()
            .iter()
            .any(|turn| !turn.token.is_cancelled())
    }

    /// Hand a finished utterance to the worker as a new turn.
    ///
    /// Any turn still queued or in flight is interrupted first, so the
    /// utterance runs as the next turn. Returns `false` if the queue was full
    /// and the utterance was dropped.
    pub fn submit(&self, utterance: Utterance) -> bool {
        self.barge_in();
        self.enqueue(utterance)
    }

    /// Queue an utterance behind the current turn without interrupting it.
    ///
    /// Used for fragments of one long utterance split by the length cap.
    pub fn enqueue(&self, utterance: Utterance) -> bool {
        let id = self.shared.next_turn_id.fetch_add(1, Ordering::Relaxed);
        let token = self.shared.cancel.child_token();
        self.shared.pending.lock().push(PendingTurn {
            id,
            token: token.clone(),
        });

        match self.utterances.try_send(QueuedTurn { id, token, utterance }) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                self.shared.forget(dropped.id);
                warn!(
                    session_id = %self.shared.session_id,
                    frames = dropped.utterance.len(),
                    "Utterance queue full, dropping utterance"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(dropped)) => {
                self.shared.forget(dropped.id);
                debug!(session_id = %self.shared.session_id, "Turn worker stopped, utterance ignored");
                false
            }
        }
    }

    /// Cancel every queued or running turn, flush outbound audio and
    /// acknowledge.
    ///
    /// Never blocks. Returns `true` if anything was interrupted; repeated
    /// calls for the same turns are no-ops. If the event channel is full the
    /// ack is handed to the worker, which sends it once the interrupted turn
    /// has unwound.
    pub fn barge_in(&self) -> bool {
        let pending = self.shared.pending.lock();
        let mut cancelled = 0;
        for turn in pending.iter().filter(|turn| !turn.token.is_cancelled()) {
            turn.token.cancel();
            cancelled += 1;
        }
        if cancelled == 0 {
            return false;
        }
        let dropped = self.shared.scheduler.flush();

        match self.shared.events.try_send(SessionEvent::InterruptAck) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!(session_id = %self.shared.session_id, "Event channel full, deferring interrupt_ack");
                self.shared.ack_pending.store(true, Ordering::Release);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
        info!(
            session_id = %self.shared.session_id,
            state = %self.shared.state.get(),
            turns = cancelled,
            dropped_frames = dropped,
            "Barge-in: turn interrupted"
        );
        true
    }

    /// Completed exchanges, oldest first
    pub fn history(&self) -> Vec<Exchange> {
        self.shared.history.lock().clone()
    }

    pub fn stats(&self) -> TurnStats {
        TurnStats {
            completed: self.shared.completed.load(Ordering::Relaxed),
            interrupted: self.shared.interrupted.load(Ordering::Relaxed),
            failed: self.shared.failed.load(Ordering::Relaxed),
        }
    }

    /// Stop the worker and any turn in flight, then wait for it to exit
    pub async fn shutdown(&self) {
        self.shared.cancel.cancel();
        let worker = self.worker.lock().take();
        if let Some(worker) = worker
            && let Err(e) = worker.await
        {
            warn!(session_id = %self.shared.session_id, "Turn worker ended abnormally: {e}");
        }
    }
}

impl Drop for TurnController {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
    }
}

async fn run_worker(shared: Arc<TurnShared>, mut utterances: mpsc::Receiver<QueuedTurn>) {
    loop {
        let QueuedTurn { id, token, utterance } = tokio::select! {
            biased;
            _ = shared.cancel.cancelled() => break,
            next = utterances.recv() => match next {
                Some(turn) => turn,
                None => break,
            },
        };

        let outcome = if token.is_cancelled() {
            debug!(session_id = %shared.session_id, turn = id, "Turn interrupted before it started");
            TurnOutcome::Interrupted
        } else {
            shared.state.set(TurnState::Processing);
            debug!(
                session_id = %shared.session_id,
                turn = id,
                frames = utterance.len(),
                "Turn started"
            );
            shared.run_turn(&utterance, &token).await
        };
        shared.forget(id);

        match outcome {
            TurnOutcome::Completed(exchange) => {
                shared.completed.fetch_add(1, Ordering::Relaxed);
                info!(
                    session_id = %shared.session_id,
                    transcript_chars = exchange.user.len(),
                    reply_chars = exchange.assistant.len(),
                    "Turn completed"
                );
                shared.commit(exchange);
            }
            TurnOutcome::Empty => {
                debug!(session_id = %shared.session_id, "Empty transcript, turn skipped");
            }
            TurnOutcome::Interrupted => {
                shared.state.set(TurnState::Interrupted);
                shared.scheduler.flush();
                shared.interrupted.fetch_add(1, Ordering::Relaxed);
                debug!(session_id = %shared.session_id, turn = id, "Turn cancelled");
            }
            TurnOutcome::Failed(failure) => {
                shared.scheduler.flush();
                shared.failed.fetch_add(1, Ordering::Relaxed);
                error!(
                    session_id = %shared.session_id,
                    stage = %failure.stage,
                    "Turn failed: {}",
                    failure.source
                );
                shared
                    .emit(
                        SessionEvent::Error {
                            stage: failure.stage,
                            message: failure.stage.user_message().to_string(),
                        },
                        &shared.cancel,
                    )
                    .await;
            }
        }

        if shared.ack_pending.swap(false, Ordering::AcqRel) {
            shared.emit(SessionEvent::InterruptAck, &shared.cancel).await;
        }
        shared.state.set(TurnState::Listening);
    }

    shared.pending.lock().clear();
    shared.state.set(TurnState::Listening);
    debug!(session_id = %shared.session_id, "Turn worker stopped");
}

/// Run `fut` unless `token` is cancelled first
async fn cancellable<F: Future>(token: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = token.cancelled() => None,
        output = fut => Some(output),
    }
}

impl TurnShared {
    /// Send an event, waiting for channel space unless `token` is cancelled.
    /// Returns `false` if cancelled first.
    async fn emit(&self, event: SessionEvent, token: &CancellationToken) -> bool {
        let sent = tokio::select! {
            biased;
            _ = token.cancelled() => return false,
            sent = self.events.send(event) => sent,
        };
        if sent.is_err() {
            debug!(session_id = %self.session_id, "Event sink closed");
        }
        true
    }

    fn forget(&self, id: u64) {
        self.pending.lock().retain(|turn| turn.id != id);
    }

    fn commit(&self, exchange: Exchange) {
        let mut history = self.history.lock();
        history.push(exchange);
        let excess = history.len().saturating_sub(self.settings.history_limit);
        history.drain(..excess);
    }

    async fn run_turn(&self, utterance: &Utterance, token: &CancellationToken) -> TurnOutcome {
        let collaborators = &self.collaborators;
        let pcm = utterance.to_pcm();

        let transcript = match cancellable(
            token,
            collaborators
                .transcriber
                .transcribe(&pcm, utterance.sample_rate()),
        )
        .await
        {
            None => return TurnOutcome::Interrupted,
            Some(Err(e)) => return TurnOutcome::Failed(TurnFailure::new(TurnStage::Transcribe, e)),
            Some(Ok(text)) => text,
        };
        if transcript.trim().is_empty() {
            return TurnOutcome::Empty;
        }
        if !self
            .emit(
                SessionEvent::Transcription {
                    text: transcript.clone(),
                },
                token,
            )
            .await
        {
            return TurnOutcome::Interrupted;
        }

        let context = match cancellable(token, collaborators.retriever.retrieve_context(&transcript)).await {
            None => return TurnOutcome::Interrupted,
            Some(Ok(context)) => context,
            Some(Err(e)) => {
                warn!(session_id = %self.session_id, "{e}; continuing without context");
                Vec::new()
            }
        };

        let history = self.history.lock().clone();
        let request = GenerateRequest {
            transcript: &transcript,
            context: &context,
            history: &history,
        };
        let reply = match cancellable(token, collaborators.generator.generate(request)).await {
            None => return TurnOutcome::Interrupted,
            Some(Err(e)) => return TurnOutcome::Failed(TurnFailure::new(TurnStage::Generate, e)),
            Some(Ok(reply)) => reply,
        };
        if !self
            .emit(SessionEvent::AiResponse { text: reply.clone() }, token)
            .await
        {
            return TurnOutcome::Interrupted;
        }

        let epoch = self.scheduler.epoch();
        let mut audio = match cancellable(token, collaborators.synthesizer.synthesize(&reply)).await {
            None => return TurnOutcome::Interrupted,
            Some(Err(e)) => return TurnOutcome::Failed(TurnFailure::new(TurnStage::Synthesize, e)),
            Some(Ok(stream)) => stream,
        };

        let mut speaking = false;
        loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => return TurnOutcome::Interrupted,
                next = audio.next() => next,
            };
            match next {
                None => break,
                Some(Err(e)) => {
                    return TurnOutcome::Failed(TurnFailure::new(TurnStage::Synthesize, e));
                }
                Some(Ok(chunk)) if chunk.is_empty() => continue,
                Some(Ok(chunk)) => {
                    if !speaking {
                        speaking = true;
                        self.state.set(TurnState::Speaking);
                        if !self.emit(SessionEvent::AudioStart, token).await {
                            return TurnOutcome::Interrupted;
                        }
                    }
                    if self.scheduler.try_enqueue(epoch, &chunk).is_none() {
                        return TurnOutcome::Interrupted;
                    }
                }
            }
        }
        drop(audio);

        let exchange = Exchange {
            user: transcript,
            assistant: reply,
        };
        if !speaking {
            return TurnOutcome::Completed(exchange);
        }

        if self.scheduler.try_finish(epoch).is_none() {
            return TurnOutcome::Interrupted;
        }
        if cancellable(token, self.scheduler.wait_idle()).await.is_none() || token.is_cancelled() {
            return TurnOutcome::Interrupted;
        }
        if !self.emit(SessionEvent::AudioEnd, token).await {
            return TurnOutcome::Interrupted;
        }
        TurnOutcome::Completed(exchange)
    }
}
