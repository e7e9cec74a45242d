//! Turn-Taking Tests
//!
//! End-to-end behavior of a call session with scripted collaborators:
//! event ordering, barge-in, stage failures, history and teardown. All tests
//! run on tokio's paused clock so collaborator delays and audio pacing cost
//! no wall time.

mod fixtures;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use fixtures::*;
use turnline_gateway::core::collaborators::{ContextRetriever, NoContext};
use turnline_gateway::core::events::SessionEvent;
use turnline_gateway::core::registry::SessionRegistry;
use turnline_gateway::core::session::{Session, SessionSettings};
use turnline_gateway::core::turn::TurnState;
use turnline_gateway::core::vad::SegmentationMode;
use turnline_gateway::errors::TurnStage;

/// Outbound 16kHz / 20ms
const OUT_FRAME_BYTES: usize = 640;

/// Frames of silence that close an utterance with `settings()`
const CLOSING_SILENCE: usize = 10;

struct Harness {
    session: Session,
    events: mpsc::Receiver<SessionEvent>,
    transcriber: Arc<ScriptedTranscriber>,
    generator: Arc<ScriptedGenerator>,
    synthesizer: Arc<ScriptedSynthesizer>,
}

/// Default formats with a 300ms (10 frame) silence threshold
fn settings() -> SessionSettings {
    let mut settings = SessionSettings::default();
    settings.vad.silence_threshold_ms = 300;
    settings
}

fn harness_with(
    settings: SessionSettings,
    transcriber: ScriptedTranscriber,
    retriever: Arc<dyn ContextRetriever>,
    generator: ScriptedGenerator,
    synthesizer: ScriptedSynthesizer,
) -> Harness {
    harness_buffered(settings, transcriber, retriever, generator, synthesizer, 4096)
}

/// Like [`harness_with`] with an event channel of `capacity`
fn harness_buffered(
    settings: SessionSettings,
    transcriber: ScriptedTranscriber,
    retriever: Arc<dyn ContextRetriever>,
    generator: ScriptedGenerator,
    synthesizer: ScriptedSynthesizer,
    capacity: usize,
) -> Harness {
    let transcriber = Arc::new(transcriber);
    let generator = Arc::new(generator);
    let synthesizer = Arc::new(synthesizer);
    let (tx, rx) = mpsc::channel(capacity);
    let collaborators = scripted(
        transcriber.clone(),
        retriever,
        generator.clone(),
        synthesizer.clone(),
    );
    Harness {
        session: Session::new("test-call", settings, collaborators, tx),
        events: rx,
        transcriber,
        generator,
        synthesizer,
    }
}

fn harness(transcriber: ScriptedTranscriber, synthesizer: ScriptedSynthesizer) -> Harness {
    harness_with(
        settings(),
        transcriber,
        Arc::new(NoContext),
        ScriptedGenerator::new(),
        synthesizer,
    )
}

impl Harness {
    /// Speak for `frames` frames and pause long enough to close the utterance
    fn say(&mut self, frames: usize) {
        self.session.ingest_audio(&speech_frames(frames));
        self.session.ingest_audio(&silence_frames(CLOSING_SILENCE));
    }

    async fn next(&mut self) -> SessionEvent {
        timeout(Duration::from_secs(60), self.events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    /// Collect events up to and including the first one matching `done`
    async fn until(&mut self, done: impl Fn(&SessionEvent) -> bool) -> Vec<SessionEvent> {
        let mut seen = Vec::new();
        loop {
            let event = self.next().await;
            let finished = done(&event);
            seen.push(event);
            if finished {
                return seen;
            }
        }
    }

    /// Let `duration` pass, then return everything emitted meanwhile
    async fn drain_for(&mut self, duration: Duration) -> Vec<SessionEvent> {
        tokio::time::sleep(duration).await;
        std::iter::from_fn(|| self.events.try_recv().ok()).collect()
    }
}

fn ack_count(events: &[SessionEvent]) -> usize {
    events
        .iter()
        .filter(|e| **e == SessionEvent::InterruptAck)
        .count()
}

fn audio_count(events: &[SessionEvent]) -> usize {
    events.iter().filter(|e| e.is_audio()).count()
}

fn errors(events: &[SessionEvent]) -> Vec<TurnStage> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Error { stage, .. } => Some(*stage),
            _ => None,
        })
        .collect()
}

async fn wait_for(condition: impl Fn() -> bool) {
    for _ in 0..10_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition not reached");
}

#[tokio::test(start_paused = true)]
async fn test_turn_events_arrive_in_order() {
    let mut h = harness(
        ScriptedTranscriber::new("what time is it"),
        ScriptedSynthesizer::new(6, OUT_FRAME_BYTES),
    );

    h.say(40);
    let events = h.until(|e| *e == SessionEvent::AudioEnd).await;

    assert_eq!(
        events[0],
        SessionEvent::Transcription {
            text: "what time is it".into()
        }
    );
    assert_eq!(
        events[1],
        SessionEvent::AiResponse {
            text: "reply to what time is it".into()
        }
    );
    assert_eq!(events[2], SessionEvent::AudioStart);
    assert_eq!(audio_count(&events), 6);
    assert_eq!(events.len(), 3 + 6 + 1);

    // Trailing silence is trimmed before transcription
    assert_eq!(*h.transcriber.byte_lengths.lock(), vec![40 * 960]);
    assert_eq!(*h.transcriber.sample_rates.lock(), vec![16000]);
    assert_eq!(*h.synthesizer.texts.lock(), vec!["reply to what time is it"]);

    wait_for(|| h.session.state() == TurnState::Listening).await;
    assert_eq!(h.session.history().len(), 1);
    h.session.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_short_noise_never_starts_a_turn() {
    let mut h = harness(
        ScriptedTranscriber::new("unused"),
        ScriptedSynthesizer::new(1, OUT_FRAME_BYTES),
    );

    h.session.ingest_audio(&noise_frames(200));
    let events = h.drain_for(Duration::from_secs(5)).await;

    assert!(events.is_empty());
    assert_eq!(h.transcriber.call_count(), 0);
    h.session.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_barge_in_while_speaking() {
    let mut h = harness(
        ScriptedTranscriber::new("never mind").then("tell me a story"),
        ScriptedSynthesizer::new(50, OUT_FRAME_BYTES),
    );

    h.say(30);
    let mut before = h.until(|e| *e == SessionEvent::AudioStart).await;
    for _ in 0..5 {
        before.push(h.next().await);
    }
    assert_eq!(audio_count(&before), 5);
    assert_eq!(h.session.state(), TurnState::Speaking);

    // Caller talks over the reply
    h.say(8);
    let after = h
        .until(|e| matches!(e, SessionEvent::Transcription { text } if text == "never mind"))
        .await;

    let acks = after.iter().filter(|e| **e == SessionEvent::InterruptAck).count();
    assert_eq!(acks, 1);
    let ack_at = after
        .iter()
        .position(|e| *e == SessionEvent::InterruptAck)
        .unwrap();
    assert_eq!(audio_count(&after[ack_at..]), 0);
    assert!(!after.contains(&SessionEvent::AudioEnd));

    // The interrupting utterance becomes the next turn
    let rest = h.until(|e| *e == SessionEvent::AudioEnd).await;
    assert_eq!(audio_count(&rest), 50);
    assert!(!rest.contains(&SessionEvent::InterruptAck));

    // The interrupted exchange never reaches history
    let requests = h.generator.recorded();
    assert_eq!(requests.len(), 2);
    assert!(requests[1].history.is_empty());
    wait_for(|| h.session.state() == TurnState::Listening).await;
    let history = h.session.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].user, "never mind");

    h.session.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_barge_in_while_processing_cancels_transcription() {
    let mut h = harness(
        ScriptedTranscriber::new("second question")
            .then("first question")
            .with_delay(Duration::from_millis(800)),
        ScriptedSynthesizer::new(3, OUT_FRAME_BYTES),
    );

    h.say(20);
    wait_for(|| h.transcriber.call_count() == 1).await;
    assert_eq!(h.session.state(), TurnState::Processing);

    h.say(20);
    let events = h.until(|e| *e == SessionEvent::AudioEnd).await;

    assert_eq!(events[0], SessionEvent::InterruptAck);
    assert!(h.transcriber.cancelled.load(Ordering::SeqCst));
    assert_eq!(h.transcriber.call_count(), 2);
    // The cancelled call never produced a transcription
    let transcriptions: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Transcription { text } => Some(text.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(transcriptions, vec!["second question".to_string()]);

    h.session.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_second_utterance_in_one_chunk_replaces_the_first() {
    let mut h = harness(
        ScriptedTranscriber::new("latest"),
        ScriptedSynthesizer::new(3, OUT_FRAME_BYTES),
    );

    // Both utterances close before the worker picks up the first
    let mut pcm = speech_frames(10);
    pcm.extend(silence_frames(CLOSING_SILENCE));
    pcm.extend(speech_frames(10));
    pcm.extend(silence_frames(CLOSING_SILENCE));
    h.session.ingest_audio(&pcm);

    let mut events = h.until(|e| *e == SessionEvent::AudioEnd).await;
    assert_eq!(events[0], SessionEvent::InterruptAck);
    events.extend(h.drain_for(Duration::from_secs(2)).await);

    assert_eq!(ack_count(&events), 1);
    assert_eq!(events.iter().filter(|e| **e == SessionEvent::AudioEnd).count(), 1);
    assert_eq!(h.transcriber.call_count(), 1);
    assert_eq!(h.session.history().len(), 1);

    h.session.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_length_capped_speech_queues_fragments() {
    let mut settings = settings();
    settings.vad.max_utterance_ms = Some(300);
    let mut h = harness_with(
        settings,
        ScriptedTranscriber::new("long").with_delay(Duration::from_millis(500)),
        Arc::new(NoContext),
        ScriptedGenerator::new(),
        ScriptedSynthesizer::new(1, OUT_FRAME_BYTES),
    );

    // Real-time pacing so the first fragment is mid-transcription while
    // the caller keeps talking
    for _ in 0..25 {
        h.session.ingest_audio(&speech_frames(1));
        tokio::time::sleep(Duration::from_millis(30)).await;
    }
    h.session.ingest_audio(&silence_frames(CLOSING_SILENCE));

    wait_for(|| h.session.history().len() == 3).await;
    let events = h.drain_for(Duration::from_secs(1)).await;

    assert_eq!(ack_count(&events), 0);
    assert_eq!(events.iter().filter(|e| **e == SessionEvent::AudioEnd).count(), 3);
    assert!(!h.transcriber.cancelled.load(Ordering::SeqCst));
    assert_eq!(*h.transcriber.byte_lengths.lock(), vec![9600, 9600, 4800]);

    h.session.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_barge_in_stops_reply_within_a_frame() {
    let mut h = harness(
        ScriptedTranscriber::new("talk to me"),
        ScriptedSynthesizer::new(500, OUT_FRAME_BYTES),
    );

    h.say(10);
    let mut events = Vec::new();
    while audio_count(&events) < 10 {
        events.push(h.next().await);
    }

    h.session.ingest_audio(&speech_frames(1));
    assert_eq!(h.session.handle().queued_frames(), 0);

    events.extend(h.drain_for(Duration::from_secs(2)).await);
    let sent = audio_count(&events);
    assert!((10..=11).contains(&sent), "{sent} frames sent");
    assert_eq!(ack_count(&events), 1);
    assert!(!events.contains(&SessionEvent::AudioEnd));

    h.session.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_interrupt_ack_survives_full_event_channel() {
    let mut h = harness_buffered(
        settings(),
        ScriptedTranscriber::new("hello"),
        Arc::new(NoContext),
        ScriptedGenerator::new(),
        ScriptedSynthesizer::new(200, OUT_FRAME_BYTES),
        8,
    );

    h.say(10);
    wait_for(|| h.session.state() == TurnState::Speaking).await;
    // Nobody reads while the pacing loop fills the channel
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(h.session.interrupt());

    let events = h.until(|e| *e == SessionEvent::InterruptAck).await;
    assert_eq!(events[0], SessionEvent::Transcription { text: "hello".into() });

    let after = h.drain_for(Duration::from_secs(2)).await;
    assert_eq!(ack_count(&after), 0);
    assert_eq!(audio_count(&after), 0);
    assert!(!after.contains(&SessionEvent::AudioEnd));
    assert_eq!(h.session.state(), TurnState::Listening);

    h.session.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_interrupt_reaches_turn_blocked_on_events() {
    let mut h = harness_buffered(
        settings(),
        ScriptedTranscriber::new("hello"),
        Arc::new(NoContext),
        ScriptedGenerator::new(),
        ScriptedSynthesizer::new(5, OUT_FRAME_BYTES),
        2,
    );

    // Transcription and ai_response fill the channel, audio_start waits
    h.say(10);
    wait_for(|| h.session.state() == TurnState::Speaking).await;
    assert!(h.session.interrupt());

    assert!(matches!(h.next().await, SessionEvent::Transcription { .. }));
    assert!(matches!(h.next().await, SessionEvent::AiResponse { .. }));
    assert_eq!(h.next().await, SessionEvent::InterruptAck);

    let after = h.drain_for(Duration::from_secs(1)).await;
    assert!(after.is_empty(), "unexpected {after:?}");
    assert_eq!(h.session.state(), TurnState::Listening);
    assert!(h.session.history().is_empty());

    h.session.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_explicit_interrupt() {
    let mut h = harness(
        ScriptedTranscriber::new("hello"),
        ScriptedSynthesizer::new(100, OUT_FRAME_BYTES),
    );

    // Nothing to interrupt yet
    assert!(!h.session.interrupt());

    h.say(10);
    h.until(|e| e.is_audio()).await;
    assert!(h.session.interrupt());
    assert!(!h.session.interrupt());

    let after = h.drain_for(Duration::from_secs(3)).await;
    let ack_at = after
        .iter()
        .position(|e| *e == SessionEvent::InterruptAck)
        .expect("interrupt_ack");
    assert_eq!(audio_count(&after[ack_at..]), 0);
    assert!(!after.contains(&SessionEvent::AudioEnd));
    assert_eq!(h.session.state(), TurnState::Listening);
    assert!(h.session.history().is_empty());

    h.session.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_transcription_failure() {
    let mut h = harness(
        ScriptedTranscriber::new("recovered").then_fail(),
        ScriptedSynthesizer::new(2, OUT_FRAME_BYTES),
    );

    h.say(10);
    let events = h.until(|e| matches!(e, SessionEvent::Error { .. })).await;
    assert_eq!(events.len(), 1);
    match &events[0] {
        SessionEvent::Error { stage, message } => {
            assert_eq!(*stage, TurnStage::Transcribe);
            assert_eq!(message, "Speech-to-text failed.");
        }
        other => panic!("unexpected event: {other:?}"),
    }

    let quiet = h.drain_for(Duration::from_secs(2)).await;
    assert!(quiet.is_empty());
    assert_eq!(h.session.state(), TurnState::Listening);
    assert_eq!(h.synthesizer.call_count(), 0);

    // The next utterance is handled normally
    h.say(10);
    let events = h.until(|e| *e == SessionEvent::AudioEnd).await;
    assert!(errors(&events).is_empty());
    h.session.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_generation_failure() {
    let mut h = harness_with(
        settings(),
        ScriptedTranscriber::new("hi"),
        Arc::new(NoContext),
        ScriptedGenerator::failing(),
        ScriptedSynthesizer::new(2, OUT_FRAME_BYTES),
    );

    h.say(10);
    let mut events = h.until(|e| matches!(e, SessionEvent::Error { .. })).await;
    events.extend(h.drain_for(Duration::from_secs(2)).await);

    assert_eq!(errors(&events), vec![TurnStage::Generate]);
    assert!(!events.iter().any(|e| matches!(e, SessionEvent::AiResponse { .. })));
    assert_eq!(audio_count(&events), 0);
    assert_eq!(h.session.state(), TurnState::Listening);
    assert!(h.session.history().is_empty());
    h.session.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_synthesis_failure_before_audio() {
    let mut h = harness(
        ScriptedTranscriber::new("hi"),
        ScriptedSynthesizer::new(5, OUT_FRAME_BYTES).with_failure(SynthFailure::Immediately),
    );

    h.say(10);
    let mut events = h.until(|e| matches!(e, SessionEvent::Error { .. })).await;
    events.extend(h.drain_for(Duration::from_secs(2)).await);

    assert_eq!(errors(&events), vec![TurnStage::Synthesize]);
    assert!(!events.contains(&SessionEvent::AudioStart));
    assert_eq!(audio_count(&events), 0);
    assert_eq!(h.session.state(), TurnState::Listening);
    h.session.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_synthesis_failure_mid_stream_stops_audio() {
    let mut h = harness(
        ScriptedTranscriber::new("hi"),
        ScriptedSynthesizer::new(40, OUT_FRAME_BYTES)
            .with_chunk_delay(Duration::from_millis(20))
            .with_failure(SynthFailure::AfterChunks(10)),
    );

    h.say(10);
    let before = h.until(|e| matches!(e, SessionEvent::Error { .. })).await;
    let after = h.drain_for(Duration::from_secs(2)).await;

    assert!(before.contains(&SessionEvent::AudioStart));
    assert!(audio_count(&before) <= 10);
    assert_eq!(audio_count(&after), 0);
    assert!(errors(&after).is_empty());
    assert!(!before.contains(&SessionEvent::AudioEnd));
    assert_eq!(h.session.state(), TurnState::Listening);
    assert!(h.session.history().is_empty());
    h.session.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_retrieval_failure_does_not_fail_turn() {
    let mut h = harness_with(
        settings(),
        ScriptedTranscriber::new("opening hours"),
        Arc::new(FailingRetriever),
        ScriptedGenerator::new(),
        ScriptedSynthesizer::new(2, OUT_FRAME_BYTES),
    );

    h.say(10);
    let events = h.until(|e| *e == SessionEvent::AudioEnd).await;

    assert!(errors(&events).is_empty());
    let requests = h.generator.recorded();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].context.is_empty());
    h.session.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_context_reaches_generator() {
    let context = vec!["Store opens at 9am.".to_string()];
    let mut h = harness_with(
        settings(),
        ScriptedTranscriber::new("opening hours"),
        Arc::new(FixedContext(context.clone())),
        ScriptedGenerator::new(),
        ScriptedSynthesizer::new(1, OUT_FRAME_BYTES),
    );

    h.say(10);
    h.until(|e| *e == SessionEvent::AudioEnd).await;
    assert_eq!(h.generator.recorded()[0].context, context);
    h.session.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_history_is_capped_and_passed_forward() {
    let mut settings = settings();
    settings.turn.history_limit = 2;
    let mut h = harness_with(
        settings,
        ScriptedTranscriber::new("four").then("one").then("two").then("three"),
        Arc::new(NoContext),
        ScriptedGenerator::new(),
        ScriptedSynthesizer::new(1, OUT_FRAME_BYTES),
    );

    for _ in 0..4 {
        h.say(10);
        h.until(|e| *e == SessionEvent::AudioEnd).await;
        wait_for(|| h.session.state() == TurnState::Listening).await;
    }

    let requests = h.generator.recorded();
    let seen: Vec<usize> = requests.iter().map(|r| r.history.len()).collect();
    assert_eq!(seen, vec![0, 1, 2, 2]);
    assert_eq!(requests[3].history[0].user, "two");

    let history = h.session.history();
    let users: Vec<_> = history.iter().map(|x| x.user.as_str()).collect();
    assert_eq!(users, vec!["three", "four"]);
    h.session.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_empty_transcript_is_skipped_quietly() {
    let mut h = harness(
        ScriptedTranscriber::new("now it works").then("   "),
        ScriptedSynthesizer::new(1, OUT_FRAME_BYTES),
    );

    h.say(10);
    let quiet = h.drain_for(Duration::from_secs(1)).await;
    assert!(quiet.is_empty());
    assert_eq!(h.session.state(), TurnState::Listening);

    h.say(10);
    let events = h.until(|e| *e == SessionEvent::AudioEnd).await;
    assert_eq!(
        events[0],
        SessionEvent::Transcription {
            text: "now it works".into()
        }
    );
    h.session.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_manual_mode_uses_end_utterance() {
    let mut settings = settings();
    settings.vad.mode = SegmentationMode::Manual;
    let mut h = harness_with(
        settings,
        ScriptedTranscriber::new("push to talk"),
        Arc::new(NoContext),
        ScriptedGenerator::new(),
        ScriptedSynthesizer::new(1, OUT_FRAME_BYTES),
    );

    h.session.ingest_audio(&speech_frames(5));
    h.session.ingest_audio(&silence_frames(200));
    // Half a frame left in the framer
    h.session.ingest_audio(&silence_frames(1)[..480]);
    assert!(h.drain_for(Duration::from_secs(1)).await.is_empty());

    assert!(h.session.end_utterance());
    h.until(|e| *e == SessionEvent::AudioEnd).await;
    // The partial frame was padded and included
    assert_eq!(*h.transcriber.byte_lengths.lock(), vec![206 * 960]);

    // Nothing buffered any more
    assert!(!h.session.end_utterance());
    h.session.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_end_utterance_when_padded_frame_closes_it() {
    let mut h = harness(
        ScriptedTranscriber::new("just in time"),
        ScriptedSynthesizer::new(1, OUT_FRAME_BYTES),
    );

    h.session.ingest_audio(&speech_frames(10));
    h.session.ingest_audio(&silence_frames(CLOSING_SILENCE - 1));
    h.session.ingest_audio(&silence_frames(1)[..480]);
    assert!(h.drain_for(Duration::from_millis(100)).await.is_empty());

    // The padded half frame is the last silence frame needed
    assert!(h.session.end_utterance());
    h.until(|e| *e == SessionEvent::AudioEnd).await;
    assert_eq!(h.transcriber.call_count(), 1);
    assert!(!h.session.end_utterance());

    h.session.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_close_cancels_in_flight_call() {
    let registry = SessionRegistry::new();
    let mut h = harness(
        ScriptedTranscriber::new("slow").with_delay(Duration::from_secs(30)),
        ScriptedSynthesizer::new(1, OUT_FRAME_BYTES),
    );
    registry.register(h.session.handle());

    h.say(10);
    wait_for(|| h.transcriber.call_count() == 1).await;

    h.session.close().await;
    registry.remove(h.session.id());

    assert!(h.transcriber.cancelled.load(Ordering::SeqCst));
    assert!(h.session.is_closed());
    assert!(registry.is_empty());

    // Input after close is ignored
    h.say(10);
    let events = h.drain_for(Duration::from_secs(60)).await;
    assert!(events.is_empty());
    assert_eq!(h.transcriber.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_registry_shutdown_stops_session() {
    let registry = SessionRegistry::new();
    let mut h = harness(
        ScriptedTranscriber::new("hello"),
        ScriptedSynthesizer::new(200, OUT_FRAME_BYTES),
    );
    registry.register(h.session.handle());

    h.say(10);
    h.until(|e| e.is_audio()).await;
    assert_eq!(registry.active_turns(), 1);

    registry.shutdown_all();
    let after = h.drain_for(Duration::from_secs(5)).await;
    assert!(audio_count(&after) <= 1);
    assert!(h.session.is_closed());
    h.session.close().await;
}
