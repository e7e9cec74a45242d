//! Scripted collaborators
//!
//! In-process stand-ins for the transcription, retrieval, generation and
//! synthesis services. Each one records how it was called and can be told to
//! stall or fail so tests can land a barge-in or error at a precise stage.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use turnline_gateway::core::collaborators::{
    AudioStream, Collaborators, ContextRetriever, Exchange, GenerateRequest, Generator,
    Synthesizer, Transcriber,
};
use turnline_gateway::errors::{CollaboratorError, ContextRetrievalError};

/// Sets a flag if dropped before [`CancelGuard::disarm`]
struct CancelGuard {
    flag: Arc<AtomicBool>,
    armed: bool,
}

impl CancelGuard {
    fn new(flag: Arc<AtomicBool>) -> Self {
        Self { flag, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if self.armed {
            self.flag.store(true, Ordering::SeqCst);
        }
    }
}

fn provider_error() -> CollaboratorError {
    CollaboratorError::Provider {
        status: 500,
        message: "scripted failure".to_string(),
    }
}

// =============================================================================
// Transcriber
// =============================================================================

/// Returns queued transcripts in order, then `fallback`
pub struct ScriptedTranscriber {
    queue: Mutex<VecDeque<Result<String, CollaboratorError>>>,
    fallback: String,
    delay: Duration,
    pub calls: AtomicUsize,
    /// Set when an in-flight call was cancelled
    pub cancelled: Arc<AtomicBool>,
    pub sample_rates: Mutex<Vec<u32>>,
    pub byte_lengths: Mutex<Vec<usize>>,
}

impl ScriptedTranscriber {
    pub fn new(fallback: &str) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            fallback: fallback.to_string(),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            cancelled: Arc::new(AtomicBool::new(false)),
            sample_rates: Mutex::new(Vec::new()),
            byte_lengths: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn then(self, transcript: &str) -> Self {
        self.queue.lock().push_back(Ok(transcript.to_string()));
        self
    }

    pub fn then_fail(self) -> Self {
        self.queue.lock().push_back(Err(provider_error()));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    async fn transcribe(&self, pcm: &[u8], sample_rate: u32) -> Result<String, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.sample_rates.lock().push(sample_rate);
        self.byte_lengths.lock().push(pcm.len());

        // Claim the scripted result up front so a cancelled call consumes it
        let next = self.queue.lock().pop_front();

        let guard = CancelGuard::new(self.cancelled.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        guard.disarm();

        next.unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

// =============================================================================
// Retriever
// =============================================================================

pub struct FixedContext(pub Vec<String>);

#[async_trait]
impl ContextRetriever for FixedContext {
    async fn retrieve_context(&self, _text: &str) -> Result<Vec<String>, ContextRetrievalError> {
        Ok(self.0.clone())
    }
}

pub struct FailingRetriever;

#[async_trait]
impl ContextRetriever for FailingRetriever {
    async fn retrieve_context(&self, _text: &str) -> Result<Vec<String>, ContextRetrievalError> {
        Err(ContextRetrievalError("vector store unreachable".to_string()))
    }
}

// =============================================================================
// Generator
// =============================================================================

/// What the generator saw on one call
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub transcript: String,
    pub context: Vec<String>,
    pub history: Vec<Exchange>,
}

/// Replies `reply to <transcript>`
pub struct ScriptedGenerator {
    fail: bool,
    delay: Duration,
    pub requests: Mutex<Vec<RecordedRequest>>,
    pub cancelled: Arc<AtomicBool>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self {
            fail: false,
            delay: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn recorded(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }
}

impl Default for ScriptedGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, request: GenerateRequest<'_>) -> Result<String, CollaboratorError> {
        self.requests.lock().push(RecordedRequest {
            transcript: request.transcript.to_string(),
            context: request.context.to_vec(),
            history: request.history.to_vec(),
        });

        let guard = CancelGuard::new(self.cancelled.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        guard.disarm();

        if self.fail {
            return Err(provider_error());
        }
        Ok(format!("reply to {}", request.transcript))
    }
}

// =============================================================================
// Synthesizer
// =============================================================================

/// When the synthesizer breaks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthFailure {
    None,
    /// `synthesize` itself errors
    Immediately,
    /// The stream yields this many chunks, then an error
    AfterChunks(usize),
}

/// Streams `chunks` chunks of `chunk_bytes` non-zero bytes
pub struct ScriptedSynthesizer {
    chunks: usize,
    chunk_bytes: usize,
    chunk_delay: Duration,
    failure: SynthFailure,
    pub calls: AtomicUsize,
    pub texts: Mutex<Vec<String>>,
}

impl ScriptedSynthesizer {
    pub fn new(chunks: usize, chunk_bytes: usize) -> Self {
        Self {
            chunks,
            chunk_bytes,
            chunk_delay: Duration::ZERO,
            failure: SynthFailure::None,
            calls: AtomicUsize::new(0),
            texts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    pub fn with_failure(mut self, failure: SynthFailure) -> Self {
        self.failure = failure;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Synthesizer for ScriptedSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<AudioStream, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.texts.lock().push(text.to_string());

        if self.failure == SynthFailure::Immediately {
            return Err(provider_error());
        }

        let fail_after = match self.failure {
            SynthFailure::AfterChunks(n) => Some(n),
            _ => None,
        };
        let total = self.chunks;
        let chunk = Bytes::from(vec![0x11u8; self.chunk_bytes]);
        let delay = self.chunk_delay;

        let stream = futures::stream::unfold(0usize, move |sent| {
            let chunk = chunk.clone();
            async move {
                if let Some(n) = fail_after
                    && sent == n
                {
                    return Some((Err(provider_error()), usize::MAX));
                }
                if sent >= total {
                    return None;
                }
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Some((Ok(chunk), sent + 1))
            }
        });
        Ok(stream.boxed())
    }
}

/// Bundle scripted collaborators
pub fn scripted(
    transcriber: Arc<ScriptedTranscriber>,
    retriever: Arc<dyn ContextRetriever>,
    generator: Arc<ScriptedGenerator>,
    synthesizer: Arc<ScriptedSynthesizer>,
) -> Collaborators {
    Collaborators::new(transcriber, retriever, generator, synthesizer)
}
