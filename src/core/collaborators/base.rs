//! Contracts for the services a turn calls out to.
//!
//! Every call may fail or time out. Cancellation is done by dropping the
//! returned future or stream, so implementations must not rely on running
//! to completion.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::errors::{CollaboratorError, ContextRetrievalError};

/// Lazily produced synthesized audio.
///
/// `None` marks the natural end of the reply; dropping the stream cancels the
/// producer.
pub type AudioStream = BoxStream<'static, Result<Bytes, CollaboratorError>>;

/// One completed caller/assistant exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    pub user: String,
    pub assistant: String,
}

/// Input to a reply generation call
#[derive(Debug, Clone, Copy)]
pub struct GenerateRequest<'a> {
    pub transcript: &'a str,
    pub context: &'a [String],
    pub history: &'a [Exchange],
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Convert 16-bit mono PCM at `sample_rate` into text
    async fn transcribe(&self, pcm: &[u8], sample_rate: u32) -> Result<String, CollaboratorError>;
}

#[async_trait]
pub trait ContextRetriever: Send + Sync {
    async fn retrieve_context(&self, text: &str) -> Result<Vec<String>, ContextRetrievalError>;
}

#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, request: GenerateRequest<'_>) -> Result<String, CollaboratorError>;
}

#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Start synthesizing `text` as 16-bit mono PCM in the outbound format
    async fn synthesize(&self, text: &str) -> Result<AudioStream, CollaboratorError>;
}

/// Retriever for deployments without a knowledge base
#[derive(Debug, Clone, Copy, Default)]
pub struct NoContext;

#[async_trait]
impl ContextRetriever for NoContext {
    async fn retrieve_context(&self, _text: &str) -> Result<Vec<String>, ContextRetrievalError> {
        Ok(Vec::new())
    }
}

/// The four services one session's turns depend on
#[derive(Clone)]
pub struct Collaborators {
    pub transcriber: Arc<dyn Transcriber>,
    pub retriever: Arc<dyn ContextRetriever>,
    pub generator: Arc<dyn Generator>,
    pub synthesizer: Arc<dyn Synthesizer>,
}

impl Collaborators {
    pub fn new(
        transcriber: Arc<dyn Transcriber>,
        retriever: Arc<dyn ContextRetriever>,
        generator: Arc<dyn Generator>,
        synthesizer: Arc<dyn Synthesizer>,
    ) -> Self {
        Self {
            transcriber,
            retriever,
            generator,
            synthesizer,
        }
    }

    pub fn with_retriever(mut self, retriever: Arc<dyn ContextRetriever>) -> Self {
        self.retriever = retriever;
        self
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
