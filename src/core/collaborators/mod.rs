//! External services invoked by a turn.
//!
//! The turn controller only sees the traits in [`base`]; the HTTP clients in
//! [`openai`] and [`elevenlabs`] are the stock implementations wired up by
//! [`from_config`].

pub mod base;
pub mod elevenlabs;
pub mod openai;

use std::sync::Arc;

use anyhow::Result;
use reqwest::Client;

pub use base::{
    AudioStream, Collaborators, ContextRetriever, Exchange, GenerateRequest, Generator, NoContext,
    Synthesizer, Transcriber,
};
pub use elevenlabs::{ElevenLabsConfig, ElevenLabsSynthesizer};
pub use openai::{OpenAIConfig, OpenAIGenerator, OpenAITranscriber};

use crate::config::ServerConfig;

/// Build the HTTP-backed collaborators described by the server config.
///
/// Missing API keys are not an error here; the affected stage reports a
/// configuration error when a turn reaches it.
pub fn from_config(config: &ServerConfig) -> Result<Collaborators> {
    let client = Client::builder()
        .timeout(config.collaborator_timeout())
        .pool_max_idle_per_host(4)
        .build()?;

    let openai = OpenAIConfig {
        api_key: config.openai_api_key.clone().unwrap_or_default(),
        base_url: config.openai_base_url.clone(),
        stt_model: config.openai_stt_model.clone(),
        chat_model: config.openai_chat_model.clone(),
        system_prompt: config.system_prompt.clone(),
        history_turns: config.history_turns,
    };
    let elevenlabs = ElevenLabsConfig {
        api_key: config.elevenlabs_api_key.clone().unwrap_or_default(),
        base_url: config.elevenlabs_base_url.clone(),
        voice_id: config.elevenlabs_voice_id.clone(),
        model_id: config.elevenlabs_model_id.clone(),
        sample_rate: config.outbound_format.sample_rate,
        stability: 0.75,
        similarity_boost: 0.75,
    };

    Ok(Collaborators::new(
        Arc::new(OpenAITranscriber::new(client.clone(), openai.clone())),
        Arc::new(NoContext),
        Arc::new(OpenAIGenerator::new(client.clone(), openai)),
        Arc::new(ElevenLabsSynthesizer::new(client, elevenlabs)),
    ))
}
