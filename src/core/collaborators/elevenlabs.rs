//! ElevenLabs streaming text-to-speech client.
//!
//! Requests raw PCM (`output_format=pcm_<rate>`) so the body can be fed to the
//! outbound scheduler without transcoding.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde_json::json;
use tracing::debug;

use super::base::{AudioStream, Synthesizer};
use crate::errors::CollaboratorError;

pub const DEFAULT_ELEVENLABS_BASE_URL: &str = "https://api.elevenlabs.io/v1";
pub const DEFAULT_VOICE_ID: &str = "21m00Tcm4TlvDq8ikWAM";
pub const DEFAULT_MODEL_ID: &str = "eleven_multilingual_v2";

/// PCM sample rates the streaming endpoint can return
const SUPPORTED_PCM_RATES: [u32; 5] = [8000, 16000, 22050, 24000, 44100];

pub fn supports_sample_rate(sample_rate: u32) -> bool {
    SUPPORTED_PCM_RATES.contains(&sample_rate)
}

#[derive(Debug, Clone)]
pub struct ElevenLabsConfig {
    pub api_key: String,
    pub base_url: String,
    pub voice_id: String,
    pub model_id: String,
    /// Must match the outbound frame format
    pub sample_rate: u32,
    pub stability: f32,
    pub similarity_boost: f32,
}

impl ElevenLabsConfig {
    pub fn output_format(&self) -> Result<String, CollaboratorError> {
        if !supports_sample_rate(self.sample_rate) {
            return Err(CollaboratorError::Configuration(format!(
                "ElevenLabs cannot stream PCM at {} Hz",
                self.sample_rate
            )));
        }
        Ok(format!("pcm_{}", self.sample_rate))
    }

    fn stream_url(&self) -> String {
        format!(
            "{}/text-to-speech/{}/stream",
            self.base_url.trim_end_matches('/'),
            self.voice_id
        )
    }
}

pub struct ElevenLabsSynthesizer {
    client: Client,
    config: ElevenLabsConfig,
}

impl ElevenLabsSynthesizer {
    pub fn new(client: Client, config: ElevenLabsConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl Synthesizer for ElevenLabsSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<AudioStream, CollaboratorError> {
        if self.config.api_key.is_empty() {
            return Err(CollaboratorError::Configuration(
                "ELEVENLABS_API_KEY is not set".to_string(),
            ));
        }
        let output_format = self.config.output_format()?;

        let body = json!({
            "text": text,
            "model_id": self.config.model_id,
            "voice_settings": {
                "stability": self.config.stability,
                "similarity_boost": self.config.similarity_boost,
            },
        });

        let response = self
            .client
            .post(self.config.stream_url())
            .query(&[("output_format", output_format.as_str())])
            .header("xi-api-key", &self.config.api_key)
            .header("Accept", "audio/pcm")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        debug!(chars = text.len(), format = %output_format, "Synthesis stream opened");
        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(CollaboratorError::from))
            .boxed())
    }
}
