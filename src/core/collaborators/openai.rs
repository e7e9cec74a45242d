//! OpenAI transcription and chat completion clients.
//!
//! Transcription uploads the utterance as a WAV file to
//! `{base_url}/audio/transcriptions`; generation posts to
//! `{base_url}/chat/completions` with the system prompt, retrieved context,
//! recent history and the caller's transcript.

use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::json;
use std::io::Cursor;
use tracing::{debug, info};

use super::base::{GenerateRequest, Generator, Transcriber};
use crate::errors::CollaboratorError;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_STT_MODEL: &str = "whisper-1";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";

/// Settings shared by both OpenAI clients
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    pub api_key: String,
    pub base_url: String,
    pub stt_model: String,
    pub chat_model: String,
    pub system_prompt: String,
    /// Number of most recent exchanges sent along with each request
    pub history_turns: usize,
}

impl OpenAIConfig {
    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    fn require_key(&self) -> Result<&str, CollaboratorError> {
        if self.api_key.is_empty() {
            return Err(CollaboratorError::Configuration(
                "OPENAI_API_KEY is not set".to_string(),
            ));
        }
        Ok(&self.api_key)
    }
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorResponse {
    error: OpenAIErrorDetail,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorDetail {
    message: String,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// Turn a non-success response into a provider error
async fn provider_error(response: reqwest::Response) -> CollaboratorError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<OpenAIErrorResponse>(&body) {
        Ok(parsed) => parsed.error.message,
        Err(_) => body,
    };
    CollaboratorError::Provider {
        status: status.as_u16(),
        message,
    }
}

/// Wrap raw PCM in a WAV container
pub fn encode_wav(pcm: &[u8], sample_rate: u32) -> Result<Vec<u8>, CollaboratorError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::with_capacity(44 + pcm.len()));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| CollaboratorError::Encoding(e.to_string()))?;
        for pair in pcm.chunks_exact(2) {
            writer
                .write_sample(i16::from_le_bytes([pair[0], pair[1]]))
                .map_err(|e| CollaboratorError::Encoding(e.to_string()))?;
        }
        writer
            .finalize()
            .map_err(|e| CollaboratorError::Encoding(e.to_string()))?;
    }
    Ok(cursor.into_inner())
}

pub struct OpenAITranscriber {
    client: Client,
    config: OpenAIConfig,
}

impl OpenAITranscriber {
    pub fn new(client: Client, config: OpenAIConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl Transcriber for OpenAITranscriber {
    async fn transcribe(&self, pcm: &[u8], sample_rate: u32) -> Result<String, CollaboratorError> {
        let api_key = self.config.require_key()?;
        let wav = encode_wav(pcm, sample_rate)?;
        debug!(bytes = wav.len(), sample_rate, "Uploading utterance for transcription");

        let file_part = Part::bytes(wav)
            .file_name("utterance.wav")
            .mime_str("audio/wav")
            .map_err(|e| CollaboratorError::Configuration(format!("Invalid MIME type: {e}")))?;
        let form = Form::new()
            .part("file", file_part)
            .text("model", self.config.stt_model.clone())
            .text("response_format", "json");

        let response = self
            .client
            .post(self.config.endpoint("audio/transcriptions"))
            .header("Authorization", format!("Bearer {api_key}"))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(provider_error(response).await);
        }

        let parsed: TranscriptionResponse = response.json().await?;
        let text = parsed.text.trim().to_string();
        info!("Transcription complete: {} characters", text.len());
        Ok(text)
    }
}

pub struct OpenAIGenerator {
    client: Client,
    config: OpenAIConfig,
}

impl OpenAIGenerator {
    pub fn new(client: Client, config: OpenAIConfig) -> Self {
        Self { client, config }
    }

    fn build_messages(&self, request: &GenerateRequest<'_>) -> Vec<serde_json::Value> {
        let mut system = self.config.system_prompt.clone();
        if !request.context.is_empty() {
            system.push_str("\n\nContext:\n");
            system.push_str(&request.context.join("\n"));
        }

        let mut messages = vec![json!({ "role": "system", "content": system })];
        let skip = request.history.len().saturating_sub(self.config.history_turns);
        for exchange in &request.history[skip..] {
            messages.push(json!({ "role": "user", "content": exchange.user }));
            messages.push(json!({ "role": "assistant", "content": exchange.assistant }));
        }
        messages.push(json!({ "role": "user", "content": request.transcript }));
        messages
    }
}

#[async_trait]
impl Generator for OpenAIGenerator {
    async fn generate(&self, request: GenerateRequest<'_>) -> Result<String, CollaboratorError> {
        let api_key = self.config.require_key()?;
        let body = json!({
            "model": self.config.chat_model,
            "messages": self.build_messages(&request),
        });

        let response = self
            .client
            .post(self.config.endpoint("chat/completions"))
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(provider_error(response).await);
        }

        let parsed: ChatCompletionResponse = response.json().await?;
        let reply = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| CollaboratorError::InvalidResponse("completion had no content".to_string()))?;

        info!("Generated reply: {} characters", reply.len());
        Ok(reply)
    }
}
