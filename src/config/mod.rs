//! Configuration module for the turnline gateway
//!
//! This module handles server configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//! - `utils`: Utility functions for configuration parsing
//!
//! # Example
//! ```rust,no_run
//! use turnline_gateway::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::time::Duration;

mod env;
mod merge;
mod utils;
mod validation;
mod yaml;

use crate::core::audio::FrameFormat;
use crate::core::collaborators::elevenlabs::{
    DEFAULT_ELEVENLABS_BASE_URL, DEFAULT_MODEL_ID, DEFAULT_VOICE_ID,
};
use crate::core::collaborators::openai::{
    DEFAULT_CHAT_MODEL, DEFAULT_OPENAI_BASE_URL, DEFAULT_STT_MODEL,
};
use crate::core::vad::VADConfig;

/// Prompt used when none is configured
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a professional, concise, highly efficient assistant. \
Always reply in clear English, 20 words or fewer unless more is necessary.";

/// Server configuration
///
/// Contains everything needed to run the gateway:
/// - Server settings (host, port)
/// - Collaborator endpoints and API keys (OpenAI, ElevenLabs)
/// - Inbound/outbound audio framing and segmentation
/// - Turn settings (prompt, history, timeouts)
/// - Security settings (CORS, connection limits)
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    // OpenAI (transcription + generation)
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_stt_model: String,
    pub openai_chat_model: String,

    // ElevenLabs (synthesis)
    pub elevenlabs_api_key: Option<String>,
    pub elevenlabs_base_url: String,
    pub elevenlabs_voice_id: String,
    pub elevenlabs_model_id: String,

    // Audio framing
    /// Format of caller audio arriving over the socket
    pub inbound_format: FrameFormat,
    /// Format of synthesized audio sent back, paced one frame at a time
    pub outbound_format: FrameFormat,

    /// Segmentation settings; the frame format is taken from `inbound_format`
    pub vad: VADConfig,

    // Turn settings
    pub system_prompt: String,
    /// Completed exchanges sent back to the generator as history
    pub history_turns: usize,
    /// Timeout applied to every collaborator HTTP call
    pub collaborator_timeout_seconds: u64,

    // Security configuration
    /// CORS allowed origins (comma-separated list or "*" for all)
    /// Default: None (CORS disabled, same-origin only)
    pub cors_allowed_origins: Option<String>,

    // Connection limits
    /// Maximum concurrent WebSocket connections
    /// Default: None (unlimited)
    pub max_websocket_connections: Option<usize>,
    /// Maximum connections per IP address
    /// Default: 100
    pub max_connections_per_ip: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            openai_api_key: None,
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            openai_stt_model: DEFAULT_STT_MODEL.to_string(),
            openai_chat_model: DEFAULT_CHAT_MODEL.to_string(),
            elevenlabs_api_key: None,
            elevenlabs_base_url: DEFAULT_ELEVENLABS_BASE_URL.to_string(),
            elevenlabs_voice_id: DEFAULT_VOICE_ID.to_string(),
            elevenlabs_model_id: DEFAULT_MODEL_ID.to_string(),
            inbound_format: FrameFormat::new(16000, 30),
            outbound_format: FrameFormat::new(16000, 20),
            vad: VADConfig::default(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            history_turns: 10,
            collaborator_timeout_seconds: 30,
            cors_allowed_origins: None,
            max_websocket_connections: None,
            max_connections_per_ip: 100,
        }
    }
}

/// Implement Drop to zeroize all secret fields when ServerConfig is dropped.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.openai_api_key {
            key.zeroize();
        }
        if let Some(ref mut key) = self.elevenlabs_api_key {
            key.zeroize();
        }
    }
}

impl ServerConfig {
    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// After loading and merging, performs validation on the final configuration.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        // .env is loaded in main.rs before we get here
        let yaml_config = yaml::YamlConfig::from_file(path)?;
        let config = merge::merge_config(Some(yaml_config))?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Get the server address as a string
    ///
    /// Returns the address in the format "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Segmenter settings bound to the inbound frame format
    pub fn vad_config(&self) -> VADConfig {
        let mut vad = self.vad.clone();
        vad.format = self.inbound_format;
        vad
    }

    pub fn collaborator_timeout(&self) -> Duration {
        Duration::from_secs(self.collaborator_timeout_seconds)
    }

    /// Get API key for a specific provider
    ///
    /// Returns an error message naming the missing variable
    pub fn get_api_key(&self, provider: &str) -> Result<String, String> {
        let (key, var) = match provider.to_lowercase().as_str() {
            "openai" => (&self.openai_api_key, "OPENAI_API_KEY"),
            "elevenlabs" => (&self.elevenlabs_api_key, "ELEVENLABS_API_KEY"),
            other => return Err(format!("Unsupported provider: {other}")),
        };
        key.clone()
            .ok_or_else(|| format!("{provider} API key not configured (set {var})"))
    }
}
