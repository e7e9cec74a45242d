use serde::Deserialize;
use std::path::PathBuf;

use crate::core::vad::{SegmentationMode, TrailingSilence};

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values given here
/// override environment variables.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 3001
///
/// providers:
///   openai_api_key: "sk-..."
///   openai_chat_model: "gpt-4o-mini"
///   elevenlabs_api_key: "your-elevenlabs-key"
///   elevenlabs_voice_id: "21m00Tcm4TlvDq8ikWAM"
///
/// audio:
///   inbound_sample_rate: 16000
///   inbound_frame_ms: 30
///   outbound_sample_rate: 16000
///   outbound_frame_ms: 20
///
/// vad:
///   mode: vad
///   energy_threshold: 0.02
///   silence_threshold_ms: 3000
///   trailing_silence: trim
///
/// turn:
///   system_prompt: "You are a concise assistant."
///   history_turns: 10
///   collaborator_timeout_seconds: 30
///
/// security:
///   cors_allowed_origins: "https://app.example.com"
///   max_websocket_connections: 500
///   max_connections_per_ip: 20
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub providers: Option<ProvidersYaml>,
    pub audio: Option<AudioYaml>,
    pub vad: Option<VadYaml>,
    pub turn: Option<TurnYaml>,
    pub security: Option<SecurityYaml>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Collaborator endpoints and keys from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ProvidersYaml {
    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub openai_stt_model: Option<String>,
    pub openai_chat_model: Option<String>,
    pub elevenlabs_api_key: Option<String>,
    pub elevenlabs_base_url: Option<String>,
    pub elevenlabs_voice_id: Option<String>,
    pub elevenlabs_model_id: Option<String>,
}

/// Frame formats from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AudioYaml {
    pub inbound_sample_rate: Option<u32>,
    pub inbound_frame_ms: Option<u32>,
    pub outbound_sample_rate: Option<u32>,
    pub outbound_frame_ms: Option<u32>,
}

/// Segmentation settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct VadYaml {
    pub mode: Option<SegmentationMode>,
    pub energy_threshold: Option<f32>,
    pub silence_threshold_ms: Option<u32>,
    pub trailing_silence: Option<TrailingSilence>,
    pub max_utterance_ms: Option<u32>,
}

/// Turn settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TurnYaml {
    pub system_prompt: Option<String>,
    pub history_turns: Option<usize>,
    pub collaborator_timeout_seconds: Option<u64>,
}

/// Security settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SecurityYaml {
    pub cors_allowed_origins: Option<String>,
    pub max_websocket_connections: Option<usize>,
    pub max_connections_per_ip: Option<u32>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if:
    /// - The file cannot be read
    /// - The YAML is malformed
    /// - Fields have invalid types
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}
