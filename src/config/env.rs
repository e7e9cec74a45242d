use super::ServerConfig;
use super::utils::{env_parse, env_parse_opt, env_string};
use crate::core::audio::FrameFormat;
use crate::core::vad::{SegmentationMode, TrailingSilence, VADConfig};

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// Unset variables fall back to the defaults in [`ServerConfig::default`].
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let defaults = ServerConfig::default();
        let vad_defaults = VADConfig::default();

        let inbound_format = FrameFormat::new(
            env_parse("INBOUND_SAMPLE_RATE", defaults.inbound_format.sample_rate)?,
            env_parse("INBOUND_FRAME_MS", defaults.inbound_format.frame_duration_ms)?,
        );
        let outbound_format = FrameFormat::new(
            env_parse("OUTBOUND_SAMPLE_RATE", defaults.outbound_format.sample_rate)?,
            env_parse("OUTBOUND_FRAME_MS", defaults.outbound_format.frame_duration_ms)?,
        );

        let vad = VADConfig {
            energy_threshold: env_parse("VAD_ENERGY_THRESHOLD", vad_defaults.energy_threshold)?,
            silence_threshold_ms: env_parse(
                "VAD_SILENCE_THRESHOLD_MS",
                vad_defaults.silence_threshold_ms,
            )?,
            trailing_silence: env_parse::<TrailingSilence>(
                "VAD_TRAILING_SILENCE",
                vad_defaults.trailing_silence,
            )?,
            mode: env_parse::<SegmentationMode>("VAD_MODE", vad_defaults.mode)?,
            max_utterance_ms: env_parse_opt("VAD_MAX_UTTERANCE_MS")?,
            format: inbound_format,
            ..vad_defaults
        };

        Ok(ServerConfig {
            host: env_string("HOST").unwrap_or_else(|| defaults.host.clone()),
            port: env_parse("PORT", defaults.port)?,
            openai_api_key: env_string("OPENAI_API_KEY"),
            openai_base_url: env_string("OPENAI_BASE_URL")
                .unwrap_or_else(|| defaults.openai_base_url.clone()),
            openai_stt_model: env_string("OPENAI_STT_MODEL")
                .unwrap_or_else(|| defaults.openai_stt_model.clone()),
            openai_chat_model: env_string("OPENAI_CHAT_MODEL")
                .unwrap_or_else(|| defaults.openai_chat_model.clone()),
            elevenlabs_api_key: env_string("ELEVENLABS_API_KEY"),
            elevenlabs_base_url: env_string("ELEVENLABS_BASE_URL")
                .unwrap_or_else(|| defaults.elevenlabs_base_url.clone()),
            elevenlabs_voice_id: env_string("ELEVENLABS_VOICE_ID")
                .unwrap_or_else(|| defaults.elevenlabs_voice_id.clone()),
            elevenlabs_model_id: env_string("ELEVENLABS_MODEL_ID")
                .unwrap_or_else(|| defaults.elevenlabs_model_id.clone()),
            inbound_format,
            outbound_format,
            vad,
            system_prompt: env_string("SYSTEM_PROMPT")
                .unwrap_or_else(|| defaults.system_prompt.clone()),
            history_turns: env_parse("HISTORY_TURNS", defaults.history_turns)?,
            collaborator_timeout_seconds: env_parse(
                "COLLABORATOR_TIMEOUT_SECONDS",
                defaults.collaborator_timeout_seconds,
            )?,
            cors_allowed_origins: env_string("CORS_ALLOWED_ORIGINS"),
            max_websocket_connections: env_parse_opt("MAX_WEBSOCKET_CONNECTIONS")?,
            max_connections_per_ip: env_parse(
                "MAX_CONNECTIONS_PER_IP",
                defaults.max_connections_per_ip,
            )?,
        })
    }
}
