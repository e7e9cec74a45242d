use super::ServerConfig;
use super::yaml::YamlConfig;

/// Build the final configuration: environment first, then YAML overrides
pub(super) fn merge_config(
    yaml: Option<YamlConfig>,
) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let mut config = ServerConfig::from_env()?;
    let Some(yaml) = yaml else {
        return Ok(config);
    };

    if let Some(server) = yaml.server {
        if let Some(host) = server.host {
            config.host = host;
        }
        if let Some(port) = server.port {
            config.port = port;
        }
    }

    if let Some(providers) = yaml.providers {
        if providers.openai_api_key.is_some() {
            config.openai_api_key = providers.openai_api_key;
        }
        if let Some(url) = providers.openai_base_url {
            config.openai_base_url = url;
        }
        if let Some(model) = providers.openai_stt_model {
            config.openai_stt_model = model;
        }
        if let Some(model) = providers.openai_chat_model {
            config.openai_chat_model = model;
        }
        if providers.elevenlabs_api_key.is_some() {
            config.elevenlabs_api_key = providers.elevenlabs_api_key;
        }
        if let Some(url) = providers.elevenlabs_base_url {
            config.elevenlabs_base_url = url;
        }
        if let Some(voice) = providers.elevenlabs_voice_id {
            config.elevenlabs_voice_id = voice;
        }
        if let Some(model) = providers.elevenlabs_model_id {
            config.elevenlabs_model_id = model;
        }
    }

    if let Some(audio) = yaml.audio {
        if let Some(rate) = audio.inbound_sample_rate {
            config.inbound_format.sample_rate = rate;
        }
        if let Some(ms) = audio.inbound_frame_ms {
            config.inbound_format.frame_duration_ms = ms;
        }
        if let Some(rate) = audio.outbound_sample_rate {
            config.outbound_format.sample_rate = rate;
        }
        if let Some(ms) = audio.outbound_frame_ms {
            config.outbound_format.frame_duration_ms = ms;
        }
    }

    if let Some(vad) = yaml.vad {
        if let Some(mode) = vad.mode {
            config.vad.mode = mode;
        }
        if let Some(threshold) = vad.energy_threshold {
            config.vad.energy_threshold = threshold;
        }
        if let Some(ms) = vad.silence_threshold_ms {
            config.vad.silence_threshold_ms = ms;
        }
        if let Some(policy) = vad.trailing_silence {
            config.vad.trailing_silence = policy;
        }
        if vad.max_utterance_ms.is_some() {
            config.vad.max_utterance_ms = vad.max_utterance_ms;
        }
    }
    config.vad.format = config.inbound_format;

    if let Some(turn) = yaml.turn {
        if let Some(prompt) = turn.system_prompt {
            config.system_prompt = prompt;
        }
        if let Some(history) = turn.history_turns {
            config.history_turns = history;
        }
        if let Some(timeout) = turn.collaborator_timeout_seconds {
            config.collaborator_timeout_seconds = timeout;
        }
    }

    if let Some(security) = yaml.security {
        if security.cors_allowed_origins.is_some() {
            config.cors_allowed_origins = security.cors_allowed_origins;
        }
        if security.max_websocket_connections.is_some() {
            config.max_websocket_connections = security.max_websocket_connections;
        }
        if let Some(per_ip) = security.max_connections_per_ip {
            config.max_connections_per_ip = per_ip;
        }
    }

    Ok(config)
}
