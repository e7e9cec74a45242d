use super::ServerConfig;
use crate::core::collaborators::elevenlabs;

/// Validate a merged configuration
pub(super) fn validate(config: &ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    config
        .inbound_format
        .validate()
        .map_err(|e| format!("Invalid inbound audio format: {e}"))?;
    config
        .outbound_format
        .validate()
        .map_err(|e| format!("Invalid outbound audio format: {e}"))?;

    config
        .vad_config()
        .validate()
        .map_err(|e| format!("Invalid VAD configuration: {e}"))?;

    validate_outbound_rate(config.outbound_format.sample_rate)?;

    if config.collaborator_timeout_seconds == 0 {
        return Err("collaborator_timeout_seconds must be greater than 0".into());
    }
    if config.max_connections_per_ip == 0 {
        return Err("max_connections_per_ip must be greater than 0".into());
    }
    if config.max_websocket_connections == Some(0) {
        return Err("max_websocket_connections must be greater than 0 when set".into());
    }

    Ok(())
}

/// The synthesizer streams PCM at the outbound rate, so the rate must be one it offers
fn validate_outbound_rate(sample_rate: u32) -> Result<(), Box<dyn std::error::Error>> {
    if !elevenlabs::supports_sample_rate(sample_rate) {
        return Err(format!("Invalid outbound sample rate: {sample_rate} Hz is not available for streamed PCM").into());
    }
    Ok(())
}
