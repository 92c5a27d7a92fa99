use std::path::Path;

use tessera_crypto::ProtocolConfig;

use crate::error::ProtocolError;

/// Largest pool a bundle may advertise.
pub const MAX_PRE_KEY_COUNT: usize = 255;

/// Parse and validate a JSON configuration document. Missing fields take
/// their defaults.
pub fn load_config(json: &str) -> Result<ProtocolConfig, ProtocolError> {
    let config: ProtocolConfig = serde_json::from_str(json)
        .map_err(|e| ProtocolError::InvalidConfig(format!("config JSON: {e}")))?;
    validate(&config)?;
    Ok(config)
}

pub fn load_config_file(path: impl AsRef<Path>) -> Result<ProtocolConfig, ProtocolError> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path).map_err(|e| {
        ProtocolError::InvalidConfig(format!("failed to read {}: {e}", path.display()))
    })?;
    let config = load_config(&json)?;
    tracing::debug!(
        path = %path.display(),
        context = %config.context,
        pre_key_count = config.pre_key_count,
        cipher = ?config.cipher,
        "loaded protocol config"
    );
    Ok(config)
}

pub fn validate(config: &ProtocolConfig) -> Result<(), ProtocolError> {
    if config.context.is_empty() {
        return Err(ProtocolError::InvalidConfig(
            "context must not be empty".into(),
        ));
    }
    if !(1..=MAX_PRE_KEY_COUNT).contains(&config.pre_key_count) {
        return Err(ProtocolError::InvalidConfig(format!(
            "pre_key_count must be between 1 and {MAX_PRE_KEY_COUNT}, got {}",
            config.pre_key_count
        )));
    }
    if config.max_skipped_message_keys == 0 {
        return Err(ProtocolError::InvalidConfig(
            "max_skipped_message_keys must be non-zero".into(),
        ));
    }
    Ok(())
}
