use serde::{Deserialize, Serialize};

/// Application context appended to every combiner/KDF input.
pub const DEFAULT_CONTEXT: &str = "tessera-key-agreement-v1";
/// Size of a party's one-time pre-key pool.
pub const DEFAULT_PRE_KEY_COUNT: usize = 10;
/// Bound on cached out-of-order message keys in the forward ratchet.
pub const DEFAULT_MAX_SKIPPED_MESSAGE_KEYS: usize = 256;

/// Symmetric suite used to protect message bodies once a session key exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CipherSuite {
    #[default]
    #[serde(rename = "aes-256-gcm")]
    Aes256Gcm,
    #[serde(rename = "xchacha20-poly1305")]
    XChaCha20Poly1305,
}

/// Deployment-wide protocol settings.
///
/// Two deployments with different `context` values derive unrelated keys
/// from identical Diffie-Hellman inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    pub context: String,
    pub pre_key_count: usize,
    pub cipher: CipherSuite,
    pub max_skipped_message_keys: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            context: DEFAULT_CONTEXT.to_string(),
            pre_key_count: DEFAULT_PRE_KEY_COUNT,
            cipher: CipherSuite::default(),
            max_skipped_message_keys: DEFAULT_MAX_SKIPPED_MESSAGE_KEYS,
        }
    }
}
