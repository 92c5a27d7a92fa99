//! JSON wire format for bundles and initial messages.
//!
//! Every byte field travels as standard base64, KEM material included, so
//! one decoder handles the whole document. Fixed-size keys and signatures
//! are length-checked on the way in.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tessera_crypto::{
    Bundle, ClassicalBundle, EncryptedMessage, HybridBundle, SignedPreKeyPublic,
};

use crate::error::ProtocolError;

#[derive(Debug, Serialize, Deserialize)]
struct SignedPreKeyWire {
    public_key: String,
    signature: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "variant", rename_all = "lowercase")]
enum BundleWire {
    Classical {
        identity_key: String,
        pre_keys: Vec<String>,
        signed_pre_key: SignedPreKeyWire,
    },
    Hybrid {
        identity_key: String,
        pre_keys: Vec<String>,
        signed_pre_key: SignedPreKeyWire,
        kem_public_key: String,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct MessageWire {
    ciphertext: String,
    ephemeral_key: String,
    used_pre_key_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kem_ciphertext: Option<String>,
}

/// Serialize a bundle as a tagged JSON document (`"variant"` is
/// `"classical"` or `"hybrid"`).
pub fn encode_bundle(bundle: &Bundle) -> Result<String, ProtocolError> {
    let wire = match bundle {
        Bundle::Classical(inner) => BundleWire::Classical {
            identity_key: STANDARD.encode(inner.identity_key),
            pre_keys: encode_pre_keys(&inner.pre_keys),
            signed_pre_key: encode_signed_pre_key(&inner.signed_pre_key),
        },
        Bundle::Hybrid(inner) => BundleWire::Hybrid {
            identity_key: STANDARD.encode(inner.identity_key),
            pre_keys: encode_pre_keys(&inner.pre_keys),
            signed_pre_key: encode_signed_pre_key(&inner.signed_pre_key),
            kem_public_key: STANDARD.encode(&inner.kem_public_key),
        },
    };
    serde_json::to_string(&wire).map_err(|e| ProtocolError::Serialization(e.to_string()))
}

/// Parse a bundle document. The result still has to pass
/// [`Bundle::verify`] before it can be used to initiate.
pub fn decode_bundle(text: &str) -> Result<Bundle, ProtocolError> {
    let wire: BundleWire = serde_json::from_str(text)
        .map_err(|e| ProtocolError::Deserialization(format!("bundle JSON: {e}")))?;

    let bundle = match wire {
        BundleWire::Classical {
            identity_key,
            pre_keys,
            signed_pre_key,
        } => Bundle::Classical(ClassicalBundle {
            identity_key: decode_fixed("identity_key", &identity_key)?,
            pre_keys: decode_pre_keys(&pre_keys)?,
            signed_pre_key: decode_signed_pre_key(&signed_pre_key)?,
        }),
        BundleWire::Hybrid {
            identity_key,
            pre_keys,
            signed_pre_key,
            kem_public_key,
        } => Bundle::Hybrid(HybridBundle {
            identity_key: decode_fixed("identity_key", &identity_key)?,
            pre_keys: decode_pre_keys(&pre_keys)?,
            signed_pre_key: decode_signed_pre_key(&signed_pre_key)?,
            kem_public_key: decode_bytes("kem_public_key", &kem_public_key)?,
        }),
    };

    tracing::debug!(variant = ?bundle.protocol(), "decoded bundle");
    Ok(bundle)
}

/// Serialize an initial message. `kem_ciphertext` is omitted for classical
/// messages.
pub fn encode_message(message: &EncryptedMessage) -> Result<String, ProtocolError> {
    let wire = MessageWire {
        ciphertext: STANDARD.encode(&message.ciphertext),
        ephemeral_key: STANDARD.encode(message.ephemeral_key),
        used_pre_key_index: message.used_pre_key_index,
        kem_ciphertext: message.kem_ciphertext.as_ref().map(|ct| STANDARD.encode(ct)),
    };
    serde_json::to_string(&wire).map_err(|e| ProtocolError::Serialization(e.to_string()))
}

/// Parse an initial message, checking the ephemeral key length. The
/// ciphertext is only authenticated later by the message cipher.
pub fn decode_message(text: &str) -> Result<EncryptedMessage, ProtocolError> {
    let wire: MessageWire = serde_json::from_str(text)
        .map_err(|e| ProtocolError::Deserialization(format!("message JSON: {e}")))?;

    Ok(EncryptedMessage {
        ciphertext: decode_bytes("ciphertext", &wire.ciphertext)?,
        ephemeral_key: decode_fixed("ephemeral_key", &wire.ephemeral_key)?,
        used_pre_key_index: wire.used_pre_key_index,
        kem_ciphertext: wire
            .kem_ciphertext
            .as_deref()
            .map(|ct| decode_bytes("kem_ciphertext", ct))
            .transpose()?,
    })
}

fn encode_pre_keys(pre_keys: &[[u8; 32]]) -> Vec<String> {
    pre_keys.iter().map(|key| STANDARD.encode(key)).collect()
}

fn encode_signed_pre_key(signed: &SignedPreKeyPublic) -> SignedPreKeyWire {
    SignedPreKeyWire {
        public_key: STANDARD.encode(signed.public_key),
        signature: STANDARD.encode(signed.signature),
    }
}

fn decode_pre_keys(pre_keys: &[String]) -> Result<Vec<[u8; 32]>, ProtocolError> {
    pre_keys
        .iter()
        .map(|key| decode_fixed("pre_key", key))
        .collect()
}

fn decode_signed_pre_key(wire: &SignedPreKeyWire) -> Result<SignedPreKeyPublic, ProtocolError> {
    Ok(SignedPreKeyPublic {
        public_key: decode_fixed("signed_pre_key.public_key", &wire.public_key)?,
        signature: decode_fixed("signed_pre_key.signature", &wire.signature)?,
    })
}

fn decode_bytes(field: &str, value: &str) -> Result<Vec<u8>, ProtocolError> {
    STANDARD
        .decode(value)
        .map_err(|e| ProtocolError::Deserialization(format!("{field}: invalid base64: {e}")))
}

fn decode_fixed<const N: usize>(field: &str, value: &str) -> Result<[u8; N], ProtocolError> {
    let bytes = decode_bytes(field, value)?;
    <[u8; N]>::try_from(bytes.as_slice()).map_err(|_| {
        ProtocolError::Deserialization(format!(
            "{field} must be {N} bytes, got {}",
            bytes.len()
        ))
    })
}
