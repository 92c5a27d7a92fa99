//! Secret combination and cipher-key derivation.
//!
//! `combine` reduces the ordered agreement outputs to one session secret:
//! `SHA-256(s1 || s2 || ... || sn || context)`. `derive_key` turns a session
//! secret into a symmetric key: `SHA-256(secret || context)` truncated to
//! the cipher key length. Order is part of the protocol: both parties must
//! pass their secrets in the same sequence.

use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::config::ProtocolConfig;

pub const SESSION_SECRET_LEN: usize = 32;
pub const CIPHER_KEY_LEN: usize = 32;

/// Output of one agreement run.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionSecret([u8; SESSION_SECRET_LEN]);

impl SessionSecret {
    pub fn as_bytes(&self) -> &[u8; SESSION_SECRET_LEN] {
        &self.0
    }
}

/// Key handed to the message cipher.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct CipherKey([u8; CIPHER_KEY_LEN]);

impl CipherKey {
    pub(crate) fn from_bytes(bytes: [u8; CIPHER_KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; CIPHER_KEY_LEN] {
        &self.0
    }
}

/// Combiner bound to one application context.
#[derive(Debug, Clone)]
pub struct Combiner {
    context: Vec<u8>,
}

impl Combiner {
    pub fn new(context: impl Into<Vec<u8>>) -> Self {
        Self {
            context: context.into(),
        }
    }

    /// Combiner for `config.context`.
    pub fn from_config(config: &ProtocolConfig) -> Self {
        Self::new(config.context.as_bytes())
    }

    pub fn context(&self) -> &[u8] {
        &self.context
    }

    /// Hash the secrets in the order given, then the context.
    pub fn combine(&self, secrets: &[&[u8]]) -> SessionSecret {
        let mut hasher = Sha256::new();
        for secret in secrets {
            hasher.update(secret);
        }
        hasher.update(&self.context);

        let mut out = [0u8; SESSION_SECRET_LEN];
        out.copy_from_slice(&hasher.finalize());
        SessionSecret(out)
    }

    /// Key for the message cipher, domain-separated by the context.
    pub fn derive_key(&self, secret: &SessionSecret) -> CipherKey {
        let mut hasher = Sha256::new();
        hasher.update(secret.as_bytes());
        hasher.update(&self.context);
        let digest = hasher.finalize();

        let mut key = [0u8; CIPHER_KEY_LEN];
        key.copy_from_slice(&digest[..CIPHER_KEY_LEN]);
        CipherKey(key)
    }
}
