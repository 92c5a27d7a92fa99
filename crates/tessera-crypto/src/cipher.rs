use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};

use crate::config::CipherSuite;
use crate::error::CryptoError;
use crate::kdf::CipherKey;
use crate::keys::random_bytes;

const GCM_NONCE_LEN: usize = 12;
const XCHACHA_NONCE_LEN: usize = 24;
const TAG_LEN: usize = 16;

/// Authenticated symmetric cipher applied once a session key exists.
///
/// Output layout is `[nonce || ciphertext || tag]`.
pub trait MessageCipher: Send + Sync {
    fn encrypt(&self, key: &CipherKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError>;

    fn decrypt(&self, key: &CipherKey, data: &[u8]) -> Result<Vec<u8>, CryptoError>;
}

pub fn cipher_for(suite: CipherSuite) -> Box<dyn MessageCipher> {
    match suite {
        CipherSuite::Aes256Gcm => Box::new(Aes256GcmCipher),
        CipherSuite::XChaCha20Poly1305 => Box::new(XChaCha20Poly1305Cipher),
    }
}

/// AES-256-GCM with a random 12-byte nonce.
#[derive(Debug, Clone, Copy, Default)]
pub struct Aes256GcmCipher;

impl MessageCipher for Aes256GcmCipher {
    fn encrypt(&self, key: &CipherKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
            .map_err(|e| CryptoError::EncryptionError(e.to_string()))?;

        let nonce_bytes = random_bytes::<GCM_NONCE_LEN>()?;
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|e| CryptoError::EncryptionError(e.to_string()))?;

        let mut output = Vec::with_capacity(GCM_NONCE_LEN + ciphertext.len());
        output.extend_from_slice(&nonce_bytes);
        output.extend_from_slice(&ciphertext);
        Ok(output)
    }

    fn decrypt(&self, key: &CipherKey, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if data.len() < GCM_NONCE_LEN + TAG_LEN {
            return Err(CryptoError::DecryptionError("ciphertext too short".into()));
        }

        let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
            .map_err(|e| CryptoError::DecryptionError(e.to_string()))?;
        let (nonce_bytes, ciphertext) = data.split_at(GCM_NONCE_LEN);

        cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|e| CryptoError::DecryptionError(e.to_string()))
    }
}

/// XChaCha20-Poly1305 with a random 24-byte nonce.
#[derive(Debug, Clone, Copy, Default)]
pub struct XChaCha20Poly1305Cipher;

impl MessageCipher for XChaCha20Poly1305Cipher {
    fn encrypt(&self, key: &CipherKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let cipher = XChaCha20Poly1305::new_from_slice(key.as_bytes())
            .map_err(|e| CryptoError::EncryptionError(e.to_string()))?;

        let nonce_bytes = random_bytes::<XCHACHA_NONCE_LEN>()?;
        let ciphertext = cipher
            .encrypt(XNonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|e| CryptoError::EncryptionError(e.to_string()))?;

        let mut output = Vec::with_capacity(XCHACHA_NONCE_LEN + ciphertext.len());
        output.extend_from_slice(&nonce_bytes);
        output.extend_from_slice(&ciphertext);
        Ok(output)
    }

    fn decrypt(&self, key: &CipherKey, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if data.len() < XCHACHA_NONCE_LEN + TAG_LEN {
            return Err(CryptoError::DecryptionError("ciphertext too short".into()));
        }

        let cipher = XChaCha20Poly1305::new_from_slice(key.as_bytes())
            .map_err(|e| CryptoError::DecryptionError(e.to_string()))?;
        let (nonce_bytes, ciphertext) = data.split_at(XCHACHA_NONCE_LEN);

        cipher
            .decrypt(XNonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|e| CryptoError::DecryptionError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kdf::Combiner;

    fn key(seed: u8) -> CipherKey {
        let combiner = Combiner::new("cipher-tests");
        combiner.derive_key(&combiner.combine(&[&[seed; 32]]))
    }

    fn suites() -> [Box<dyn MessageCipher>; 2] {
        [
            cipher_for(CipherSuite::Aes256Gcm),
            cipher_for(CipherSuite::XChaCha20Poly1305),
        ]
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        for cipher in suites() {
            let ciphertext = cipher.encrypt(&key(1), b"hello").unwrap();
            assert_eq!(cipher.decrypt(&key(1), &ciphertext).unwrap(), b"hello");
        }
    }

    #[test]
    fn wrong_key_rejected() {
        for cipher in suites() {
            let ciphertext = cipher.encrypt(&key(1), b"hello").unwrap();
            assert!(matches!(
                cipher.decrypt(&key(2), &ciphertext),
                Err(CryptoError::DecryptionError(_))
            ));
        }
    }

    #[test]
    fn flipped_bit_rejected() {
        for cipher in suites() {
            let mut ciphertext = cipher.encrypt(&key(1), b"hello").unwrap();
            let last = ciphertext.len() - 1;
            ciphertext[last] ^= 0x01;
            assert!(cipher.decrypt(&key(1), &ciphertext).is_err());
        }
    }

    #[test]
    fn short_input_rejected() {
        for cipher in suites() {
            assert!(cipher.decrypt(&key(1), &[0u8; 8]).is_err());
        }
    }
}
