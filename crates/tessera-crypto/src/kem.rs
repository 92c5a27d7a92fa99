//! ML-KEM-1024 key encapsulation for the hybrid (PQXDH) variant.

use pqcrypto_mlkem::mlkem1024;
use pqcrypto_traits::kem::{Ciphertext as _, PublicKey as _, SecretKey as _, SharedSecret as _};
use zeroize::Zeroizing;

use crate::error::CryptoError;

pub const KEM_PUBLIC_KEY_LEN: usize = 1568;
pub const KEM_SECRET_KEY_LEN: usize = 3168;
pub const KEM_CIPHERTEXT_LEN: usize = 1568;
pub const KEM_SHARED_SECRET_LEN: usize = 32;

/// Shared secret produced by encapsulation or decapsulation.
pub type KemSecret = Zeroizing<[u8; KEM_SHARED_SECRET_LEN]>;

/// Long-lived KEM key pair held by a hybrid session.
///
/// Stored as raw bytes; the secret half zeroizes on drop.
pub struct KemKeyPair {
    public_key: Vec<u8>,
    secret_key: Zeroizing<Vec<u8>>,
}

impl KemKeyPair {
    pub fn generate() -> Self {
        let (public, secret) = mlkem1024::keypair();
        Self {
            public_key: public.as_bytes().to_vec(),
            secret_key: Zeroizing::new(secret.as_bytes().to_vec()),
        }
    }

    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }
}

impl std::fmt::Debug for KemKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KemKeyPair")
            .field("public_key_len", &self.public_key.len())
            .finish_non_exhaustive()
    }
}

/// Encapsulate a fresh secret to `public_key`.
///
/// Returns `(ciphertext, secret)`.
pub fn encapsulate(public_key: &[u8]) -> Result<(Vec<u8>, KemSecret), CryptoError> {
    let public = mlkem1024::PublicKey::from_bytes(public_key).map_err(|e| {
        CryptoError::MalformedBundle(format!(
            "KEM public key of {} bytes rejected: {e:?}",
            public_key.len()
        ))
    })?;
    let (shared, ciphertext) = mlkem1024::encapsulate(&public);
    Ok((ciphertext.as_bytes().to_vec(), to_secret(shared.as_bytes())?))
}

/// Recover the encapsulated secret with the session's KEM key.
///
/// ML-KEM rejects tampered ciphertexts implicitly: the result is a
/// pseudorandom secret unrelated to the sender's, which then fails
/// authentication in the message cipher.
pub fn decapsulate(ciphertext: &[u8], key_pair: &KemKeyPair) -> Result<KemSecret, CryptoError> {
    let ciphertext = mlkem1024::Ciphertext::from_bytes(ciphertext).map_err(|e| {
        CryptoError::DecapsulationFailure(format!(
            "ciphertext of {} bytes rejected: {e:?}",
            ciphertext.len()
        ))
    })?;
    let secret = mlkem1024::SecretKey::from_bytes(&key_pair.secret_key)
        .map_err(|e| CryptoError::DecapsulationFailure(format!("local KEM key unusable: {e:?}")))?;
    let shared = mlkem1024::decapsulate(&ciphertext, &secret);
    to_secret(shared.as_bytes())
}

fn to_secret(bytes: &[u8]) -> Result<KemSecret, CryptoError> {
    let array: [u8; KEM_SHARED_SECRET_LEN] = bytes.try_into().map_err(|_| {
        CryptoError::DecapsulationFailure(format!("shared secret of {} bytes", bytes.len()))
    })?;
    Ok(Zeroizing::new(array))
}
