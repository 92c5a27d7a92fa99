use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;
use crate::keys::random_bytes;

/// A party's long-term identity key.
///
/// The Ed25519 key signs the signed pre-key. The same key mapped onto
/// Curve25519 takes part in the identity and ephemeral Diffie-Hellman legs
/// of X3DH/PQXDH, so a bundle only ever publishes one identity key.
#[derive(ZeroizeOnDrop)]
pub struct IdentityKeyPair {
    signing_key: SigningKey,
}

impl IdentityKeyPair {
    /// Generate a new random identity from the OS random source.
    pub fn generate() -> Result<Self, CryptoError> {
        let mut seed = random_bytes::<32>()?;
        let signing_key = SigningKey::from_bytes(&seed);
        seed.zeroize();
        Ok(Self { signing_key })
    }

    /// Restore an identity from a 32-byte secret key.
    pub fn from_secret_bytes(bytes: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(bytes),
        }
    }

    /// The Ed25519 public key as published in a bundle.
    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }

    /// Verify an Ed25519 signature made by the identity `public_key`.
    pub fn verify(
        public_key: &[u8; 32],
        message: &[u8],
        signature: &[u8; 64],
    ) -> Result<(), CryptoError> {
        let verifying_key = VerifyingKey::from_bytes(public_key)
            .map_err(|e| CryptoError::VerificationError(format!("invalid identity key: {e}")))?;
        verifying_key
            .verify(message, &Signature::from_bytes(signature))
            .map_err(|e| CryptoError::VerificationError(e.to_string()))
    }

    /// X25519 secret for Diffie-Hellman.
    ///
    /// Uses the SHA-512-expanded scalar (the scalar Ed25519 signs with), so
    /// the matching public key is the Edwards→Montgomery image of the
    /// published Ed25519 key.
    pub fn to_x25519_secret(&self) -> x25519_dalek::StaticSecret {
        x25519_dalek::StaticSecret::from(self.signing_key.to_scalar_bytes())
    }

    pub fn to_x25519_public(&self) -> x25519_dalek::PublicKey {
        x25519_dalek::PublicKey::from(&self.to_x25519_secret())
    }

    /// Map a peer's published Ed25519 identity key onto X25519 (RFC 7748
    /// birational map).
    pub fn peer_identity_to_x25519(
        identity_key: &[u8; 32],
    ) -> Result<x25519_dalek::PublicKey, CryptoError> {
        let verifying_key = VerifyingKey::from_bytes(identity_key)
            .map_err(|e| CryptoError::InvalidKey(format!("invalid Ed25519 identity key: {e}")))?;
        Ok(x25519_dalek::PublicKey::from(
            verifying_key.to_montgomery().to_bytes(),
        ))
    }
}

impl std::fmt::Debug for IdentityKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityKeyPair")
            .field("public_key", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}
