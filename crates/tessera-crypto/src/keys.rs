//! Key material generation: X25519 key pairs, one-time pre-keys, and
//! signed pre-keys.

use rand::rngs::OsRng;
use rand::RngCore;
use x25519_dalek::{PublicKey, SharedSecret, StaticSecret};
use zeroize::Zeroize;

use crate::error::CryptoError;
use crate::identity::IdentityKeyPair;

/// Fill `N` bytes from the OS random source.
pub(crate) fn random_bytes<const N: usize>() -> Result<[u8; N], CryptoError> {
    let mut bytes = [0u8; N];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| CryptoError::RandomnessUnavailable(e.to_string()))?;
    Ok(bytes)
}

/// An X25519 key pair.
///
/// Used for ephemeral keys, one-time pre-keys, and the signed pre-key.
/// The secret half zeroizes on drop.
#[derive(Clone)]
pub struct KeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl KeyPair {
    pub fn generate() -> Result<Self, CryptoError> {
        let mut scalar = random_bytes::<32>()?;
        let key_pair = Self::from_secret_bytes(scalar);
        scalar.zeroize();
        Ok(key_pair)
    }

    pub fn from_secret_bytes(bytes: [u8; 32]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.public.to_bytes()
    }

    pub fn diffie_hellman(&self, their_public: &PublicKey) -> SharedSecret {
        self.secret.diffie_hellman(their_public)
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &hex::encode(self.public.as_bytes()))
            .finish_non_exhaustive()
    }
}

pub fn generate_key_pair() -> Result<KeyPair, CryptoError> {
    KeyPair::generate()
}

/// One-time pre-keys are plain key pairs.
pub fn generate_pre_key() -> Result<KeyPair, CryptoError> {
    KeyPair::generate()
}

/// A medium-term pre-key whose public half is signed by the identity key.
#[derive(Clone)]
pub struct SignedPreKeyPair {
    key_pair: KeyPair,
    signature: [u8; 64],
}

impl SignedPreKeyPair {
    /// Generate a pre-key and sign its X25519 public bytes with Ed25519.
    pub fn generate(identity: &IdentityKeyPair) -> Result<Self, CryptoError> {
        let key_pair = KeyPair::generate()?;
        let signature = identity.sign(key_pair.public.as_bytes());
        Ok(Self {
            key_pair,
            signature,
        })
    }

    pub fn key_pair(&self) -> &KeyPair {
        &self.key_pair
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.key_pair.public_key_bytes()
    }

    pub fn signature(&self) -> &[u8; 64] {
        &self.signature
    }
}

impl std::fmt::Debug for SignedPreKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedPreKeyPair")
            .field("key_pair", &self.key_pair)
            .field("signature", &hex::encode(self.signature))
            .finish()
    }
}

pub fn generate_signed_pre_key(identity: &IdentityKeyPair) -> Result<SignedPreKeyPair, CryptoError> {
    SignedPreKeyPair::generate(identity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dh_is_commutative() {
        let a = generate_key_pair().unwrap();
        let b = generate_key_pair().unwrap();

        let ab = a.diffie_hellman(b.public_key());
        let ba = b.diffie_hellman(a.public_key());
        assert_eq!(ab.as_bytes(), ba.as_bytes());
    }

    #[test]
    fn generated_pre_keys_differ() {
        let first = generate_pre_key().unwrap();
        let second = generate_pre_key().unwrap();
        assert_ne!(first.public_key_bytes(), second.public_key_bytes());
    }

    #[test]
    fn secret_bytes_determine_public_key() {
        let a = KeyPair::from_secret_bytes([9u8; 32]);
        let b = KeyPair::from_secret_bytes([9u8; 32]);
        assert_eq!(a.public_key_bytes(), b.public_key_bytes());
    }

    #[test]
    fn signed_pre_key_verifies_against_identity() {
        let identity = IdentityKeyPair::generate().unwrap();
        let signed = generate_signed_pre_key(&identity).unwrap();

        assert!(IdentityKeyPair::verify(
            &identity.public_key_bytes(),
            &signed.public_key_bytes(),
            signed.signature(),
        )
        .is_ok());
    }
}
