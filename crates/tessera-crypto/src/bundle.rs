//! Published pre-key bundles.
//!
//! A bundle is the public projection of a [`Session`](crate::Session). The
//! classical and hybrid shapes differ only by the KEM public key, so they
//! are separate variants behind one capability trait, [`BundleKeys`].
//!
//! A bundle must pass [`Bundle::verify`] before it can be used to initiate:
//! the resulting [`VerifiedBundle`] also tracks which published pre-keys
//! this initiator has already used.

use x25519_dalek::{PublicKey as X25519Public, StaticSecret};

use crate::error::CryptoError;
use crate::identity::IdentityKeyPair;
use crate::kem::KEM_PUBLIC_KEY_LEN;
use crate::session::Protocol;

/// Any clamped scalar maps a low-order point to the identity, so one fixed
/// scalar is enough to spot them.
const LOW_ORDER_CHECK_SCALAR: [u8; 32] = [0x5a; 32];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPreKeyPublic {
    pub public_key: [u8; 32],
    /// Ed25519 signature over `public_key` by the bundle's identity key.
    pub signature: [u8; 64],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassicalBundle {
    pub identity_key: [u8; 32],
    pub pre_keys: Vec<[u8; 32]>,
    pub signed_pre_key: SignedPreKeyPublic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HybridBundle {
    pub identity_key: [u8; 32],
    pub pre_keys: Vec<[u8; 32]>,
    pub signed_pre_key: SignedPreKeyPublic,
    pub kem_public_key: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bundle {
    Classical(ClassicalBundle),
    Hybrid(HybridBundle),
}

/// What the agreement engine needs from a peer's bundle.
pub trait BundleKeys {
    fn identity_key(&self) -> &[u8; 32];

    fn pre_keys(&self) -> &[[u8; 32]];

    fn signed_pre_key(&self) -> &SignedPreKeyPublic;

    fn kem_public_key(&self) -> Option<&[u8]> {
        None
    }
}

impl BundleKeys for ClassicalBundle {
    fn identity_key(&self) -> &[u8; 32] {
        &self.identity_key
    }

    fn pre_keys(&self) -> &[[u8; 32]] {
        &self.pre_keys
    }

    fn signed_pre_key(&self) -> &SignedPreKeyPublic {
        &self.signed_pre_key
    }
}

impl BundleKeys for HybridBundle {
    fn identity_key(&self) -> &[u8; 32] {
        &self.identity_key
    }

    fn pre_keys(&self) -> &[[u8; 32]] {
        &self.pre_keys
    }

    fn signed_pre_key(&self) -> &SignedPreKeyPublic {
        &self.signed_pre_key
    }

    fn kem_public_key(&self) -> Option<&[u8]> {
        Some(&self.kem_public_key)
    }
}

impl BundleKeys for Bundle {
    fn identity_key(&self) -> &[u8; 32] {
        self.keys().identity_key()
    }

    fn pre_keys(&self) -> &[[u8; 32]] {
        self.keys().pre_keys()
    }

    fn signed_pre_key(&self) -> &SignedPreKeyPublic {
        self.keys().signed_pre_key()
    }

    fn kem_public_key(&self) -> Option<&[u8]> {
        self.keys().kem_public_key()
    }
}

impl Bundle {
    fn keys(&self) -> &dyn BundleKeys {
        match self {
            Self::Classical(bundle) => bundle,
            Self::Hybrid(bundle) => bundle,
        }
    }

    pub fn protocol(&self) -> Protocol {
        match self {
            Self::Classical(_) => Protocol::X3dh,
            Self::Hybrid(_) => Protocol::Pqxdh,
        }
    }

    /// Structural checks, run before any DH or KEM computation.
    ///
    /// Rejects empty pre-key lists, identity keys that are not Ed25519
    /// points, low-order X25519 keys anywhere in the bundle, and KEM keys
    /// of the wrong length.
    pub fn validate(&self) -> Result<(), CryptoError> {
        if self.pre_keys().is_empty() {
            return Err(CryptoError::MalformedBundle("no pre-keys published".into()));
        }
        let identity = IdentityKeyPair::peer_identity_to_x25519(self.identity_key())
            .map_err(|e| CryptoError::MalformedBundle(e.to_string()))?;
        if is_low_order(identity) {
            return Err(low_order("identity key"));
        }
        if is_low_order(X25519Public::from(self.signed_pre_key().public_key)) {
            return Err(low_order("signed pre-key"));
        }
        if let Some(index) = self
            .pre_keys()
            .iter()
            .position(|key| is_low_order(X25519Public::from(*key)))
        {
            return Err(low_order(&format!("pre-key {index}")));
        }
        if let Some(kem_public_key) = self.kem_public_key() {
            if kem_public_key.len() != KEM_PUBLIC_KEY_LEN {
                return Err(CryptoError::MalformedBundle(format!(
                    "KEM public key is {} bytes, expected {KEM_PUBLIC_KEY_LEN}",
                    kem_public_key.len()
                )));
            }
        }
        Ok(())
    }

    /// Validate the bundle and check the signed pre-key signature against
    /// the bundle's identity key.
    pub fn verify(self) -> Result<VerifiedBundle, CryptoError> {
        self.validate()?;
        let signed = self.signed_pre_key();
        if let Err(e) =
            IdentityKeyPair::verify(self.identity_key(), &signed.public_key, &signed.signature)
        {
            tracing::warn!(
                identity = %hex::encode(self.identity_key()),
                "rejecting bundle with invalid signed pre-key signature"
            );
            return Err(e);
        }
        Ok(VerifiedBundle {
            bundle: self,
            next_pre_key: 0,
        })
    }
}

fn is_low_order(key: X25519Public) -> bool {
    !StaticSecret::from(LOW_ORDER_CHECK_SCALAR)
        .diffie_hellman(&key)
        .was_contributory()
}

fn low_order(label: &str) -> CryptoError {
    CryptoError::MalformedBundle(format!("{label} is a low-order point"))
}

/// A bundle whose signed pre-key has been checked, plus the initiator's
/// cursor over its one-time pre-keys.
#[derive(Debug, Clone)]
pub struct VerifiedBundle {
    bundle: Bundle,
    next_pre_key: usize,
}

impl VerifiedBundle {
    pub fn bundle(&self) -> &Bundle {
        &self.bundle
    }

    /// Give back the bundle, dropping the cursor.
    pub fn into_bundle(self) -> Bundle {
        self.bundle
    }

    /// Published pre-keys this initiator has not used yet.
    pub fn remaining_pre_keys(&self) -> usize {
        self.bundle.pre_keys().len().saturating_sub(self.next_pre_key)
    }

    /// Next unused pre-key without advancing the cursor.
    pub(crate) fn next_pre_key(&self) -> Result<(usize, [u8; 32]), CryptoError> {
        let pre_keys = self.bundle.pre_keys();
        pre_keys
            .get(self.next_pre_key)
            .map(|key| (self.next_pre_key, *key))
            .ok_or(CryptoError::PreKeysExhausted(pre_keys.len()))
    }

    pub(crate) fn advance(&mut self) {
        self.next_pre_key += 1;
    }
}
