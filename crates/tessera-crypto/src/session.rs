use serde::{Deserialize, Serialize};

use crate::bundle::{Bundle, ClassicalBundle, HybridBundle, SignedPreKeyPublic};
use crate::config::ProtocolConfig;
use crate::error::CryptoError;
use crate::identity::IdentityKeyPair;
use crate::kem::KemKeyPair;
use crate::keys::{generate_pre_key, KeyPair, SignedPreKeyPair};

/// Which agreement a session takes part in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Four Diffie-Hellman legs.
    X3dh,
    /// X3DH plus an ML-KEM encapsulation as the fifth secret.
    Pqxdh,
}

/// Index-addressable pool of one-time pre-keys.
///
/// A pre-key is retired after one successful responder run; its slot keeps
/// its index so published bundles stay valid.
#[derive(Debug)]
pub struct PreKeyPool {
    keys: Vec<KeyPair>,
    consumed: Vec<bool>,
}

impl PreKeyPool {
    /// Generate `count` fresh X25519 pre-keys, all unconsumed.
    pub fn generate(count: usize) -> Result<Self, CryptoError> {
        let keys = (0..count)
            .map(|_| generate_pre_key())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            consumed: vec![false; keys.len()],
            keys,
        })
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Unconsumed pre-keys left in the pool.
    pub fn remaining(&self) -> usize {
        self.consumed.iter().filter(|used| !**used).count()
    }

    /// Out-of-range indices report `false`.
    pub fn is_consumed(&self, index: usize) -> bool {
        self.consumed.get(index).copied().unwrap_or(false)
    }

    /// Look up an unconsumed pre-key by its published index.
    pub fn get(&self, index: usize) -> Result<&KeyPair, CryptoError> {
        let key = self
            .keys
            .get(index)
            .ok_or(CryptoError::PreKeyIndexOutOfRange {
                index,
                len: self.keys.len(),
            })?;
        if self.consumed[index] {
            return Err(CryptoError::PreKeyConsumed(index));
        }
        Ok(key)
    }

    /// Retire a pre-key. Fails the same way `get` does, so a key can only
    /// be retired once.
    pub fn consume(&mut self, index: usize) -> Result<(), CryptoError> {
        self.get(index)?;
        self.consumed[index] = true;
        Ok(())
    }

    /// Public halves in index order, consumed slots included.
    pub fn public_keys(&self) -> Vec<[u8; 32]> {
        self.keys.iter().map(KeyPair::public_key_bytes).collect()
    }
}

/// A pre-key the responder has used but not yet retired.
///
/// Returned by [`KeyAgreement::respond`](crate::KeyAgreement::respond).
/// Commit it with [`Session::commit_pre_key`] once a message under the
/// derived secret has authenticated; dropping it leaves the pre-key
/// available.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "the pre-key stays available until the claim is committed"]
pub struct PreKeyClaim {
    index: usize,
}

impl PreKeyClaim {
    pub(crate) fn new(index: usize) -> Self {
        Self { index }
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

/// A party's complete private key material.
pub struct Session {
    identity: IdentityKeyPair,
    pre_keys: PreKeyPool,
    signed_pre_key: SignedPreKeyPair,
    kem_key_pair: Option<KemKeyPair>,
}

impl Session {
    /// Generate identity, pre-key pool, signed pre-key and, for `Pqxdh`,
    /// a KEM key pair.
    pub fn generate(protocol: Protocol, config: &ProtocolConfig) -> Result<Self, CryptoError> {
        let identity = IdentityKeyPair::generate()?;
        let pre_keys = PreKeyPool::generate(config.pre_key_count)?;
        let signed_pre_key = SignedPreKeyPair::generate(&identity)?;
        let kem_key_pair = match protocol {
            Protocol::X3dh => None,
            Protocol::Pqxdh => Some(KemKeyPair::generate()),
        };

        tracing::debug!(
            ?protocol,
            identity = %identity.public_key_hex(),
            pre_keys = pre_keys.len(),
            "generated session key material"
        );

        Ok(Self {
            identity,
            pre_keys,
            signed_pre_key,
            kem_key_pair,
        })
    }

    /// Hybrid exactly when the session holds a KEM key pair.
    pub fn protocol(&self) -> Protocol {
        if self.kem_key_pair.is_some() {
            Protocol::Pqxdh
        } else {
            Protocol::X3dh
        }
    }

    pub fn identity(&self) -> &IdentityKeyPair {
        &self.identity
    }

    pub fn pre_keys(&self) -> &PreKeyPool {
        &self.pre_keys
    }

    /// Retire the pre-key named by `claim`.
    pub fn commit_pre_key(&mut self, claim: PreKeyClaim) -> Result<(), CryptoError> {
        self.pre_keys.consume(claim.index)?;
        tracing::debug!(
            pre_key_index = claim.index,
            remaining = self.pre_keys.remaining(),
            "retired pre-key"
        );
        Ok(())
    }

    pub fn signed_pre_key(&self) -> &SignedPreKeyPair {
        &self.signed_pre_key
    }

    pub fn kem_key_pair(&self) -> Option<&KemKeyPair> {
        self.kem_key_pair.as_ref()
    }

    /// Public snapshot for publication to peers.
    pub fn bundle(&self) -> Bundle {
        let identity_key = self.identity.public_key_bytes();
        let pre_keys = self.pre_keys.public_keys();
        let signed_pre_key = SignedPreKeyPublic {
            public_key: self.signed_pre_key.public_key_bytes(),
            signature: *self.signed_pre_key.signature(),
        };

        match &self.kem_key_pair {
            None => Bundle::Classical(ClassicalBundle {
                identity_key,
                pre_keys,
                signed_pre_key,
            }),
            Some(kem) => Bundle::Hybrid(HybridBundle {
                identity_key,
                pre_keys,
                signed_pre_key,
                kem_public_key: kem.public_key().to_vec(),
            }),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("protocol", &self.protocol())
            .field("identity", &self.identity)
            .field("pre_keys_remaining", &self.pre_keys.remaining())
            .finish_non_exhaustive()
    }
}
