//! Symmetric forward ratchet layered on top of an agreed session secret.
//!
//! The core agreement derives every initial message key from static bundle
//! material plus one ephemeral key. Peers that keep talking after the first
//! message can seed a `ChainRatchet` from that secret instead: each message
//! key is derived from a chain key that is replaced after use, so a leaked
//! chain key does not expose earlier messages.

use std::collections::BTreeMap;

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::cipher::MessageCipher;
use crate::error::CryptoError;
use crate::kdf::{CipherKey, SessionSecret};

const CHAIN_INIT_INFO: &[u8] = b"TesseraChainInit";
const MESSAGE_KEY_INFO: &[u8] = b"TesseraMsgKey";
const CHAIN_KEY_INFO: &[u8] = b"TesseraChainKey";

/// Which side of the agreement this ratchet belongs to. The initiator's
/// sending chain is the responder's receiving chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatchetMessage {
    pub counter: u64,
    pub ciphertext: Vec<u8>,
}

pub struct ChainRatchet {
    sending_chain_key: [u8; 32],
    receiving_chain_key: [u8; 32],
    send_counter: u64,
    /// Counter of the next in-order message expected.
    recv_counter: u64,
    /// Message keys for counters that were skipped, oldest first.
    skipped: BTreeMap<u64, [u8; 32]>,
    max_skip: usize,
}

impl ChainRatchet {
    /// Split a session secret into sending and receiving chains.
    ///
    /// `max_skip` bounds both a single gap in the receiving counter and the
    /// number of cached skipped keys.
    pub fn new(secret: &SessionSecret, role: Role, max_skip: usize) -> Result<Self, CryptoError> {
        let hk = Hkdf::<Sha256>::new(None, secret.as_bytes());
        let mut okm = [0u8; 64];
        hk.expand(CHAIN_INIT_INFO, &mut okm)
            .map_err(|e| CryptoError::RatchetError(format!("HKDF expand failed: {e}")))?;

        let mut first = [0u8; 32];
        let mut second = [0u8; 32];
        first.copy_from_slice(&okm[..32]);
        second.copy_from_slice(&okm[32..]);
        okm.zeroize();

        let (sending_chain_key, receiving_chain_key) = match role {
            Role::Initiator => (first, second),
            Role::Responder => (second, first),
        };

        Ok(Self {
            sending_chain_key,
            receiving_chain_key,
            send_counter: 0,
            recv_counter: 0,
            skipped: BTreeMap::new(),
            max_skip,
        })
    }

    pub fn send_counter(&self) -> u64 {
        self.send_counter
    }

    pub fn recv_counter(&self) -> u64 {
        self.recv_counter
    }

    /// Cached keys for messages that have not arrived yet.
    pub fn skipped_keys(&self) -> usize {
        self.skipped.len()
    }

    /// Encrypt under the next sending key and advance the sending chain.
    pub fn seal(
        &mut self,
        cipher: &dyn MessageCipher,
        plaintext: &[u8],
    ) -> Result<RatchetMessage, CryptoError> {
        let (message_key, next_chain_key) = step(&self.sending_chain_key)?;
        let ciphertext = cipher.encrypt(&CipherKey::from_bytes(message_key), plaintext)?;

        let counter = self.send_counter;
        self.sending_chain_key = next_chain_key;
        self.send_counter += 1;
        Ok(RatchetMessage {
            counter,
            ciphertext,
        })
    }

    /// Decrypt a message, accepting out-of-order delivery within `max_skip`.
    /// State advances only when the ciphertext authenticates.
    ///
    /// When the cache is full the oldest skipped keys are dropped, so
    /// messages lost for good do not block later gaps; a dropped message
    /// can no longer be opened.
    pub fn open(
        &mut self,
        cipher: &dyn MessageCipher,
        message: &RatchetMessage,
    ) -> Result<Vec<u8>, CryptoError> {
        if let Some(key) = self.skipped.get(&message.counter) {
            let plaintext = cipher.decrypt(&CipherKey::from_bytes(*key), &message.ciphertext)?;
            if let Some(mut key) = self.skipped.remove(&message.counter) {
                key.zeroize();
            }
            return Ok(plaintext);
        }

        if message.counter < self.recv_counter {
            return Err(CryptoError::RatchetError(format!(
                "message {} already received",
                message.counter
            )));
        }

        let gap = usize::try_from(message.counter - self.recv_counter).unwrap_or(usize::MAX);
        if gap > self.max_skip {
            return Err(CryptoError::RatchetError(format!(
                "message {} skips {gap} keys, limit {}",
                message.counter, self.max_skip
            )));
        }

        let mut chain_key = self.receiving_chain_key;
        let mut newly_skipped = Vec::with_capacity(gap);
        for counter in self.recv_counter..message.counter {
            let (message_key, next_chain_key) = step(&chain_key)?;
            newly_skipped.push((counter, message_key));
            chain_key = next_chain_key;
        }
        let (message_key, next_chain_key) = step(&chain_key)?;
        chain_key.zeroize();

        let plaintext = match cipher.decrypt(&CipherKey::from_bytes(message_key), &message.ciphertext)
        {
            Ok(plaintext) => plaintext,
            Err(e) => {
                for (_, mut key) in newly_skipped {
                    key.zeroize();
                }
                return Err(e);
            }
        };

        if gap > 0 {
            tracing::debug!(
                counter = message.counter,
                skipped = gap,
                "caching keys for out-of-order messages"
            );
        }
        self.skipped.extend(newly_skipped);
        self.evict_oldest_skipped();
        self.receiving_chain_key = next_chain_key;
        self.recv_counter = message.counter + 1;
        Ok(plaintext)
    }
}

impl ChainRatchet {
    fn evict_oldest_skipped(&mut self) {
        let mut evicted = 0usize;
        while self.skipped.len() > self.max_skip {
            if let Some((_, mut key)) = self.skipped.pop_first() {
                key.zeroize();
                evicted += 1;
            }
        }
        if evicted > 0 {
            tracing::debug!(evicted, cached = self.skipped.len(), "evicted oldest skipped keys");
        }
    }
}

impl Drop for ChainRatchet {
    fn drop(&mut self) {
        self.sending_chain_key.zeroize();
        self.receiving_chain_key.zeroize();
        for key in self.skipped.values_mut() {
            key.zeroize();
        }
    }
}

/// Derive `(message_key, next_chain_key)` from a chain key.
fn step(chain_key: &[u8; 32]) -> Result<([u8; 32], [u8; 32]), CryptoError> {
    let hk = Hkdf::<Sha256>::new(None, chain_key);
    let mut message_key = [0u8; 32];
    let mut next_chain_key = [0u8; 32];
    hk.expand(MESSAGE_KEY_INFO, &mut message_key)
        .map_err(|e| CryptoError::RatchetError(format!("HKDF: {e}")))?;
    hk.expand(CHAIN_KEY_INFO, &mut next_chain_key)
        .map_err(|e| CryptoError::RatchetError(format!("HKDF: {e}")))?;
    Ok((message_key, next_chain_key))
}
