//! X3DH / PQXDH agreement engine.
//!
//! Initiator (holding the peer's verified bundle):
//!
//! - DH1 = DH(IK_A, IK_B)
//! - DH2 = DH(EK_A, IK_B)
//! - DH3 = DH(EK_A, OPK_B\[i\])
//! - DH4 = DH(EK_A, SPK_B)
//! - PQXDH only: (CT, SS) = Encaps(PQPK_B)
//!
//! Responder mirrors each leg with its own private halves and the
//! initiator's ephemeral key, then both run the combiner over
//! `DH1 || DH2 || DH3 || DH4 [|| SS]`. The order is fixed; any deviation
//! yields a different secret rather than an error.

use x25519_dalek::{PublicKey as X25519Public, SharedSecret};

use crate::bundle::{Bundle, BundleKeys, VerifiedBundle};
use crate::cipher::{cipher_for, MessageCipher};
use crate::config::ProtocolConfig;
use crate::error::CryptoError;
use crate::identity::IdentityKeyPair;
use crate::kdf::{Combiner, SessionSecret};
use crate::kem::{self, KemSecret};
use crate::keys::KeyPair;
use crate::session::{PreKeyClaim, Session};

/// What the initiator sends alongside its first ciphertext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitiationHeader {
    pub ephemeral_key: [u8; 32],
    pub used_pre_key_index: usize,
    pub kem_ciphertext: Option<Vec<u8>>,
}

/// Ciphertext plus the public values the responder needs to rebuild the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedMessage {
    pub ciphertext: Vec<u8>,
    pub ephemeral_key: [u8; 32],
    pub used_pre_key_index: usize,
    pub kem_ciphertext: Option<Vec<u8>>,
}

/// Runs both sides of the agreement with a configured combiner and cipher.
pub struct KeyAgreement {
    combiner: Combiner,
    cipher: Box<dyn MessageCipher>,
}

impl KeyAgreement {
    /// Engine using the configured context and cipher suite.
    pub fn new(config: &ProtocolConfig) -> Self {
        Self::with_cipher(config, cipher_for(config.cipher))
    }

    /// Engine with a caller-supplied message cipher; only the context is
    /// taken from `config`.
    pub fn with_cipher(config: &ProtocolConfig, cipher: Box<dyn MessageCipher>) -> Self {
        Self {
            combiner: Combiner::from_config(config),
            cipher,
        }
    }

    /// Combiner bound to the configured context.
    pub fn combiner(&self) -> &Combiner {
        &self.combiner
    }

    /// The message cipher, also usable to seed a [`ChainRatchet`](crate::ChainRatchet).
    pub fn cipher(&self) -> &dyn MessageCipher {
        self.cipher.as_ref()
    }

    /// Initiator side: derive a session secret against `peer`'s next unused
    /// pre-key. The bundle's cursor advances only on success.
    pub fn initiate(
        &self,
        session: &Session,
        peer: &mut VerifiedBundle,
    ) -> Result<(SessionSecret, InitiationHeader), CryptoError> {
        let outcome = self.initiator_secret(session, peer)?;
        peer.advance();
        Ok(outcome)
    }

    /// Responder side: rebuild the initiator's secret.
    ///
    /// Nothing in a header is authenticated, so the session is left
    /// untouched. The returned claim must be passed to
    /// [`Session::commit_pre_key`] after the first message under the secret
    /// has decrypted; until then the pre-key stays available.
    pub fn respond(
        &self,
        session: &Session,
        peer: &Bundle,
        header: &InitiationHeader,
    ) -> Result<(SessionSecret, PreKeyClaim), CryptoError> {
        let secret = self.responder_secret(
            session,
            peer,
            &header.ephemeral_key,
            header.used_pre_key_index,
            header.kem_ciphertext.as_deref(),
        )?;
        Ok((secret, PreKeyClaim::new(header.used_pre_key_index)))
    }

    /// Initiate against `peer` and encrypt `plaintext` under the derived
    /// cipher key in one step.
    pub fn encrypt_message(
        &self,
        session: &Session,
        peer: &mut VerifiedBundle,
        plaintext: &[u8],
    ) -> Result<EncryptedMessage, CryptoError> {
        let (secret, header) = self.initiator_secret(session, peer)?;
        let key = self.combiner.derive_key(&secret);
        let ciphertext = self.cipher.encrypt(&key, plaintext)?;
        peer.advance();

        Ok(EncryptedMessage {
            ciphertext,
            ephemeral_key: header.ephemeral_key,
            used_pre_key_index: header.used_pre_key_index,
            kem_ciphertext: header.kem_ciphertext,
        })
    }

    /// Decrypt an initial message. The pre-key is retired only once the
    /// cipher has authenticated the ciphertext, so a failed call leaves the
    /// session untouched.
    pub fn decrypt_message(
        &self,
        session: &mut Session,
        peer: &Bundle,
        message: &EncryptedMessage,
    ) -> Result<Vec<u8>, CryptoError> {
        let secret = self.responder_secret(
            session,
            peer,
            &message.ephemeral_key,
            message.used_pre_key_index,
            message.kem_ciphertext.as_deref(),
        )?;
        let key = self.combiner.derive_key(&secret);
        let plaintext = self.cipher.decrypt(&key, &message.ciphertext)?;

        session.commit_pre_key(PreKeyClaim::new(message.used_pre_key_index))?;
        Ok(plaintext)
    }

    fn initiator_secret(
        &self,
        session: &Session,
        peer: &VerifiedBundle,
    ) -> Result<(SessionSecret, InitiationHeader), CryptoError> {
        let bundle = peer.bundle();
        let (pre_key_index, pre_key) = peer.next_pre_key()?;

        let ephemeral = KeyPair::generate()?;
        let their_identity = IdentityKeyPair::peer_identity_to_x25519(bundle.identity_key())?;
        let their_pre_key = X25519Public::from(pre_key);
        let their_signed_pre_key = X25519Public::from(bundle.signed_pre_key().public_key);

        let dh1 = session
            .identity()
            .to_x25519_secret()
            .diffie_hellman(&their_identity);
        let dh2 = ephemeral.diffie_hellman(&their_identity);
        let dh3 = ephemeral.diffie_hellman(&their_pre_key);
        let dh4 = ephemeral.diffie_hellman(&their_signed_pre_key);
        ensure_contributory(&[&dh1, &dh2, &dh3, &dh4])?;

        let kem = bundle.kem_public_key().map(kem::encapsulate).transpose()?;
        let secret = self.combine(&dh1, &dh2, &dh3, &dh4, kem.as_ref().map(|(_, ss)| ss));

        tracing::debug!(
            protocol = ?bundle.protocol(),
            pre_key_index,
            peer = %hex::encode(bundle.identity_key()),
            "initiated key agreement"
        );

        Ok((
            secret,
            InitiationHeader {
                ephemeral_key: ephemeral.public_key_bytes(),
                used_pre_key_index: pre_key_index,
                kem_ciphertext: kem.map(|(ciphertext, _)| ciphertext),
            },
        ))
    }

    fn responder_secret(
        &self,
        session: &Session,
        peer: &Bundle,
        ephemeral_key: &[u8; 32],
        pre_key_index: usize,
        kem_ciphertext: Option<&[u8]>,
    ) -> Result<SessionSecret, CryptoError> {
        peer.validate()?;

        let kem_key_pair = match (session.kem_key_pair(), kem_ciphertext) {
            (Some(key_pair), Some(_)) => Some(key_pair),
            (None, None) => None,
            (Some(_), None) => {
                return Err(CryptoError::MalformedMessage(
                    "hybrid session requires a KEM ciphertext".into(),
                ))
            }
            (None, Some(_)) => {
                return Err(CryptoError::MalformedMessage(
                    "classical session received a KEM ciphertext".into(),
                ))
            }
        };

        let pre_key = session.pre_keys().get(pre_key_index)?;
        let their_identity = IdentityKeyPair::peer_identity_to_x25519(peer.identity_key())?;
        let their_ephemeral = X25519Public::from(*ephemeral_key);
        let our_identity = session.identity().to_x25519_secret();

        let dh1 = our_identity.diffie_hellman(&their_identity);
        let dh2 = our_identity.diffie_hellman(&their_ephemeral);
        let dh3 = pre_key.diffie_hellman(&their_ephemeral);
        let dh4 = session
            .signed_pre_key()
            .key_pair()
            .diffie_hellman(&their_ephemeral);
        ensure_contributory(&[&dh1, &dh2, &dh3, &dh4])?;

        let kem_secret = match (kem_key_pair, kem_ciphertext) {
            (Some(key_pair), Some(ciphertext)) => Some(kem::decapsulate(ciphertext, key_pair)?),
            _ => None,
        };
        let secret = self.combine(&dh1, &dh2, &dh3, &dh4, kem_secret.as_ref());

        tracing::debug!(
            protocol = ?session.protocol(),
            pre_key_index,
            peer = %hex::encode(peer.identity_key()),
            "responded to key agreement"
        );
        Ok(secret)
    }

    fn combine(
        &self,
        dh1: &SharedSecret,
        dh2: &SharedSecret,
        dh3: &SharedSecret,
        dh4: &SharedSecret,
        kem_secret: Option<&KemSecret>,
    ) -> SessionSecret {
        let mut secrets: Vec<&[u8]> = [dh1, dh2, dh3, dh4]
            .into_iter()
            .map(|dh| dh.as_bytes().as_slice())
            .collect();
        if let Some(kem_secret) = kem_secret {
            secrets.push(kem_secret.as_slice());
        }
        self.combiner.combine(&secrets)
    }
}

/// Reject all-zero outputs produced by low-order public keys.
fn ensure_contributory(outputs: &[&SharedSecret]) -> Result<(), CryptoError> {
    if outputs.iter().all(|dh| dh.was_contributory()) {
        Ok(())
    } else {
        Err(CryptoError::InvalidKey(
            "Diffie-Hellman with a low-order public key".into(),
        ))
    }
}
