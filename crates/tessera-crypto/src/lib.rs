pub mod agreement;
pub mod bundle;
pub mod cipher;
pub mod config;
pub mod error;
pub mod identity;
pub mod kdf;
pub mod kem;
pub mod keys;
pub mod ratchet;
pub mod safety_number;
pub mod session;

pub use agreement::{EncryptedMessage, InitiationHeader, KeyAgreement};
pub use bundle::{
    Bundle, BundleKeys, ClassicalBundle, HybridBundle, SignedPreKeyPublic, VerifiedBundle,
};
pub use cipher::{Aes256GcmCipher, MessageCipher, XChaCha20Poly1305Cipher};
pub use config::{CipherSuite, ProtocolConfig};
pub use error::CryptoError;
pub use identity::IdentityKeyPair;
pub use kdf::{CipherKey, Combiner, SessionSecret};
pub use kem::KemKeyPair;
pub use keys::{KeyPair, SignedPreKeyPair};
pub use ratchet::{ChainRatchet, RatchetMessage, Role};
pub use safety_number::SafetyNumber;
pub use session::{PreKeyClaim, PreKeyPool, Protocol, Session};
