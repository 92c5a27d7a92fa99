use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("secure random source unavailable: {0}")]
    RandomnessUnavailable(String),

    #[error("malformed bundle: {0}")]
    MalformedBundle(String),

    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("pre-key index {index} out of range (pool holds {len})")]
    PreKeyIndexOutOfRange { index: usize, len: usize },

    #[error("pre-key {0} has already been consumed")]
    PreKeyConsumed(usize),

    #[error("all {0} published pre-keys have been used")]
    PreKeysExhausted(usize),

    #[error("KEM decapsulation failed: {0}")]
    DecapsulationFailure(String),

    #[error("verification failed: {0}")]
    VerificationError(String),

    #[error("encryption failed: {0}")]
    EncryptionError(String),

    #[error("decryption failed: {0}")]
    DecryptionError(String),

    #[error("invalid key material: {0}")]
    InvalidKey(String),

    #[error("ratchet error: {0}")]
    RatchetError(String),
}
