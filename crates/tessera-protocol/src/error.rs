use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("crypto error: {0}")]
    CryptoError(#[from] tessera_crypto::CryptoError),
}
