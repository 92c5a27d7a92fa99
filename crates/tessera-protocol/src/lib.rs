pub mod config;
pub mod error;
pub mod wire;

pub use config::{load_config, load_config_file, validate};
pub use error::ProtocolError;
pub use wire::{decode_bundle, decode_message, encode_bundle, encode_message};
