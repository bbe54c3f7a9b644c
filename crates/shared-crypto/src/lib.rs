//! Encrypted client-side storage
//!
//! This crate seals small pieces of client state (access tokens, pending
//! sign-up or password-reset context) so they are encrypted at rest.

pub mod key;
pub mod seal;
pub mod store;

pub use key::StorageKey;
pub use seal::{open, seal, SealedEnvelope};
pub use store::SealedStore;

use thiserror::Error;

/// Failure to seal or open a record
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SealError {
    #[error("Unsupported envelope version: {0}")]
    UnsupportedVersion(u32),

    #[error("Record was sealed with a different key")]
    KeyMismatch,

    #[error("Record failed authentication")]
    Tampered,

    #[error("Malformed envelope: {0}")]
    Malformed(String),

    #[error("Encryption failed")]
    Encrypt,
}

/// Failure of the sealed store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Seal(#[from] SealError),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Key file is corrupt")]
    InvalidKeyFile,

    #[error("Invalid record name: {0}")]
    InvalidRecordName(String),
}
