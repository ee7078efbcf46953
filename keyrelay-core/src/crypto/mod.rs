//! Cryptographic primitives for the relay channel.
//!
//! This module provides:
//! - AES-256-GCM sealing with a fresh random nonce per message
//! - The symmetric channel: serializable payloads in, base64 strings out

pub mod channel;
pub mod cipher;

pub use channel::{decrypt, decrypt_value, decrypt_with_schema, encrypt};
pub use cipher::{open, seal, NONCE_LEN, TAG_LEN};

use thiserror::Error;

/// Errors that can occur in cryptographic operations
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    #[error("Authentication failed - data may have been tampered with")]
    AuthenticationFailed,

    #[error("Random number generation failed: {0}")]
    RandomFailed(String),
}

/// Result type for crypto operations
pub type CryptoResult<T> = std::result::Result<T, CryptoError>;
