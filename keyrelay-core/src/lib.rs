//! keyrelay core library
//!
//! Lets a key-holding device and a signing client that never connect directly
//! exchange signing requests through a public, low-trust key-value relay:
//! - 256-bit shared secret and the public room id derived from it
//! - AES-256-GCM channel keyed by the shared secret
//! - Versioned out-of-band pairing string
//! - Encrypted request lifecycle (`pending -> approved | rejected | error`)
//! - Bounded, cancellable polling for asynchronous answers

pub mod client;
pub mod config;
pub mod crypto;
pub mod models;
pub mod notify;
pub mod pairing;
pub mod platform;
pub mod poll;
pub mod relay;
pub mod schema;
pub mod secret;
pub mod state;

pub use client::{RelayClient, SubmitOptions, Submitted};
pub use config::ClientConfig;
pub use crypto::channel::{decrypt, decrypt_value, decrypt_with_schema, encrypt};
pub use crypto::CryptoError;
pub use models::{
    AnyPayload, DeviceRegistration, ImportAccountRequest, PairingRequest, Request,
    RequestPayload, RequestStatus, RequestType, SignMessageRequest, SignPersonalMessageRequest,
    SignTransactionRequest, SignTypedDataRequest, StoredRequest, TransactionRequest, TypedData,
};
pub use notify::{PushMessage, PushNotifier, PushOutcome};
pub use pairing::{create_pairing_payload, parse_pairing_payload, HandshakeError, PairingPayload};
pub use poll::{poll_until, wait_for_resolution, PollOptions};
pub use relay::{MemoryRelay, RelayBackend, RelayError};
pub use schema::{FieldViolation, Schema, ValidationError};
pub use secret::{derive_room_id, validate_secret, RoomId, SharedSecret};
pub use state::EndpointState;

#[cfg(feature = "http")]
pub use notify::HttpPushNotifier;
#[cfg(feature = "http")]
pub use relay::HttpRelay;

use std::time::Duration;
use thiserror::Error;

/// Result type for keyrelay operations
pub type Result<T> = std::result::Result<T, KeyRelayError>;

/// General error type for keyrelay operations
#[derive(Error, Debug)]
pub enum KeyRelayError {
    #[error("Missing credential: {0}")]
    MissingCredential(String),

    #[error("Pairing handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    /// The ciphertext is not ours: wrong key, tampering, or garbage.
    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Crypto error: {0}")]
    Crypto(CryptoError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Request {id} has type {actual}, expected {expected}")]
    TypeMismatch {
        id: String,
        expected: RequestType,
        actual: RequestType,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Malformed envelope at {path}: {reason}")]
    MalformedEnvelope { path: String, reason: String },

    #[error("Invalid status transition for request {id}: {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: RequestStatus,
        to: RequestStatus,
    },

    #[error("Timed out after {elapsed:?} waiting for request {id}")]
    PollTimeout {
        id: String,
        elapsed: Duration,
        /// Last retryable error seen while polling, if the final attempt failed.
        last_error: Option<Box<KeyRelayError>>,
    },

    #[error("Polling cancelled for request {0}")]
    PollCancelled(String),

    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl KeyRelayError {
    /// Whether a poll loop should try again after this error.
    ///
    /// Transport hiccups, a record that is not written yet, and a record that
    /// is mid-rewrite (undecryptable or failing its schema) can all clear up
    /// on a later read. A type mismatch, a malformed path or a refusing
    /// relay never does.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Relay(e) => e.is_transient(),
            _ => matches!(
                self,
                Self::NotFound(_)
                    | Self::Decryption(_)
                    | Self::Validation(_)
                    | Self::MalformedEnvelope { .. }
            ),
        }
    }
}

impl From<CryptoError> for KeyRelayError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::DecryptionFailed(reason) => Self::Decryption(reason),
            CryptoError::AuthenticationFailed => Self::Decryption(e.to_string()),
            other => Self::Crypto(other),
        }
    }
}
