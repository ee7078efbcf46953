//! Relay backends: a public key-value store addressed by slash-separated paths.
//!
//! The relay sees room ids, request ids, type tags and timestamps. Payloads
//! reach it only as channel ciphertext.

pub mod memory;
pub mod path;
pub mod tree;

#[cfg(feature = "http")]
pub mod http;

pub use memory::MemoryRelay;
pub use path::{
    registration_path, request_path, room_requests_path, validate_path, validate_room_path,
};

#[cfg(feature = "http")]
pub use http::HttpRelay;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Errors raised by a relay backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error("Invalid relay path {0:?}")]
    InvalidPath(String),

    #[error("Relay transport error: {0}")]
    Transport(String),

    #[error("Relay returned {status} for {path}: {body}")]
    Status {
        status: u16,
        path: String,
        body: String,
    },

    #[error("Invalid relay response for {path}: {reason}")]
    InvalidResponse { path: String, reason: String },
}

impl RelayError {
    /// Whether the same call may succeed later.
    ///
    /// A bad path and a 4xx answer other than 404 (not written yet) or 429
    /// (rate limited) will fail the same way every time.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::InvalidPath(_) => false,
            Self::Transport(_) | Self::InvalidResponse { .. } => true,
            Self::Status { status, .. } => {
                !(400..500).contains(status) || matches!(*status, 404 | 429)
            }
        }
    }
}

/// Key-value operations every relay offers.
///
/// `get` on a path with no document but with documents below it returns
/// them assembled into one object keyed by the next path segment. Writing
/// `null` is the same as deleting.
#[async_trait]
pub trait RelayBackend: Send + Sync {
    async fn get(&self, path: &str) -> Result<Option<Value>, RelayError>;

    async fn put(&self, path: &str, value: &Value) -> Result<(), RelayError>;

    async fn delete(&self, path: &str) -> Result<(), RelayError>;
}
