//! Shared secret generation and room addressing.
//!
//! The shared secret is the root of trust for a room: it keys the channel
//! cipher and, hashed, names the relay namespace both endpoints use. The room
//! id is public; anyone who learns it can read and write the room's records,
//! but without the secret those records are opaque.

use crate::crypto::{CryptoError, CryptoResult};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length of the shared secret in bytes.
pub const SECRET_LEN: usize = 32;

/// Number of digest bytes kept for the room id (rendered as twice as many hex chars).
pub const ROOM_ID_BYTES: usize = 16;

/// A 256-bit secret shared by the two endpoints of a room.
///
/// Serializes as a JSON array of 32 integers in `0..=255`; that is the only
/// representation [`validate_secret`] accepts.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret([u8; SECRET_LEN]);

impl SharedSecret {
    /// Generate a fresh secret from the operating system CSPRNG.
    ///
    /// Fails rather than falling back to a weaker source.
    pub fn generate() -> CryptoResult<Self> {
        let mut bytes = [0u8; SECRET_LEN];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| CryptoError::RandomFailed(e.to_string()))?;
        Ok(Self(bytes))
    }

    /// Create a secret from raw bytes.
    pub fn from_bytes(bytes: [u8; SECRET_LEN]) -> Self {
        Self(bytes)
    }

    /// Create a secret from a slice, which must be exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        let array: [u8; SECRET_LEN] =
            bytes
                .try_into()
                .map_err(|_| CryptoError::InvalidKeyLength {
                    expected: SECRET_LEN,
                    got: bytes.len(),
                })?;
        Ok(Self(array))
    }

    /// Get the raw key bytes (use sparingly)
    pub fn as_bytes(&self) -> &[u8; SECRET_LEN] {
        &self.0
    }

    /// The public room id derived from this secret.
    pub fn room_id(&self) -> RoomId {
        derive_room_id(self)
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret([REDACTED])")
    }
}

impl Serialize for SharedSecret {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> Deserialize<'de> for SharedSecret {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        // u8 rejects anything outside 0..=255, the length check does the rest
        let mut bytes = Vec::<u8>::deserialize(d)?;
        let secret = Self::from_slice(&bytes).map_err(serde::de::Error::custom);
        bytes.zeroize();
        secret
    }
}

/// Check that a JSON value is a canonical secret: exactly 32 integers, each in `0..=255`.
pub fn validate_secret(value: &serde_json::Value) -> bool {
    match value.as_array() {
        Some(items) => {
            items.len() == SECRET_LEN
                && items
                    .iter()
                    .all(|item| item.as_u64().is_some_and(|n| n <= u64::from(u8::MAX)))
        }
        None => false,
    }
}

/// Public identifier of a room, used only as a relay path prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derive the room id: SHA-256 of the secret, first 16 bytes, uppercase hex.
pub fn derive_room_id(secret: &SharedSecret) -> RoomId {
    let digest = Sha256::digest(secret.as_bytes());
    RoomId(hex::encode_upper(&digest[..ROOM_ID_BYTES]))
}
