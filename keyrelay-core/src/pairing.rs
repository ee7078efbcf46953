//! Out-of-band pairing: the versioned transport string carrying the shared secret.
//!
//! The initiator renders `keyrelay://pair/<base64(JSON)>` (typically as a QR
//! code) and the responder parses it. This string is the only place the
//! secret ever travels; it never crosses the relay, which keeps the relay
//! operator limited to metadata.

use crate::secret::{validate_secret, SharedSecret};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// URI scheme of the pairing transport string.
pub const PAIRING_SCHEME: &str = "keyrelay";

/// Action segment of the pairing transport string.
pub const PAIRING_ACTION: &str = "pair";

/// Full prefix every pairing transport string starts with.
pub const PAIRING_PREFIX: &str = "keyrelay://pair/";

/// Payload version produced by this implementation.
pub const CURRENT_PAIRING_VERSION: u64 = 1;

/// Longest input echoed back in an error message.
const MAX_QUOTED_LEN: usize = 120;

/// Errors raised while parsing a pairing transport string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    #[error("Invalid pairing string {input:?}: expected it to start with {expected:?}")]
    InvalidPrefix {
        input: String,
        expected: &'static str,
    },

    #[error("Pairing payload is not valid base64: {0}")]
    InvalidEncoding(String),

    #[error("Pairing payload is not a valid JSON object: {0}")]
    InvalidPayload(String),

    #[error("Unsupported pairing version {found} (supported: {supported})")]
    UnsupportedVersion { found: String, supported: u64 },

    #[error("Invalid shared secret in pairing payload: {value}")]
    InvalidSecret { value: String },
}

/// Data carried by the pairing transport string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingPayload {
    pub version: u64,
    pub shared_secret: SharedSecret,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl PairingPayload {
    pub fn new(shared_secret: SharedSecret, correlation_id: Option<String>) -> Self {
        Self {
            version: CURRENT_PAIRING_VERSION,
            shared_secret,
            correlation_id,
        }
    }
}

/// Build the pairing transport string for a freshly generated secret.
pub fn create_pairing_payload(
    secret: &SharedSecret,
    correlation_id: Option<&str>,
) -> crate::Result<String> {
    let payload = PairingPayload::new(secret.clone(), correlation_id.map(str::to_string));
    let json = serde_json::to_vec(&payload)?;
    Ok(format!("{}{}", PAIRING_PREFIX, STANDARD.encode(json)))
}

/// Parse and validate a pairing transport string.
///
/// Every rejection is a distinct [`HandshakeError`] variant; a bad prefix and
/// a bad secret quote the offending input.
pub fn parse_pairing_payload(text: &str) -> Result<PairingPayload, HandshakeError> {
    let trimmed = text.trim();
    let encoded = trimmed
        .strip_prefix(PAIRING_PREFIX)
        .ok_or_else(|| HandshakeError::InvalidPrefix {
            input: quote(trimmed),
            expected: PAIRING_PREFIX,
        })?;

    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| HandshakeError::InvalidEncoding(e.to_string()))?;

    let value: Value = serde_json::from_slice(&bytes)
        .map_err(|e| HandshakeError::InvalidPayload(e.to_string()))?;
    let object = value
        .as_object()
        .ok_or_else(|| HandshakeError::InvalidPayload("expected a JSON object".to_string()))?;

    // version first: a future format may move or reshape the secret
    match object.get("version") {
        Some(v) if v.as_u64() == Some(CURRENT_PAIRING_VERSION) => {}
        Some(v) => {
            return Err(HandshakeError::UnsupportedVersion {
                found: v.to_string(),
                supported: CURRENT_PAIRING_VERSION,
            })
        }
        None => {
            return Err(HandshakeError::UnsupportedVersion {
                found: "missing".to_string(),
                supported: CURRENT_PAIRING_VERSION,
            })
        }
    }

    let secret_value = object.get("sharedSecret").unwrap_or(&Value::Null);
    if !validate_secret(secret_value) {
        return Err(HandshakeError::InvalidSecret {
            value: quote(&secret_value.to_string()),
        });
    }

    if let Some(correlation) = object.get("correlationId") {
        if !correlation.is_string() && !correlation.is_null() {
            return Err(HandshakeError::InvalidPayload(format!(
                "correlationId must be a string, got {}",
                quote(&correlation.to_string())
            )));
        }
    }

    serde_json::from_value(value).map_err(|e| HandshakeError::InvalidPayload(e.to_string()))
}

fn quote(input: &str) -> String {
    if input.chars().count() <= MAX_QUOTED_LEN {
        input.to_string()
    } else {
        let head: String = input.chars().take(MAX_QUOTED_LEN).collect();
        format!("{}...", head)
    }
}
