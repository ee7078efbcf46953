//! Symmetric channel: serializable messages in, base64 ciphertext strings out.
//!
//! `encrypt` renders `base64(nonce || ciphertext || tag)`. `decrypt` is the
//! inverse and never hands back data that failed authentication. When a
//! schema is supplied the decrypted JSON is checked before deserialization,
//! and every violated field is reported at once.

use crate::crypto::cipher::{open, seal};
use crate::crypto::CryptoError;
use crate::schema::{FieldViolation, Schema, ValidationError};
use crate::secret::SharedSecret;
use crate::Result;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use zeroize::Zeroize;

/// Serialize and encrypt a message under the shared secret.
pub fn encrypt<T: Serialize + ?Sized>(message: &T, secret: &SharedSecret) -> Result<String> {
    let mut plaintext = serde_json::to_vec(message)?;
    let sealed = seal(secret, &plaintext);
    plaintext.zeroize();
    Ok(STANDARD.encode(sealed?))
}

/// Decrypt to raw JSON without any shape checks.
pub fn decrypt_value(encoded: &str, secret: &SharedSecret) -> Result<Value> {
    let blob = STANDARD
        .decode(encoded.trim())
        .map_err(|e| CryptoError::DecryptionFailed(format!("invalid base64: {}", e)))?;

    let mut plaintext = open(secret, &blob)?;
    let value = serde_json::from_slice(&plaintext).map_err(|e| {
        CryptoError::DecryptionFailed(format!("plaintext is not valid JSON: {}", e))
    });
    plaintext.zeroize();
    Ok(value?)
}

/// Decrypt and deserialize a message.
pub fn decrypt<T: DeserializeOwned>(encoded: &str, secret: &SharedSecret) -> Result<T> {
    let value = decrypt_value(encoded, secret)?;
    Ok(serde_json::from_value(value)?)
}

/// Decrypt, validate against `schema`, then deserialize.
pub fn decrypt_with_schema<T: DeserializeOwned>(
    encoded: &str,
    secret: &SharedSecret,
    schema: &Schema,
) -> Result<T> {
    let value = decrypt_value(encoded, secret)?;
    schema.validate(&value)?;
    serde_json::from_value(value).map_err(|e| {
        ValidationError::new(schema.name, vec![FieldViolation::new("$", e.to_string())]).into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RequestType, SignPersonalMessageRequest};
    use crate::KeyRelayError;
    use serde_json::json;

    const FROM: &str = "0x52908400098527886E0F7030069857D2E4169EE7";

    fn secret(byte: u8) -> SharedSecret {
        SharedSecret::from_bytes([byte; 32])
    }

    #[test]
    fn roundtrip_arbitrary_json() {
        let key = secret(1);
        let message = json!({"status": "pending", "nested": {"list": [1, 2, 3]}, "n": null});
        let encoded = encrypt(&message, &key).unwrap();
        let decoded: Value = decrypt(&encoded, &key).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn encrypting_twice_differs() {
        let key = secret(1);
        let a = encrypt(&json!({"a": 1}), &key).unwrap();
        let b = encrypt(&json!({"a": 1}), &key).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_secret_is_decryption_error() {
        let encoded = encrypt(&json!({"a": 1}), &secret(1)).unwrap();
        let err = decrypt_value(&encoded, &secret(2)).unwrap_err();
        assert!(matches!(err, KeyRelayError::Decryption(_)), "{err:?}");
    }

    #[test]
    fn garbage_is_decryption_error() {
        let err = decrypt_value("not base64 at all!", &secret(1)).unwrap_err();
        assert!(matches!(err, KeyRelayError::Decryption(_)));

        let err = decrypt_value(&STANDARD.encode([0u8; 4]), &secret(1)).unwrap_err();
        assert!(matches!(err, KeyRelayError::Decryption(_)));
    }

    #[test]
    fn schema_validation_passes_typed_payload() {
        let key = secret(5);
        let payload = json!({"status": "pending", "from": FROM, "message": "hi"});
        let encoded = encrypt(&payload, &key).unwrap();

        let decoded: SignPersonalMessageRequest =
            decrypt_with_schema(&encoded, &key, RequestType::SignPersonalMessage.schema())
                .unwrap();
        assert_eq!(decoded.message, "hi");
    }

    #[test]
    fn schema_validation_lists_every_violation() {
        let key = secret(5);
        let payload = json!({"status": "finished", "from": "0x1234"});
        let encoded = encrypt(&payload, &key).unwrap();

        let err = decrypt_with_schema::<SignPersonalMessageRequest>(
            &encoded,
            &key,
            RequestType::SignPersonalMessage.schema(),
        )
        .unwrap_err();

        match err {
            KeyRelayError::Validation(validation) => {
                let fields = validation.fields();
                assert!(fields.contains(&"status"));
                assert!(fields.contains(&"from"));
                assert!(fields.contains(&"message"));
                assert_eq!(validation.violations.len(), 3);
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }
}
