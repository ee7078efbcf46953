//! AES-256-GCM sealing keyed by the shared secret.
//!
//! Wire format: `nonce(12) || ciphertext || auth_tag(16)`.
//! Every call to [`seal`] draws a fresh random nonce from the OS CSPRNG, so
//! sealing the same plaintext twice never produces the same blob.

use crate::crypto::{CryptoError, CryptoResult};
use crate::secret::SharedSecret;
use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};

/// Nonce size for AES-GCM (96 bits = 12 bytes).
pub const NONCE_LEN: usize = 12;

/// Authentication tag size for AES-GCM.
pub const TAG_LEN: usize = 16;

/// Seal plaintext under the shared secret.
///
/// Returns `nonce(12) || ciphertext || auth_tag(16)`.
pub fn seal(secret: &SharedSecret, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
    let cipher = Aes256Gcm::new(secret.as_bytes().into());
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let ciphertext_with_tag = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext_with_tag.len());
    sealed.extend_from_slice(nonce.as_slice());
    sealed.extend_from_slice(&ciphertext_with_tag);
    Ok(sealed)
}

/// Open a blob produced by [`seal`].
///
/// Any failure, including a blob too short to hold a nonce and tag, means the
/// data was not sealed under this secret; no partial plaintext is returned.
pub fn open(secret: &SharedSecret, blob: &[u8]) -> CryptoResult<Vec<u8>> {
    if blob.len() < NONCE_LEN + TAG_LEN {
        return Err(CryptoError::DecryptionFailed(format!(
            "sealed blob too short: {} bytes",
            blob.len()
        )));
    }

    let (nonce_bytes, ciphertext_with_tag) = blob.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new(secret.as_bytes().into());

    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext_with_tag)
        .map_err(|_| CryptoError::AuthenticationFailed)
}
