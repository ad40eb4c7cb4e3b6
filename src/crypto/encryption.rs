//! AES-GCM authenticated encryption.
//!
//! Each call to `encrypt` generates a fresh random 12-byte nonce and
//! prepends it to the ciphertext.  `decrypt` splits the nonce back out
//! before decrypting.  The whole buffer is base64 encoded so it can be
//! stored in text columns and JSON documents.
//!
//! Layout of the decoded token:
//!   [ 12-byte nonce | ciphertext + 16-byte auth tag ]

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes128Gcm, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::crypto::keys::derive_cipher_key;
use crate::errors::{EmberdropError, Result};

/// Size of the AES-GCM nonce in bytes.
const NONCE_LEN: usize = 12;

/// Encrypt `plaintext` under the caller-supplied `key` string.
///
/// Returns a self-contained base64 token (nonce || ciphertext || tag).
pub fn encrypt(plaintext: &[u8], key: &str) -> Result<String> {
    let cipher_key = derive_cipher_key(key);
    let sealed = seal(cipher_key.as_bytes(), plaintext)?;
    Ok(STANDARD.encode(sealed))
}

/// Decrypt a token that was produced by `encrypt`.
///
/// Any failure (bad base64, short payload, tag mismatch) is reported as
/// `DecryptionFailed` so callers cannot tell a wrong key from corruption.
pub fn decrypt(token: &str, key: &str) -> Result<Vec<u8>> {
    let sealed = STANDARD
        .decode(token)
        .map_err(|_| EmberdropError::DecryptionFailed)?;
    let cipher_key = derive_cipher_key(key);
    open(cipher_key.as_bytes(), &sealed)
}

/// Encrypt `plaintext` with a raw 16-byte `key`.
///
/// Returns the nonce prepended to the ciphertext (nonce || ciphertext).
pub fn seal(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes128Gcm::new_from_slice(key)
        .map_err(|e| EmberdropError::EncryptionFailed(format!("invalid key length: {e}")))?;

    let nonce = Aes128Gcm::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| EmberdropError::EncryptionFailed(format!("encryption error: {e}")))?;

    // Prepend the nonce so the caller only needs to store one blob.
    let mut output = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    output.extend_from_slice(&nonce);
    output.extend_from_slice(&ciphertext);
    Ok(output)
}

/// Decrypt data that was produced by `seal`.
///
/// Expects the first 12 bytes to be the nonce, followed by the ciphertext.
pub fn open(key: &[u8], ciphertext_with_nonce: &[u8]) -> Result<Vec<u8>> {
    if ciphertext_with_nonce.len() < NONCE_LEN {
        return Err(EmberdropError::DecryptionFailed);
    }

    let (nonce_bytes, ciphertext) = ciphertext_with_nonce.split_at(NONCE_LEN);
    let nonce = Nonce::from_slice(nonce_bytes);

    let cipher = Aes128Gcm::new_from_slice(key).map_err(|_| EmberdropError::DecryptionFailed)?;

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| EmberdropError::DecryptionFailed)
}
