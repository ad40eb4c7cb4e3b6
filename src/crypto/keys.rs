//! Cipher key derivation.
//!
//! Every secret is sealed under a key string: either the passphrase the
//! creator supplied or the service-wide encryption key.  The string is
//! hashed with MD5 into a 128-bit AES key.
//!
//! MD5 is a fast digest, not a password KDF: a low-entropy passphrase
//! offers little resistance to offline guessing once ciphertext leaks.
//! The derivation is kept byte-for-byte so existing tokens stay readable;
//! operators should use long random passphrases and encryption keys.

use zeroize::Zeroize;

/// Length of the derived cipher key (128 bits, AES-128-GCM).
pub const KEY_LEN: usize = 16;

/// Derive the AES key for a caller-supplied key string.
pub fn derive_cipher_key(key: &str) -> CipherKey {
    let digest = md5::compute(key.as_bytes());
    CipherKey::new(digest.0)
}

/// A wrapper around a derived 16-byte cipher key that automatically
/// zeroes its memory when dropped.
#[derive(Zeroize)]
#[zeroize(drop)]
pub struct CipherKey {
    bytes: [u8; KEY_LEN],
}

impl CipherKey {
    /// Create a new `CipherKey` from raw bytes.
    pub fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    /// Access the raw key bytes (e.g. to pass to the cipher).
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}
