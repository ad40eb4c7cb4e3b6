//! Cryptographic primitives for Emberdrop.
//!
//! This module provides:
//! - AES-GCM envelope encryption into a base64 token (`encryption`)
//! - Cipher key derivation from a caller-supplied key string (`keys`)
//! - Random display strings for the "generate a password" feature (`generator`)

pub mod encryption;
pub mod generator;
pub mod keys;

// Re-export the most commonly used items so callers can write:
//   use crate::crypto::{encrypt, decrypt, generate};
pub use encryption::{decrypt, encrypt};
pub use generator::{generate, MAX_GENERATED_LENGTH};
pub use keys::{derive_cipher_key, CipherKey};
