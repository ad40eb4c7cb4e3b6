//! Secret lifecycle: the encrypting repository facade, the service that
//! enforces TTLs and burn-after-read, and the background expiry sweeper.

pub mod repository;
pub mod service;
pub mod sweeper;

use std::fmt;

use chrono::{DateTime, Utc};

pub use repository::SecretRepository;
pub use service::SecretService;
pub use sweeper::ExpirySweeper;

/// Longest plaintext a secret may hold, in characters.
pub const MAX_VALUE_LENGTH: usize = 5000;

/// A secret as the service sees it.
///
/// On the way in, `value` is plaintext and `passphrase`/`ttl`/`expires_at`
/// are optional creation parameters.  On the way out of `create` only
/// `id` and `expires_at` are filled; on the way out of `get`, `value`
/// holds the decrypted plaintext.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secret {
    pub id: String,
    pub value: String,
    pub passphrase: Option<String>,
    /// Requested lifetime. May be negative, which yields a secret that
    /// is already expired.
    pub ttl: Option<chrono::Duration>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Secret {
    /// A new secret with just a plaintext value.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..Self::default()
        }
    }

    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = Some(passphrase.into());
        self
    }

    pub fn with_ttl(mut self, ttl: chrono::Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret")
            .field("id", &self.id)
            .field("value", &"<redacted>")
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .field("ttl", &self.ttl)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
