use thiserror::Error;

/// All errors that can occur in Emberdrop.
///
/// Storage drivers translate their engine errors into this taxonomy
/// before returning, so nothing above the driver layer ever sees a
/// `sqlx`, `mongodb`, `redis`, or `tiberius` error type.
#[derive(Debug, Error)]
pub enum EmberdropError {
    // --- Domain errors ---
    /// Unknown id, already redeemed, or expired. Deliberately one variant.
    #[error("secret not found")]
    SecretNotFound,

    /// A sweep found nothing to remove. Absorbed by the service.
    #[error("no secrets deleted")]
    NoSecretsDeleted,

    #[error("decryption failed: wrong passphrase or corrupted data")]
    DecryptionFailed,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("too many requests, retry after {retry_after_secs}s")]
    TooManyRequests { retry_after_secs: u64 },

    // --- Crypto errors ---
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    // --- Storage errors ---
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("storage operation timed out")]
    Timeout,

    #[error("unsupported database driver: {0}")]
    UnsupportedDriver(String),

    // --- Config errors ---
    #[error("config error: {0}")]
    ConfigError(String),

    // --- IO errors ---
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // --- Serialization errors ---
    #[error("serialization error: {0}")]
    SerializationError(String),
}

impl EmberdropError {
    /// HTTP status code for this error at the service boundary.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::SecretNotFound => 404,
            Self::DecryptionFailed => 401,
            Self::InvalidRequest(_) => 400,
            Self::TooManyRequests { .. } => 429,
            _ => 500,
        }
    }

    /// The fixed message shown to clients for this error.
    ///
    /// Internal detail (driver messages, config paths) never leaves the
    /// process; only validation errors carry their own text because the
    /// caller needs to know which field was wrong.
    pub fn client_message(&self) -> String {
        match self {
            Self::SecretNotFound => "secret not found".to_string(),
            Self::DecryptionFailed => "invalid passphrase".to_string(),
            Self::InvalidRequest(reason) => format!("invalid request: {reason}"),
            Self::TooManyRequests { .. } => "too many requests".to_string(),
            _ => "internal server error".to_string(),
        }
    }
}

/// Convenience type alias for Emberdrop results.
pub type Result<T> = std::result::Result<T, EmberdropError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_map_to_fixed_status_codes() {
        assert_eq!(EmberdropError::SecretNotFound.status_code(), 404);
        assert_eq!(EmberdropError::DecryptionFailed.status_code(), 401);
        assert_eq!(
            EmberdropError::InvalidRequest("ttl".into()).status_code(),
            400
        );
        assert_eq!(
            EmberdropError::TooManyRequests {
                retry_after_secs: 1
            }
            .status_code(),
            429
        );
        assert_eq!(
            EmberdropError::StorageUnavailable("down".into()).status_code(),
            500
        );
        assert_eq!(EmberdropError::Timeout.status_code(), 500);
    }

    #[test]
    fn infrastructure_detail_is_not_exposed() {
        let err = EmberdropError::StorageUnavailable("connection refused at 10.0.0.3".into());
        assert_eq!(err.client_message(), "internal server error");
    }
}
