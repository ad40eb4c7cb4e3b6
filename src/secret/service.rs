use std::time::Duration;

use chrono::{DateTime, Utc};

use super::{Secret, SecretRepository, MAX_VALUE_LENGTH};
use crate::config::SecretSettings;
use crate::crypto;
use crate::errors::{EmberdropError, Result};

/// Lifetime applied when a secret is created without a TTL or expiry.
pub const DEFAULT_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Orchestrates the secret lifecycle on top of a [`SecretRepository`].
///
/// Each secret moves `Active -> Redeemed` on its first successful read,
/// or `Active -> Expired` once its expiry passes.  Both are terminal and
/// indistinguishable to callers.
pub struct SecretService {
    repository: SecretRepository,
    encryption_key: String,
    default_ttl: chrono::Duration,
}

impl SecretService {
    pub fn new(repository: SecretRepository, encryption_key: impl Into<String>) -> Result<Self> {
        let encryption_key = encryption_key.into();
        if encryption_key.is_empty() {
            return Err(EmberdropError::ConfigError(
                "the service needs a non-empty encryption key".into(),
            ));
        }

        Ok(Self {
            repository,
            encryption_key,
            default_ttl: to_signed(DEFAULT_TTL)?,
        })
    }

    /// Build from loaded settings.
    pub fn from_settings(repository: SecretRepository, settings: &SecretSettings) -> Result<Self> {
        Self::new(repository, settings.encryption_key.clone())?.with_default_ttl(settings.default_ttl)
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Result<Self> {
        let ttl = to_signed(ttl)?;
        if Utc::now().checked_add_signed(ttl).is_none() {
            return Err(EmberdropError::ConfigError("default TTL is out of range".into()));
        }
        self.default_ttl = ttl;
        Ok(self)
    }

    pub fn repository(&self) -> &SecretRepository {
        &self.repository
    }

    /// Generate a random display string.
    pub fn generate(&self, length: usize, special_characters: bool) -> String {
        crypto::generate(length, special_characters)
    }

    /// Encrypt and store a new secret.
    ///
    /// Expiry precedence: explicit `expires_at`, then `ttl` from now, then
    /// the default TTL.  The passphrase, when present, replaces the
    /// service key for this secret only and is never stored.
    pub async fn create(&self, secret: Secret) -> Result<Secret> {
        validate_value(&secret.value)?;

        let expires_at = match (secret.expires_at, secret.ttl) {
            (Some(at), _) => at,
            (None, Some(ttl)) => expiry_after(ttl)?,
            (None, None) => expiry_after(self.default_ttl)?,
        };
        let key = self.key_for(secret.passphrase.as_deref());

        let created = self.repository.create(&secret.value, key, expires_at).await?;
        tracing::debug!(id = %created.id, "secret created");
        Ok(created)
    }

    /// Redeem a secret: decrypt it, delete it, then return the plaintext.
    ///
    /// A wrong passphrase yields `DecryptionFailed` and the secret stays
    /// redeemable.  If the delete finds nothing, a concurrent reader won
    /// and this call reports `SecretNotFound`.
    pub async fn get(&self, id: &str, passphrase: Option<&str>) -> Result<Secret> {
        let key = self.key_for(passphrase);
        let secret = self.repository.get(id, key).await?;

        self.repository.delete(id).await?;
        tracing::debug!(id = %id, "secret redeemed and deleted");
        Ok(secret)
    }

    /// Burn a secret without returning its value.
    ///
    /// Only a caller able to decrypt it may do so: the same key rules as
    /// [`get`](Self::get) apply, and a wrong passphrase yields
    /// `DecryptionFailed` with the secret left in place.
    pub async fn delete(&self, id: &str, passphrase: Option<&str>) -> Result<()> {
        let key = self.key_for(passphrase);
        self.repository.get(id, key).await?;

        self.repository.delete(id).await?;
        tracing::debug!(id = %id, "secret deleted unread");
        Ok(())
    }

    /// Purge expired secrets and return how many were removed.
    pub async fn delete_expired(&self) -> Result<u64> {
        match self.repository.delete_expired().await {
            Ok(count) => Ok(count),
            Err(EmberdropError::NoSecretsDeleted) => Ok(0),
            Err(e) => Err(e),
        }
    }

    pub async fn close(&self) -> Result<()> {
        self.repository.close().await
    }

    fn key_for<'a>(&'a self, passphrase: Option<&'a str>) -> &'a str {
        match passphrase {
            Some(p) if !p.is_empty() => p,
            _ => &self.encryption_key,
        }
    }
}

fn validate_value(value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(EmberdropError::InvalidRequest("value is required".into()));
    }
    if value.chars().count() > MAX_VALUE_LENGTH {
        return Err(EmberdropError::InvalidRequest(format!(
            "value exceeds {MAX_VALUE_LENGTH} characters"
        )));
    }
    Ok(())
}

fn expiry_after(ttl: chrono::Duration) -> Result<DateTime<Utc>> {
    Utc::now()
        .checked_add_signed(ttl)
        .ok_or_else(|| EmberdropError::InvalidRequest("ttl is out of range".into()))
}

fn to_signed(ttl: Duration) -> Result<chrono::Duration> {
    chrono::Duration::from_std(ttl)
        .map_err(|_| EmberdropError::ConfigError("default TTL is out of range".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use std::sync::Arc;

    fn service() -> (Arc<MemoryStore>, SecretService) {
        let store = Arc::new(MemoryStore::new());
        let repo = SecretRepository::new(store.clone());
        (store, SecretService::new(repo, "service-key").unwrap())
    }

    #[test]
    fn empty_encryption_key_is_rejected() {
        let repo = SecretRepository::new(Arc::new(MemoryStore::new()));
        assert!(SecretService::new(repo, "").is_err());
    }

    #[tokio::test]
    async fn default_ttl_is_seven_days() {
        let (_, svc) = service();
        let created = svc.create(Secret::new("v")).await.unwrap();
        let expires_at = created.expires_at.unwrap();
        let expected = Utc::now() + chrono::Duration::days(7);
        assert!((expected - expires_at).num_seconds().abs() < 5);
    }

    #[tokio::test]
    async fn explicit_expiry_wins_over_ttl() {
        let (_, svc) = service();
        let at = Utc::now() + chrono::Duration::hours(2);
        let created = svc
            .create(
                Secret::new("v")
                    .with_ttl(chrono::Duration::minutes(1))
                    .with_expires_at(at),
            )
            .await
            .unwrap();
        assert_eq!(created.expires_at, Some(at));
    }

    #[tokio::test]
    async fn create_never_echoes_plaintext() {
        let (_, svc) = service();
        let created = svc.create(Secret::new("hello")).await.unwrap();
        assert!(created.value.is_empty());
        assert!(!created.id.is_empty());
    }

    #[tokio::test]
    async fn create_validates_value() {
        let (_, svc) = service();
        let empty = svc.create(Secret::new("")).await;
        assert!(matches!(empty, Err(EmberdropError::InvalidRequest(_))));

        let long = svc.create(Secret::new("x".repeat(MAX_VALUE_LENGTH + 1))).await;
        assert!(matches!(long, Err(EmberdropError::InvalidRequest(_))));

        assert!(svc.create(Secret::new("x".repeat(MAX_VALUE_LENGTH))).await.is_ok());
    }

    #[tokio::test]
    async fn empty_passphrase_falls_back_to_service_key() {
        let (_, svc) = service();
        let created = svc.create(Secret::new("v").with_passphrase("")).await.unwrap();
        let read = svc.get(&created.id, None).await.unwrap();
        assert_eq!(read.value, "v");
    }

    #[tokio::test]
    async fn sweep_with_nothing_expired_is_not_an_error() {
        let (_, svc) = service();
        svc.create(Secret::new("v")).await.unwrap();
        assert_eq!(svc.delete_expired().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn explicit_delete() {
        let (store, svc) = service();
        let created = svc.create(Secret::new("v")).await.unwrap();
        svc.delete(&created.id, None).await.unwrap();
        assert!(store.is_empty());
        assert!(matches!(
            svc.delete(&created.id, None).await,
            Err(EmberdropError::SecretNotFound)
        ));
    }

    #[tokio::test]
    async fn delete_requires_the_passphrase() {
        let (store, svc) = service();
        let created = svc
            .create(Secret::new("v").with_passphrase("pw"))
            .await
            .unwrap();

        for wrong in [None, Some("guess")] {
            assert!(matches!(
                svc.delete(&created.id, wrong).await,
                Err(EmberdropError::DecryptionFailed)
            ));
            assert_eq!(store.len(), 1);
        }

        svc.delete(&created.id, Some("pw")).await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn huge_ttl_is_rejected_not_panicking() {
        let (store, svc) = service();
        for ttl in [chrono::Duration::MAX, chrono::Duration::days(99_999_999)] {
            let result = svc.create(Secret::new("v").with_ttl(ttl)).await;
            assert!(matches!(result, Err(EmberdropError::InvalidRequest(_))));
        }
        assert!(store.is_empty());
    }

    #[test]
    fn unrepresentable_default_ttl_is_rejected() {
        let repo = SecretRepository::new(Arc::new(MemoryStore::new()));
        let svc = SecretService::new(repo, "k").unwrap();
        let centuries = Duration::from_secs(100_000 * 365 * 24 * 60 * 60 * 10);
        assert!(matches!(
            svc.with_default_ttl(centuries),
            Err(EmberdropError::ConfigError(_))
        ));
    }
}
