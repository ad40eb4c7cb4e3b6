//! Backend-agnostic repository facade.
//!
//! Wraps the storage driver chosen at startup.  Plaintext is encrypted
//! here before it reaches the driver and decrypted here after it leaves,
//! and every driver call is bounded by the configured timeout.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::Secret;
use crate::crypto;
use crate::errors::{EmberdropError, Result};
use crate::store::{NewSecret, SecretStore};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct SecretRepository {
    store: Arc<dyn SecretStore>,
    timeout: Duration,
}

impl SecretRepository {
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self {
            store,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Name of the underlying driver.
    pub fn driver(&self) -> &'static str {
        self.store.name()
    }

    /// Fetch and decrypt a secret.
    ///
    /// A record past its expiry is treated as absent: it is removed on
    /// the spot and `SecretNotFound` is returned without attempting to
    /// decrypt.  A decryption failure leaves the record in place.
    pub async fn get(&self, id: &str, key: &str) -> Result<Secret> {
        let record = self.bounded(self.store.get(id)).await?;

        if record.is_expired(Utc::now()) {
            match self.bounded(self.store.delete(id)).await {
                Ok(()) | Err(EmberdropError::SecretNotFound) => {}
                Err(e) => tracing::warn!(error = %e, "failed to remove expired secret on read"),
            }
            return Err(EmberdropError::SecretNotFound);
        }

        let plaintext = crypto::decrypt(&record.value, key)?;
        let value = String::from_utf8(plaintext).map_err(|_| EmberdropError::DecryptionFailed)?;

        Ok(Secret {
            id: record.id,
            value,
            passphrase: None,
            ttl: None,
            expires_at: Some(record.expires_at),
        })
    }

    /// Encrypt `value` under `key` and persist it.
    ///
    /// The returned secret carries the driver-assigned id and stored
    /// expiry, never the plaintext.
    pub async fn create(&self, value: &str, key: &str, expires_at: DateTime<Utc>) -> Result<Secret> {
        let token = crypto::encrypt(value.as_bytes(), key)?;
        let record = self
            .bounded(self.store.create(NewSecret {
                value: token,
                expires_at,
            }))
            .await?;

        Ok(Secret {
            id: record.id,
            expires_at: Some(record.expires_at),
            ..Secret::default()
        })
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        self.bounded(self.store.delete(id)).await
    }

    /// Remove every expired record. `NoSecretsDeleted` is passed through
    /// for the service to interpret.
    pub async fn delete_expired(&self) -> Result<u64> {
        self.bounded(self.store.delete_expired()).await
    }

    pub async fn close(&self) -> Result<()> {
        self.bounded(self.store.close()).await
    }

    async fn bounded<T>(&self, operation: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.timeout, operation)
            .await
            .map_err(|_| EmberdropError::Timeout)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::store::StoredSecret;
    use async_trait::async_trait;

    fn repository() -> (Arc<MemoryStore>, SecretRepository) {
        let store = Arc::new(MemoryStore::new());
        let repo = SecretRepository::new(store.clone());
        (store, repo)
    }

    #[tokio::test]
    async fn driver_only_sees_ciphertext() {
        let (store, repo) = repository();
        let created = repo
            .create("plain words", "key", Utc::now() + chrono::Duration::hours(1))
            .await
            .unwrap();

        let raw = store.get(&created.id).await.unwrap();
        assert_ne!(raw.value, "plain words");
        assert!(!raw.value.contains("plain"));

        let fetched = repo.get(&created.id, "key").await.unwrap();
        assert_eq!(fetched.value, "plain words");
    }

    #[tokio::test]
    async fn wrong_key_keeps_record() {
        let (store, repo) = repository();
        let created = repo
            .create("v", "right", Utc::now() + chrono::Duration::hours(1))
            .await
            .unwrap();

        let result = repo.get(&created.id, "wrong").await;
        assert!(matches!(result, Err(EmberdropError::DecryptionFailed)));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn expired_record_is_removed_on_read() {
        let (store, repo) = repository();
        let created = repo
            .create("v", "key", Utc::now() - chrono::Duration::seconds(1))
            .await
            .unwrap();

        let result = repo.get(&created.id, "key").await;
        assert!(matches!(result, Err(EmberdropError::SecretNotFound)));
        assert!(store.is_empty());
    }

    struct StalledStore;

    #[async_trait]
    impl SecretStore for StalledStore {
        async fn get(&self, _id: &str) -> Result<StoredSecret> {
            std::future::pending().await
        }
        async fn create(&self, _secret: NewSecret) -> Result<StoredSecret> {
            std::future::pending().await
        }
        async fn delete(&self, _id: &str) -> Result<()> {
            std::future::pending().await
        }
        async fn delete_expired(&self) -> Result<u64> {
            std::future::pending().await
        }
        async fn close(&self) -> Result<()> {
            Ok(())
        }
        fn name(&self) -> &'static str {
            "stalled"
        }
    }

    #[tokio::test]
    async fn stalled_backend_times_out() {
        let repo = SecretRepository::new(Arc::new(StalledStore))
            .with_timeout(Duration::from_millis(20));

        let result = repo.get("id", "key").await;
        assert!(matches!(result, Err(EmberdropError::Timeout)));
    }
}
