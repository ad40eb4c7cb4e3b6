//! In-memory storage driver.
//!
//! A `HashMap` behind a `std::sync::Mutex`.  The lock is held only for the
//! map operation itself and never across an `.await`.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::{swept, NewSecret, SecretStore, StoredSecret};
use crate::errors::{EmberdropError, Result};

/// Process-local secret store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    secrets: Mutex<HashMap<String, StoredSecret>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently held, expired or not.
    pub fn len(&self) -> usize {
        self.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, StoredSecret>>> {
        self.secrets
            .lock()
            .map_err(|_| EmberdropError::StorageUnavailable("memory store lock poisoned".into()))
    }
}

#[async_trait]
impl SecretStore for MemoryStore {
    async fn get(&self, id: &str) -> Result<StoredSecret> {
        self.lock()?
            .get(id)
            .cloned()
            .ok_or(EmberdropError::SecretNotFound)
    }

    async fn create(&self, secret: NewSecret) -> Result<StoredSecret> {
        let record = StoredSecret {
            id: Uuid::new_v4().to_string(),
            value: secret.value,
            expires_at: secret.expires_at,
        };
        self.lock()?.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.lock()?
            .remove(id)
            .map(|_| ())
            .ok_or(EmberdropError::SecretNotFound)
    }

    async fn delete_expired(&self) -> Result<u64> {
        let now = Utc::now();
        let mut secrets = self.lock()?;
        let before = secrets.len();
        secrets.retain(|_, s| !s.is_expired(now));
        swept((before - secrets.len()) as u64)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
