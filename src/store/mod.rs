//! Storage drivers — persistence of encrypted secret records.
//!
//! Every backend implements the narrow [`SecretStore`] contract.  Records
//! only ever carry ciphertext; encryption happens one layer up in
//! [`crate::secret::SecretRepository`].
//!
//! Drivers:
//! - `memory` — mutex-protected map, for tests and single-process use
//! - `mongo` — document store, ObjectId keys, explicit sweep
//! - `redis` — key-value store, UUID keys, native per-key TTL
//! - `sql` — Postgres / MSSQL / MySQL / MariaDB / SQLite dialects

pub mod memory;
pub mod mongo;
pub mod redis;
pub mod sql;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{DatabaseDriver, DatabaseSettings};
use crate::errors::{EmberdropError, Result};

/// A persisted secret record. `value` is always an encryption token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSecret {
    pub id: String,
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl StoredSecret {
    /// Returns `true` once `expires_at` has passed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// A record about to be inserted. The driver assigns the id.
#[derive(Debug, Clone)]
pub struct NewSecret {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

/// The contract every storage backend satisfies.
///
/// Error translation rules, shared by all drivers:
/// - unknown id on `get`/`delete`, or a delete affecting zero records,
///   is `SecretNotFound`
/// - a sweep that removes nothing is `NoSecretsDeleted`
/// - everything else (connection, query, decode) is `StorageUnavailable`
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetch a record by id.
    async fn get(&self, id: &str) -> Result<StoredSecret>;

    /// Insert a record and return it exactly as persisted.
    async fn create(&self, secret: NewSecret) -> Result<StoredSecret>;

    /// Delete a record by id.
    async fn delete(&self, id: &str) -> Result<()>;

    /// Delete every record whose expiry has passed; returns the count.
    async fn delete_expired(&self) -> Result<u64>;

    /// Release the underlying connections.
    async fn close(&self) -> Result<()>;

    /// Short backend name used in logs.
    fn name(&self) -> &'static str;
}

/// Connect to the backend selected in `settings`.
///
/// Driver selection happens once here; the returned handle is shared by
/// the service for the lifetime of the process.
pub async fn connect(settings: &DatabaseSettings) -> Result<Arc<dyn SecretStore>> {
    let store: Arc<dyn SecretStore> = match settings.driver {
        DatabaseDriver::Memory => Arc::new(memory::MemoryStore::new()),
        DatabaseDriver::Mongo => Arc::new(mongo::MongoStore::connect(settings).await?),
        DatabaseDriver::Redis => Arc::new(redis::RedisStore::connect(settings).await?),
        DatabaseDriver::Postgres
        | DatabaseDriver::MsSql
        | DatabaseDriver::MySql
        | DatabaseDriver::MariaDb
        | DatabaseDriver::Sqlite => Arc::new(sql::SqlStore::connect(settings).await?),
    };

    tracing::info!(driver = store.name(), "storage driver connected");
    Ok(store)
}

/// Map the row count of a single-record delete onto the contract.
pub(crate) fn deleted_one(count: u64) -> Result<()> {
    match count {
        0 => Err(EmberdropError::SecretNotFound),
        _ => Ok(()),
    }
}

/// Map the row count of an expiry sweep onto the contract.
pub(crate) fn swept(count: u64) -> Result<u64> {
    match count {
        0 => Err(EmberdropError::NoSecretsDeleted),
        n => Ok(n),
    }
}

/// Convert any engine error into `StorageUnavailable`, keeping its text
/// for the server log.
pub(crate) fn unavailable(err: impl std::fmt::Display) -> EmberdropError {
    EmberdropError::StorageUnavailable(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn record_expiry_is_inclusive_of_now() {
        let now = Utc::now();
        let record = StoredSecret {
            id: "1".into(),
            value: "token".into(),
            expires_at: now,
        };
        assert!(record.is_expired(now));
        assert!(!record.is_expired(now - Duration::seconds(1)));
    }

    #[test]
    fn record_serializes_with_camel_case_expiry() {
        let record = StoredSecret {
            id: "1".into(),
            value: "token".into(),
            expires_at: Utc::now(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("expiresAt").is_some());
    }

    #[test]
    fn delete_counts_map_to_not_found() {
        assert!(matches!(deleted_one(0), Err(EmberdropError::SecretNotFound)));
        assert!(deleted_one(1).is_ok());
        // Duplicate ids are impossible, but more than one row still counts as done.
        assert!(deleted_one(2).is_ok());
    }

    #[test]
    fn empty_sweep_is_reported() {
        assert!(matches!(swept(0), Err(EmberdropError::NoSecretsDeleted)));
        assert_eq!(swept(3).unwrap(), 3);
    }

    #[test]
    fn engine_errors_become_unavailable() {
        match unavailable("connection reset") {
            EmberdropError::StorageUnavailable(text) => assert_eq!(text, "connection reset"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn connect_memory_driver() {
        let settings = DatabaseSettings::default();
        let store = connect(&settings).await.unwrap();
        assert_eq!(store.name(), "memory");
    }
}
