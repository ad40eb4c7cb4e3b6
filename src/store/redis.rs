//! Redis storage driver.
//!
//! Records are stored as JSON under their UUID key with a native
//! expiry, so Redis drops them on its own and there is nothing to sweep.

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use uuid::Uuid;

use super::{deleted_one, swept, unavailable, NewSecret, SecretStore, StoredSecret};
use crate::config::DatabaseSettings;
use crate::errors::{EmberdropError, Result};

/// Secret store backed by a multiplexed, auto-reconnecting Redis
/// connection.
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Open a connection and verify it with `PING`.
    pub async fn connect(settings: &DatabaseSettings) -> Result<Self> {
        let url = connection_url(settings);
        let client = redis::Client::open(url.as_str()).map_err(unavailable)?;

        let mut conn = tokio::time::timeout(
            settings.connect_timeout,
            ConnectionManager::new(client),
        )
        .await
        .map_err(|_| EmberdropError::Timeout)?
        .map_err(unavailable)?;

        redis::cmd("PING")
            .query_async::<()>(&mut conn)
            .await
            .map_err(unavailable)?;

        Ok(Self { conn })
    }
}

#[async_trait]
impl SecretStore for RedisStore {
    async fn get(&self, id: &str) -> Result<StoredSecret> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(id).await.map_err(unavailable)?;
        decode(raw)
    }

    async fn create(&self, secret: NewSecret) -> Result<StoredSecret> {
        let record = StoredSecret {
            id: Uuid::new_v4().to_string(),
            value: secret.value,
            expires_at: secret.expires_at,
        };
        let payload = serde_json::to_string(&record)
            .map_err(|e| EmberdropError::SerializationError(e.to_string()))?;

        let mut conn = self.conn.clone();
        let ttl_ms = ttl_millis(&record);
        conn.pset_ex::<_, _, ()>(&record.id, payload, ttl_ms)
            .await
            .map_err(unavailable)?;

        Ok(record)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let removed: u64 = conn.del(id).await.map_err(unavailable)?;
        deleted_one(removed)
    }

    /// Redis expires keys itself, so every sweep comes back empty.
    async fn delete_expired(&self) -> Result<u64> {
        swept(0)
    }

    async fn close(&self) -> Result<()> {
        // ConnectionManager closes when the last clone is dropped.
        Ok(())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

/// A missing key is an unknown (or already expired) secret.
fn decode(raw: Option<String>) -> Result<StoredSecret> {
    let raw = raw.ok_or(EmberdropError::SecretNotFound)?;
    serde_json::from_str(&raw).map_err(|e| EmberdropError::SerializationError(e.to_string()))
}

/// Remaining lifetime in milliseconds. Redis rejects a zero expiry, so a
/// record that is already past its expiry is kept for one millisecond.
fn ttl_millis(record: &StoredSecret) -> u64 {
    let remaining = (record.expires_at - Utc::now()).num_milliseconds();
    remaining.max(1) as u64
}

/// Build a `redis://` URL from the settings, unless a full URI was given.
///
/// `database` selects the logical database when numeric; anything else
/// falls back to database 0.
pub(crate) fn connection_url(settings: &DatabaseSettings) -> String {
    if let Some(uri) = &settings.uri {
        return uri.clone();
    }

    let tls = matches!(
        settings.tls_mode.as_deref(),
        Some(mode) if !matches!(mode, "" | "disable" | "false")
    );
    let scheme = if tls { "rediss" } else { "redis" };

    let auth = match (&settings.username, &settings.password) {
        (Some(user), Some(pass)) => format!("{user}:{pass}@"),
        (None, Some(pass)) => format!(":{pass}@"),
        _ => String::new(),
    };

    let address = settings.address.as_deref().unwrap_or("localhost:6379");
    let db: u32 = settings.database.parse().unwrap_or(0);

    format!("{scheme}://{auth}{address}/{db}")
}
