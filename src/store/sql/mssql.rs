//! SQL Server connection for the SQL store.
//!
//! `sqlx` has no SQL Server support, so this dialect talks TDS through
//! `tiberius`.  A single client is shared behind an async mutex; the
//! lock is held for one statement (or one transaction) at a time.
//!
//! A statement cancelled part way (a repository timeout, a dropped
//! request) leaves the TDS stream in an unknown state, possibly inside an
//! open transaction.  Every operation therefore runs in a [`Session`]: if
//! it is dropped before [`Session::finish`], the client is discarded and
//! the next operation dials a fresh one.

use std::ops::DerefMut;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use tiberius::{Client, Config, Row};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use uuid::Uuid;

use super::queries::Queries;
use crate::errors::{EmberdropError, Result};
use crate::store::{unavailable, NewSecret, StoredSecret};

type TdsClient = Client<Compat<TcpStream>>;

pub struct MsSqlConnection {
    config: Config,
    client: Mutex<Option<TdsClient>>,
    closed: AtomicBool,
}

impl MsSqlConnection {
    pub async fn connect(config: Config) -> Result<Self> {
        let client = open(&config).await?;
        Ok(Self {
            config,
            client: Mutex::new(Some(client)),
            closed: AtomicBool::new(false),
        })
    }

    pub async fn execute_batch(&self, sql: &str) -> Result<()> {
        let mut session = self.session().await?;
        session
            .client()?
            .simple_query(sql)
            .await
            .map_err(unavailable)?
            .into_results()
            .await
            .map_err(unavailable)?;
        session.finish();
        Ok(())
    }

    pub async fn get(&self, queries: &Queries, id: &str) -> Result<StoredSecret> {
        let mut session = self.session().await?;
        let row = select(session.client()?, queries, id).await?;
        session.finish();

        decode(&row.ok_or(EmberdropError::SecretNotFound)?)
    }

    /// Insert and read back inside one transaction.
    ///
    /// Any failure drops the session unfinished, so the server rolls the
    /// transaction back when the discarded connection closes.
    pub async fn create(&self, queries: &Queries, secret: NewSecret) -> Result<StoredSecret> {
        let id = Uuid::new_v4().to_string();

        let mut session = self.session().await?;
        let client = session.client()?;

        batch(client, "BEGIN TRANSACTION").await?;
        client
            .execute(
                queries.insert.as_str(),
                &[&id.as_str(), &secret.value.as_str(), &secret.expires_at],
            )
            .await
            .map_err(unavailable)?;
        let row = select(client, queries, &id).await?;
        batch(client, "COMMIT").await?;
        session.finish();

        decode(&row.ok_or(EmberdropError::SecretNotFound)?)
    }

    pub async fn delete(&self, queries: &Queries, id: &str) -> Result<u64> {
        let mut session = self.session().await?;
        let result = session
            .client()?
            .execute(queries.delete.as_str(), &[&id])
            .await
            .map_err(unavailable)?;
        session.finish();
        Ok(result.total())
    }

    pub async fn delete_expired(&self, queries: &Queries) -> Result<u64> {
        let mut session = self.session().await?;
        let result = session
            .client()?
            .execute(queries.delete_expired.as_str(), &[])
            .await
            .map_err(unavailable)?;
        session.finish();
        Ok(result.total())
    }

    pub async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(client) = self.client.lock().await.take() {
            client.close().await.map_err(unavailable)?;
        }
        Ok(())
    }

    /// Lock the shared client, redialling if an earlier session was
    /// discarded.
    async fn session(&self) -> Result<Session<'_, TdsClient>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(closed());
        }

        let mut slot = self.client.lock().await;
        if slot.is_none() {
            tracing::info!("reconnecting to mssql");
            *slot = Some(open(&self.config).await?);
        }
        Ok(Session::new(slot))
    }
}

async fn open(config: &Config) -> Result<TdsClient> {
    let tcp = TcpStream::connect(config.get_addr())
        .await
        .map_err(unavailable)?;
    tcp.set_nodelay(true).map_err(unavailable)?;

    Client::connect(config.clone(), tcp.compat_write())
        .await
        .map_err(unavailable)
}

/// Exclusive use of the shared client for one operation.
///
/// Dropping a session that was never finished empties the slot.
struct Session<'a, T> {
    slot: MutexGuard<'a, Option<T>>,
    finished: bool,
}

impl<'a, T> Session<'a, T> {
    fn new(slot: MutexGuard<'a, Option<T>>) -> Self {
        Self {
            slot,
            finished: false,
        }
    }

    fn client(&mut self) -> Result<&mut T> {
        self.slot.deref_mut().as_mut().ok_or_else(closed)
    }

    /// Mark the client as back at a statement boundary.
    fn finish(mut self) {
        self.finished = true;
    }
}

impl<T> Drop for Session<'_, T> {
    fn drop(&mut self) {
        if !self.finished && self.slot.take().is_some() {
            tracing::warn!("discarding mssql connection after an interrupted operation");
        }
    }
}

fn closed() -> EmberdropError {
    EmberdropError::StorageUnavailable("mssql connection closed".into())
}

async fn batch(client: &mut TdsClient, sql: &str) -> Result<()> {
    client
        .simple_query(sql)
        .await
        .map_err(unavailable)?
        .into_results()
        .await
        .map_err(unavailable)?;
    Ok(())
}

async fn select(client: &mut TdsClient, queries: &Queries, id: &str) -> Result<Option<Row>> {
    client
        .query(queries.select_by_id.as_str(), &[&id])
        .await
        .map_err(unavailable)?
        .into_row()
        .await
        .map_err(unavailable)
}

fn decode(row: &Row) -> Result<StoredSecret> {
    let id: &str = row
        .try_get(0)
        .map_err(unavailable)?
        .ok_or_else(|| missing("ID"))?;
    let value: &str = row
        .try_get(1)
        .map_err(unavailable)?
        .ok_or_else(|| missing("Value"))?;
    let expires_at: DateTime<Utc> = row
        .try_get(2)
        .map_err(unavailable)?
        .ok_or_else(|| missing("ExpiresAt"))?;

    Ok(StoredSecret {
        id: id.to_string(),
        value: value.to_string(),
        expires_at,
    })
}

fn missing(column: &str) -> EmberdropError {
    EmberdropError::SerializationError(format!("column {column} is NULL"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn finished_session_keeps_the_client() {
        let shared = Mutex::new(Some(7u32));

        let mut session = Session::new(shared.lock().await);
        assert_eq!(*session.client().unwrap(), 7);
        session.finish();

        assert_eq!(*shared.lock().await, Some(7));
    }

    #[tokio::test]
    async fn unfinished_session_discards_the_client() {
        let shared = Mutex::new(Some(7u32));

        {
            let mut session = Session::new(shared.lock().await);
            *session.client().unwrap() += 1;
            // A failed statement returns early without finishing.
        }

        assert!(shared.lock().await.is_none());
    }

    #[tokio::test]
    async fn cancelled_operation_discards_the_client() {
        let shared = Mutex::new(Some(7u32));

        let operation = async {
            let mut session = Session::new(shared.lock().await);
            *session.client().unwrap() += 1;
            // Stands in for a COMMIT that never comes back.
            std::future::pending::<()>().await;
            session.finish();
        };
        let outcome = tokio::time::timeout(Duration::from_millis(10), operation).await;
        assert!(outcome.is_err());

        assert!(shared.lock().await.is_none());
    }

    #[tokio::test]
    async fn empty_slot_reports_closed() {
        let shared: Mutex<Option<u32>> = Mutex::new(None);
        let mut session = Session::new(shared.lock().await);
        assert!(matches!(
            session.client(),
            Err(EmberdropError::StorageUnavailable(_))
        ));
    }
}
