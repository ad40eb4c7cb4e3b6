//! Relational storage driver.
//!
//! One store type serves Postgres, MySQL/MariaDB, and SQLite through
//! `sqlx`, and SQL Server through `tiberius`.  Dialect differences live in
//! [`queries::Queries`] (placeholder syntax, "now" expression, DDL) and in
//! the column types bound for each pool.
//!
//! The table is created on construction if it does not exist, and
//! `create` runs insert + select-back in a single transaction so the
//! caller receives the row exactly as persisted.

pub mod mssql;
pub mod options;
pub mod queries;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use uuid::Uuid;

use self::mssql::MsSqlConnection;
use self::queries::{Queries, DEFAULT_TABLE};
use super::{deleted_one, swept, unavailable, NewSecret, SecretStore, StoredSecret};
use crate::config::{DatabaseDriver, DatabaseSettings};
use crate::errors::{EmberdropError, Result};

const MAX_CONNECTIONS: u32 = 10;

/// SQL flavour. MariaDB speaks the MySQL dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    MsSql,
    MySql,
    Sqlite,
}

impl Dialect {
    pub fn from_driver(driver: DatabaseDriver) -> Result<Self> {
        match driver {
            DatabaseDriver::Postgres => Ok(Self::Postgres),
            DatabaseDriver::MsSql => Ok(Self::MsSql),
            DatabaseDriver::MySql | DatabaseDriver::MariaDb => Ok(Self::MySql),
            DatabaseDriver::Sqlite => Ok(Self::Sqlite),
            other => Err(EmberdropError::UnsupportedDriver(format!(
                "{other} is not a SQL driver"
            ))),
        }
    }
}

enum Pool {
    Postgres(PgPool),
    MySql(MySqlPool),
    Sqlite(SqlitePool),
    MsSql(MsSqlConnection),
}

pub struct SqlStore {
    pool: Pool,
    queries: Queries,
    dialect: Dialect,
}

impl SqlStore {
    /// Open the pool for the configured dialect and provision the table.
    pub async fn connect(settings: &DatabaseSettings) -> Result<Self> {
        let dialect = Dialect::from_driver(settings.driver)?;
        let table = settings.table.as_deref().unwrap_or(DEFAULT_TABLE);
        let queries = Queries::new(dialect, table)?;
        let timeout = settings.connect_timeout;

        let pool = match dialect {
            Dialect::Postgres => Pool::Postgres(
                PgPoolOptions::new()
                    .max_connections(MAX_CONNECTIONS)
                    .acquire_timeout(timeout)
                    .connect_with(options::postgres(settings)?)
                    .await
                    .map_err(unavailable)?,
            ),
            Dialect::MySql => Pool::MySql(
                MySqlPoolOptions::new()
                    .max_connections(MAX_CONNECTIONS)
                    .acquire_timeout(timeout)
                    .connect_with(options::mysql(settings)?)
                    .await
                    .map_err(unavailable)?,
            ),
            Dialect::Sqlite => {
                Pool::Sqlite(sqlite_pool(options::sqlite(settings)?, settings.in_memory, timeout).await?)
            }
            Dialect::MsSql => {
                let config = options::mssql(settings)?;
                let conn = tokio::time::timeout(timeout, MsSqlConnection::connect(config))
                    .await
                    .map_err(|_| EmberdropError::Timeout)??;
                Pool::MsSql(conn)
            }
        };

        let store = Self {
            pool,
            queries,
            dialect,
        };
        store.create_table().await?;
        tracing::debug!(dialect = ?dialect, table, "secrets table ready");
        Ok(store)
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn create_table(&self) -> Result<()> {
        let sql = self.queries.create_table.as_str();
        match &self.pool {
            Pool::Postgres(pool) => {
                sqlx::query(sql).execute(pool).await.map_err(unavailable)?;
            }
            Pool::MySql(pool) => {
                sqlx::query(sql).execute(pool).await.map_err(unavailable)?;
            }
            Pool::Sqlite(pool) => {
                sqlx::query(sql).execute(pool).await.map_err(unavailable)?;
            }
            Pool::MsSql(conn) => conn.execute_batch(sql).await?,
        }
        Ok(())
    }
}

/// An in-memory SQLite database lives as long as its connection, so the
/// pool is pinned to one connection that never idles out.
async fn sqlite_pool(
    options: sqlx::sqlite::SqliteConnectOptions,
    in_memory: bool,
    timeout: Duration,
) -> Result<SqlitePool> {
    let mut pool = SqlitePoolOptions::new().acquire_timeout(timeout);
    pool = if in_memory {
        pool.max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        pool.max_connections(MAX_CONNECTIONS)
    };
    pool.connect_with(options).await.map_err(unavailable)
}

type PgRow = (Uuid, String, DateTime<Utc>);
type TextRow = (String, String, NaiveDateTime);

fn from_pg_row((id, value, expires_at): PgRow) -> StoredSecret {
    StoredSecret {
        id: id.to_string(),
        value,
        expires_at,
    }
}

fn from_text_row((id, value, expires_at): TextRow) -> StoredSecret {
    StoredSecret {
        id,
        value,
        expires_at: expires_at.and_utc(),
    }
}

/// Postgres stores ids as `UUID`; anything that does not parse cannot
/// be in the table.
fn pg_id(id: &str) -> Result<Uuid> {
    Uuid::parse_str(id).map_err(|_| EmberdropError::SecretNotFound)
}

fn row_missing(err: sqlx::Error) -> EmberdropError {
    match err {
        sqlx::Error::RowNotFound => EmberdropError::SecretNotFound,
        other => unavailable(other),
    }
}

/// Run `$insert` then `$select` in one transaction on `$pool`, committing
/// on success and rolling back on any failure.
macro_rules! insert_and_select {
    ($pool:expr, $queries:expr, $row:ty, $id:expr, $value:expr, $expires_at:expr) => {{
        let mut tx = $pool.begin().await.map_err(unavailable)?;
        let result: std::result::Result<$row, sqlx::Error> = async {
            sqlx::query(&$queries.insert)
                .bind($id)
                .bind($value)
                .bind($expires_at)
                .execute(&mut *tx)
                .await?;
            sqlx::query_as::<_, $row>(&$queries.select_by_id)
                .bind($id)
                .fetch_one(&mut *tx)
                .await
        }
        .await;

        match result {
            Ok(row) => {
                tx.commit().await.map_err(unavailable)?;
                row
            }
            Err(err) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::warn!(error = %rollback, "rollback after failed insert also failed");
                }
                return Err(unavailable(err));
            }
        }
    }};
}

#[async_trait]
impl SecretStore for SqlStore {
    async fn get(&self, id: &str) -> Result<StoredSecret> {
        let q = &self.queries;
        match &self.pool {
            Pool::Postgres(pool) => sqlx::query_as::<_, PgRow>(&q.select_by_id)
                .bind(pg_id(id)?)
                .fetch_one(pool)
                .await
                .map(from_pg_row)
                .map_err(row_missing),
            Pool::MySql(pool) => sqlx::query_as::<_, TextRow>(&q.select_by_id)
                .bind(id)
                .fetch_one(pool)
                .await
                .map(from_text_row)
                .map_err(row_missing),
            Pool::Sqlite(pool) => sqlx::query_as::<_, TextRow>(&q.select_by_id)
                .bind(id)
                .fetch_one(pool)
                .await
                .map(from_text_row)
                .map_err(row_missing),
            Pool::MsSql(conn) => conn.get(q, id).await,
        }
    }

    async fn create(&self, secret: NewSecret) -> Result<StoredSecret> {
        let q = &self.queries;
        let id = Uuid::new_v4();
        let value = secret.value.as_str();

        let record = match &self.pool {
            Pool::Postgres(pool) => from_pg_row(insert_and_select!(
                pool,
                q,
                PgRow,
                id,
                value,
                secret.expires_at
            )),
            Pool::MySql(pool) => from_text_row(insert_and_select!(
                pool,
                q,
                TextRow,
                id.to_string(),
                value,
                secret.expires_at.naive_utc()
            )),
            Pool::Sqlite(pool) => from_text_row(insert_and_select!(
                pool,
                q,
                TextRow,
                id.to_string(),
                value,
                secret.expires_at.naive_utc()
            )),
            Pool::MsSql(conn) => conn.create(q, secret).await?,
        };
        Ok(record)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let q = &self.queries;
        let affected = match &self.pool {
            Pool::Postgres(pool) => sqlx::query(&q.delete)
                .bind(pg_id(id)?)
                .execute(pool)
                .await
                .map_err(unavailable)?
                .rows_affected(),
            Pool::MySql(pool) => sqlx::query(&q.delete)
                .bind(id)
                .execute(pool)
                .await
                .map_err(unavailable)?
                .rows_affected(),
            Pool::Sqlite(pool) => sqlx::query(&q.delete)
                .bind(id)
                .execute(pool)
                .await
                .map_err(unavailable)?
                .rows_affected(),
            Pool::MsSql(conn) => conn.delete(q, id).await?,
        };

        deleted_one(affected)
    }

    async fn delete_expired(&self) -> Result<u64> {
        let sql = self.queries.delete_expired.as_str();
        let affected = match &self.pool {
            Pool::Postgres(pool) => sqlx::query(sql)
                .execute(pool)
                .await
                .map_err(unavailable)?
                .rows_affected(),
            Pool::MySql(pool) => sqlx::query(sql)
                .execute(pool)
                .await
                .map_err(unavailable)?
                .rows_affected(),
            Pool::Sqlite(pool) => sqlx::query(sql)
                .execute(pool)
                .await
                .map_err(unavailable)?
                .rows_affected(),
            Pool::MsSql(conn) => conn.delete_expired(&self.queries).await?,
        };

        swept(affected)
    }

    async fn close(&self) -> Result<()> {
        match &self.pool {
            Pool::Postgres(pool) => pool.close().await,
            Pool::MySql(pool) => pool.close().await,
            Pool::Sqlite(pool) => pool.close().await,
            Pool::MsSql(conn) => conn.close().await?,
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        match self.dialect {
            Dialect::Postgres => "postgres",
            Dialect::MsSql => "mssql",
            Dialect::MySql => "mysql",
            Dialect::Sqlite => "sqlite",
        }
    }
}
