//! Per-dialect SQL text, built once when the store is constructed.

use super::Dialect;
use crate::errors::{EmberdropError, Result};

pub const DEFAULT_TABLE: &str = "secrets";

/// The statements the SQL store runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Queries {
    pub create_table: String,
    pub select_by_id: String,
    pub insert: String,
    pub delete: String,
    pub delete_expired: String,
}

impl Queries {
    /// Build the statement set for `dialect` against `table`.
    ///
    /// The table name is interpolated into the SQL, so it is restricted
    /// to ASCII letters, digits, and underscores.
    pub fn new(dialect: Dialect, table: &str) -> Result<Self> {
        validate_table_name(table)?;

        let (table, columns, placeholders, now) = match dialect {
            Dialect::Postgres => (
                table.to_string(),
                ["id", "value", "expires_at"],
                ["$1", "$2", "$3"],
                "NOW()",
            ),
            Dialect::MsSql => (
                first_to_upper(table),
                ["ID", "Value", "ExpiresAt"],
                ["@P1", "@P2", "@P3"],
                "GETUTCDATE()",
            ),
            Dialect::MySql => (
                table.to_string(),
                ["id", "value", "expires_at"],
                ["?", "?", "?"],
                "UTC_TIMESTAMP(6)",
            ),
            Dialect::Sqlite => (
                table.to_string(),
                ["id", "value", "expires_at"],
                ["?1", "?2", "?3"],
                "DATETIME('now')",
            ),
        };
        let [id, value, expires_at] = columns;
        let [p1, p2, p3] = placeholders;

        Ok(Self {
            create_table: create_table(dialect, &table),
            select_by_id: format!(
                "SELECT {id}, {value}, {expires_at} FROM {table} WHERE {id} = {p1}"
            ),
            insert: format!(
                "INSERT INTO {table} ({id}, {value}, {expires_at}) VALUES ({p1}, {p2}, {p3})"
            ),
            delete: format!("DELETE FROM {table} WHERE {id} = {p1}"),
            delete_expired: format!("DELETE FROM {table} WHERE {expires_at} < {now}"),
        })
    }
}

fn create_table(dialect: Dialect, table: &str) -> String {
    match dialect {
        Dialect::Postgres => format!(
            "CREATE TABLE IF NOT EXISTS {table} (\
             id UUID PRIMARY KEY, \
             value TEXT NOT NULL, \
             expires_at TIMESTAMPTZ NOT NULL)"
        ),
        Dialect::MsSql => format!(
            "IF NOT EXISTS (SELECT * FROM sysobjects WHERE name='{table}' and xtype='U') \
             CREATE TABLE {table} (\
             ID VARCHAR(36) NOT NULL PRIMARY KEY, \
             Value NVARCHAR(MAX) NOT NULL, \
             ExpiresAt DATETIMEOFFSET NOT NULL)"
        ),
        Dialect::MySql => format!(
            "CREATE TABLE IF NOT EXISTS {table} (\
             id VARCHAR(36) NOT NULL PRIMARY KEY, \
             value LONGTEXT NOT NULL, \
             expires_at DATETIME(6) NOT NULL)"
        ),
        Dialect::Sqlite => format!(
            "CREATE TABLE IF NOT EXISTS {table} (\
             id TEXT NOT NULL PRIMARY KEY, \
             value TEXT NOT NULL, \
             expires_at DATETIME NOT NULL)"
        ),
    }
}

fn validate_table_name(table: &str) -> Result<()> {
    let valid = !table.is_empty()
        && table.len() <= 64
        && table.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
        && !table.as_bytes()[0].is_ascii_digit();

    if !valid {
        return Err(EmberdropError::ConfigError(format!(
            "invalid table name '{table}': use letters, digits, and underscores"
        )));
    }
    Ok(())
}

fn first_to_upper(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
