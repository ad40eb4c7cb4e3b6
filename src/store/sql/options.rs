//! Connection options for each SQL dialect.
//!
//! A `uri` in the settings is used as-is.  Otherwise the discrete fields
//! (address, database, credentials, TLS mode) are fed into the driver's
//! own option builder so credentials never need URL escaping.

use std::str::FromStr;

use sqlx::mysql::{MySqlConnectOptions, MySqlSslMode};
use sqlx::postgres::{PgConnectOptions, PgSslMode};
use sqlx::sqlite::SqliteConnectOptions;

use crate::config::DatabaseSettings;
use crate::errors::{EmberdropError, Result};

const POSTGRES_PORT: u16 = 5432;
const MYSQL_PORT: u16 = 3306;
const MSSQL_PORT: u16 = 1433;

pub fn postgres(settings: &DatabaseSettings) -> Result<PgConnectOptions> {
    if let Some(uri) = &settings.uri {
        return PgConnectOptions::from_str(uri).map_err(config_error);
    }

    let (host, port) = split_host_port(require_address(settings)?, POSTGRES_PORT)?;
    let mut options = PgConnectOptions::new()
        .host(&host)
        .port(port)
        .database(&settings.database);
    if let Some(user) = &settings.username {
        options = options.username(user);
    }
    if let Some(password) = &settings.password {
        options = options.password(password);
    }
    if let Some(mode) = &settings.tls_mode {
        options = options.ssl_mode(PgSslMode::from_str(mode).map_err(config_error)?);
    }
    Ok(options)
}

pub fn mysql(settings: &DatabaseSettings) -> Result<MySqlConnectOptions> {
    if let Some(uri) = &settings.uri {
        return MySqlConnectOptions::from_str(uri).map_err(config_error);
    }

    let (host, port) = split_host_port(require_address(settings)?, MYSQL_PORT)?;
    let mut options = MySqlConnectOptions::new()
        .host(&host)
        .port(port)
        .database(&settings.database);
    if let Some(user) = &settings.username {
        options = options.username(user);
    }
    if let Some(password) = &settings.password {
        options = options.password(password);
    }
    if let Some(mode) = &settings.tls_mode {
        options = options.ssl_mode(MySqlSslMode::from_str(mode).map_err(config_error)?);
    }
    Ok(options)
}

/// SQLite: an explicit URI, an in-memory database, or a file that is
/// created on first use.
pub fn sqlite(settings: &DatabaseSettings) -> Result<SqliteConnectOptions> {
    if let Some(uri) = &settings.uri {
        return SqliteConnectOptions::from_str(uri).map_err(config_error);
    }
    if settings.in_memory {
        return SqliteConnectOptions::from_str("sqlite::memory:").map_err(config_error);
    }
    Ok(SqliteConnectOptions::new()
        .filename(&settings.file)
        .create_if_missing(true))
}

/// SQL Server: `uri` is an ADO.NET (or `jdbc:`) connection string.
pub fn mssql(settings: &DatabaseSettings) -> Result<tiberius::Config> {
    if let Some(uri) = &settings.uri {
        let parsed = if uri.starts_with("jdbc:") {
            tiberius::Config::from_jdbc_string(uri)
        } else {
            tiberius::Config::from_ado_string(uri)
        };
        return parsed.map_err(config_error);
    }

    let (host, port) = split_host_port(require_address(settings)?, MSSQL_PORT)?;
    let mut config = tiberius::Config::new();
    config.host(host);
    config.port(port);
    config.database(&settings.database);
    if let Some(user) = &settings.username {
        let password = settings.password.clone().unwrap_or_default();
        config.authentication(tiberius::AuthMethod::sql_server(user, password));
    }

    match settings.tls_mode.as_deref() {
        None => {}
        Some("strict") => config.encryption(tiberius::EncryptionLevel::Required),
        Some("true") => {
            config.encryption(tiberius::EncryptionLevel::Required);
            config.trust_cert();
        }
        Some("false") | Some("disable") => config.encryption(tiberius::EncryptionLevel::Off),
        Some(other) => {
            return Err(EmberdropError::ConfigError(format!(
                "unsupported mssql tls mode '{other}' (use true, false, or strict)"
            )))
        }
    }
    Ok(config)
}

fn require_address(settings: &DatabaseSettings) -> Result<&str> {
    settings.address.as_deref().ok_or_else(|| {
        EmberdropError::ConfigError(format!(
            "{} needs database.uri or database.address",
            settings.driver
        ))
    })
}

/// Split `host[:port]`, falling back to `default_port`.
pub(crate) fn split_host_port(address: &str, default_port: u16) -> Result<(String, u16)> {
    match address.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => {
            let port = port.parse().map_err(|_| {
                EmberdropError::ConfigError(format!("invalid port in address '{address}'"))
            })?;
            Ok((host.to_string(), port))
        }
        _ => Ok((address.to_string(), default_port)),
    }
}

fn config_error(err: impl std::fmt::Display) -> EmberdropError {
    EmberdropError::ConfigError(format!("invalid database connection settings: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseDriver;

    fn settings(driver: DatabaseDriver) -> DatabaseSettings {
        DatabaseSettings {
            driver,
            address: Some("db.internal:6000".into()),
            username: Some("app".into()),
            password: Some("p@ss:word".into()),
            ..DatabaseSettings::default()
        }
    }

    #[test]
    fn host_and_port_are_split() {
        assert_eq!(
            split_host_port("db:5433", POSTGRES_PORT).unwrap(),
            ("db".to_string(), 5433)
        );
        assert_eq!(
            split_host_port("db", POSTGRES_PORT).unwrap(),
            ("db".to_string(), POSTGRES_PORT)
        );
        assert!(split_host_port("db:port", POSTGRES_PORT).is_err());
    }

    #[test]
    fn postgres_options_from_discrete_fields() {
        let options = postgres(&settings(DatabaseDriver::Postgres)).unwrap();
        assert_eq!(options.get_host(), "db.internal");
        assert_eq!(options.get_port(), 6000);
        assert_eq!(options.get_database(), Some("emberdrop"));
        assert_eq!(options.get_username(), "app");
    }

    #[test]
    fn postgres_rejects_unknown_ssl_mode() {
        let s = DatabaseSettings {
            tls_mode: Some("sometimes".into()),
            ..settings(DatabaseDriver::Postgres)
        };
        assert!(postgres(&s).is_err());
    }

    #[test]
    fn network_dialects_need_an_address() {
        let s = DatabaseSettings {
            driver: DatabaseDriver::MySql,
            ..DatabaseSettings::default()
        };
        assert!(mysql(&s).is_err());
        assert!(mssql(&s).is_err());
    }

    #[test]
    fn mssql_config_from_discrete_fields() {
        let config = mssql(&settings(DatabaseDriver::MsSql)).unwrap();
        assert_eq!(config.get_addr(), "db.internal:6000");
    }

    #[test]
    fn sqlite_in_memory_and_file() {
        let s = DatabaseSettings {
            driver: DatabaseDriver::Sqlite,
            in_memory: true,
            ..DatabaseSettings::default()
        };
        assert!(sqlite(&s).is_ok());

        let s = DatabaseSettings {
            driver: DatabaseDriver::Sqlite,
            file: "data/secrets.db".into(),
            ..DatabaseSettings::default()
        };
        let options = sqlite(&s).unwrap();
        assert_eq!(options.get_filename(), std::path::Path::new("data/secrets.db"));
    }
}
