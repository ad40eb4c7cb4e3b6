use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::duration;
use crate::errors::{EmberdropError, Result};

/// Service configuration, loaded from `emberdrop.toml`.
///
/// Every field has a default so the service starts without a config
/// file; only the encryption key must come from somewhere.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub secrets: SecretSettings,
    pub database: DatabaseSettings,
    pub rate_limiter: RateLimiterSettings,
}

/// Listen address for the HTTP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

/// Secret lifecycle settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretSettings {
    /// Key used when a secret is created without a passphrase.
    pub encryption_key: String,

    /// Lifetime applied when a create request carries no TTL.
    #[serde(with = "duration::serde_str")]
    pub default_ttl: Duration,

    /// Upper bound on every storage call.
    #[serde(with = "duration::serde_str")]
    pub timeout: Duration,

    /// How often the expiry sweeper runs.
    #[serde(with = "duration::serde_str")]
    pub cleanup_interval: Duration,
}

impl Default for SecretSettings {
    fn default() -> Self {
        Self {
            encryption_key: String::new(),
            default_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            timeout: Duration::from_secs(10),
            cleanup_interval: Duration::from_secs(5),
        }
    }
}

impl fmt::Debug for SecretSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretSettings")
            .field("encryption_key", &redact(&self.encryption_key))
            .field("default_ttl", &self.default_ttl)
            .field("timeout", &self.timeout)
            .field("cleanup_interval", &self.cleanup_interval)
            .finish()
    }
}

/// Supported storage backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DatabaseDriver {
    #[default]
    Memory,
    Mongo,
    Redis,
    Postgres,
    MsSql,
    MySql,
    MariaDb,
    Sqlite,
}

impl DatabaseDriver {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Mongo => "mongo",
            Self::Redis => "redis",
            Self::Postgres => "postgres",
            Self::MsSql => "mssql",
            Self::MySql => "mysql",
            Self::MariaDb => "mariadb",
            Self::Sqlite => "sqlite",
        }
    }

    /// `true` for every relational dialect.
    pub fn is_sql(&self) -> bool {
        matches!(
            self,
            Self::Postgres | Self::MsSql | Self::MySql | Self::MariaDb | Self::Sqlite
        )
    }
}

impl fmt::Display for DatabaseDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatabaseDriver {
    type Err = EmberdropError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "inmem" => Ok(Self::Memory),
            "mongo" | "mongodb" => Ok(Self::Mongo),
            "redis" => Ok(Self::Redis),
            "postgres" | "postgresql" | "pgx" => Ok(Self::Postgres),
            "mssql" | "sqlserver" => Ok(Self::MsSql),
            "mysql" => Ok(Self::MySql),
            "mariadb" => Ok(Self::MariaDb),
            "sqlite" | "sqlite3" => Ok(Self::Sqlite),
            other => Err(EmberdropError::UnsupportedDriver(other.to_string())),
        }
    }
}

impl TryFrom<String> for DatabaseDriver {
    type Error = EmberdropError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<DatabaseDriver> for String {
    fn from(driver: DatabaseDriver) -> Self {
        driver.as_str().to_string()
    }
}

/// Storage backend connection settings.
///
/// Either `uri` is set, or the discrete fields are combined into a
/// driver-specific connection string.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub driver: DatabaseDriver,
    pub uri: Option<String>,
    pub address: Option<String>,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Table (SQL) or collection (Mongo) holding the secrets.
    pub table: Option<String>,
    pub tls_mode: Option<String>,
    /// SQLite database file.
    pub file: String,
    /// Use an in-memory SQLite database instead of `file`.
    pub in_memory: bool,
    #[serde(with = "duration::serde_str")]
    pub connect_timeout: Duration,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::Memory,
            uri: None,
            address: None,
            database: "emberdrop".to_string(),
            username: None,
            password: None,
            table: None,
            tls_mode: None,
            file: "emberdrop.db".to_string(),
            in_memory: false,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseSettings")
            .field("driver", &self.driver)
            .field("uri", &self.uri.as_deref().map(redact))
            .field("address", &self.address)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &self.password.as_deref().map(redact))
            .field("table", &self.table)
            .field("tls_mode", &self.tls_mode)
            .field("file", &self.file)
            .field("in_memory", &self.in_memory)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

/// Per-client token bucket settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimiterSettings {
    pub enabled: bool,
    /// Tokens added per second.
    pub rate: f64,
    /// Bucket capacity.
    pub burst: u32,
    /// Idle time after which a client's bucket is dropped.
    #[serde(with = "duration::serde_str")]
    pub ttl: Duration,
    #[serde(with = "duration::serde_str")]
    pub cleanup_interval: Duration,
}

impl Default for RateLimiterSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            rate: 1.0,
            burst: 3,
            ttl: Duration::from_secs(5 * 60),
            cleanup_interval: Duration::from_secs(10),
        }
    }
}

/// Values from the command line or `EMBERDROP_*` environment variables.
///
/// `None` means "not given"; the file or default value stays in place.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub encryption_key: Option<String>,
    pub default_ttl: Option<Duration>,
    pub timeout: Option<Duration>,
    pub cleanup_interval: Option<Duration>,
    pub driver: Option<DatabaseDriver>,
    pub database_uri: Option<String>,
    pub database_address: Option<String>,
    pub database_name: Option<String>,
    pub database_user: Option<String>,
    pub database_password: Option<String>,
    pub database_table: Option<String>,
    pub database_file: Option<String>,
    pub database_in_memory: Option<bool>,
    pub rate_limit_rate: Option<f64>,
    pub rate_limit_burst: Option<u32>,
}

impl Settings {
    /// Default config file name.
    pub const FILE_NAME: &'static str = "emberdrop.toml";

    /// Load settings from a TOML file.
    ///
    /// A missing file yields defaults; a file that exists but does not
    /// parse is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents).map_err(|e| match e {
            EmberdropError::ConfigError(msg) => {
                EmberdropError::ConfigError(format!("failed to parse {}: {msg}", path.display()))
            }
            other => other,
        })
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| EmberdropError::ConfigError(e.to_string()))
    }

    /// Merge flag/env values over the loaded settings.
    pub fn apply(&mut self, o: Overrides) {
        fn set<T>(slot: &mut T, value: Option<T>) {
            if let Some(v) = value {
                *slot = v;
            }
        }
        fn set_opt<T>(slot: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *slot = value;
            }
        }

        set(&mut self.server.host, o.host);
        set(&mut self.server.port, o.port);
        set(&mut self.secrets.encryption_key, o.encryption_key);
        set(&mut self.secrets.default_ttl, o.default_ttl);
        set(&mut self.secrets.timeout, o.timeout);
        set(&mut self.secrets.cleanup_interval, o.cleanup_interval);
        set(&mut self.database.driver, o.driver);
        set_opt(&mut self.database.uri, o.database_uri);
        set_opt(&mut self.database.address, o.database_address);
        set(&mut self.database.database, o.database_name);
        set_opt(&mut self.database.username, o.database_user);
        set_opt(&mut self.database.password, o.database_password);
        set_opt(&mut self.database.table, o.database_table);
        set(&mut self.database.file, o.database_file);
        set(&mut self.database.in_memory, o.database_in_memory);
        set(&mut self.rate_limiter.rate, o.rate_limit_rate);
        set(&mut self.rate_limiter.burst, o.rate_limit_burst);
    }

    /// Check the merged settings before anything connects.
    pub fn validate(&self) -> Result<()> {
        if self.secrets.encryption_key.is_empty() {
            return Err(EmberdropError::ConfigError(
                "an encryption key is required (secrets.encryption_key or EMBERDROP_ENCRYPTION_KEY)"
                    .into(),
            ));
        }
        if self.secrets.default_ttl.is_zero() {
            return Err(EmberdropError::ConfigError(
                "secrets.default_ttl must be positive".into(),
            ));
        }
        if self.secrets.cleanup_interval.is_zero() {
            return Err(EmberdropError::ConfigError(
                "secrets.cleanup_interval must be positive".into(),
            ));
        }
        if self.secrets.timeout.is_zero() {
            return Err(EmberdropError::ConfigError(
                "secrets.timeout must be positive".into(),
            ));
        }
        if self.database.connect_timeout.is_zero() {
            return Err(EmberdropError::ConfigError(
                "database.connect_timeout must be positive".into(),
            ));
        }
        if self.rate_limiter.enabled {
            if self.rate_limiter.cleanup_interval.is_zero() {
                return Err(EmberdropError::ConfigError(
                    "rate_limiter.cleanup_interval must be positive".into(),
                ));
            }
            if !(self.rate_limiter.rate > 0.0) {
                return Err(EmberdropError::ConfigError(
                    "rate_limiter.rate must be positive".into(),
                ));
            }
            if self.rate_limiter.burst == 0 {
                return Err(EmberdropError::ConfigError(
                    "rate_limiter.burst must be at least 1".into(),
                ));
            }
        }

        let db = &self.database;
        let has_target = db.uri.is_some() || db.address.is_some();
        match db.driver {
            DatabaseDriver::Memory => {}
            DatabaseDriver::Sqlite => {
                if db.uri.is_none() && !db.in_memory && db.file.is_empty() {
                    return Err(EmberdropError::ConfigError(
                        "sqlite needs database.file, database.in_memory, or database.uri".into(),
                    ));
                }
            }
            driver if !has_target => {
                return Err(EmberdropError::ConfigError(format!(
                    "{driver} needs database.uri or database.address"
                )));
            }
            _ => {}
        }

        Ok(())
    }
}

fn redact(value: &str) -> &'static str {
    if value.is_empty() {
        ""
    } else {
        "********"
    }
}
