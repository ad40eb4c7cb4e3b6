//! CLI module: Clap argument parser, output helpers, and command implementations.

pub mod commands;
pub mod output;

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser};

use crate::config::{duration, DatabaseDriver, Overrides, Settings};
use crate::errors::Result;
use crate::telemetry::LogFormat;

/// Emberdrop: share secrets that self-destruct after one read.
#[derive(Parser)]
#[command(
    name = "emberdrop",
    about = "Self-destructing secret exchange",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the TOML config file
    #[arg(
        short,
        long,
        default_value = Settings::FILE_NAME,
        env = "EMBERDROP_CONFIG",
        global = true
    )]
    pub config: PathBuf,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value_t = LogFormat::Text,
        env = "EMBERDROP_LOG_FORMAT",
        global = true
    )]
    pub log_format: LogFormat,
}

/// All available subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run the HTTP service
    Serve(SettingsArgs),

    /// Print a random string
    Generate {
        /// Number of characters (max 512)
        #[arg(short, long, default_value_t = 16)]
        length: usize,
        /// Include special characters (_-!?=()&%)
        #[arg(short, long)]
        special: bool,
    },

    /// Show the effective configuration (credentials masked)
    Config(SettingsArgs),

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Settings that can be given as flags or `EMBERDROP_*` variables.
/// Flags win over the environment, which wins over the config file.
#[derive(Args, Debug, Default, Clone)]
pub struct SettingsArgs {
    /// Address to listen on
    #[arg(long, env = "EMBERDROP_HOST")]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "EMBERDROP_PORT")]
    pub port: Option<u16>,

    /// Key for secrets created without a passphrase
    #[arg(long, env = "EMBERDROP_ENCRYPTION_KEY", hide_env_values = true)]
    pub encryption_key: Option<String>,

    /// Lifetime of secrets created without a TTL (e.g. 7d, 12h)
    #[arg(long, env = "EMBERDROP_DEFAULT_TTL", value_parser = parse_duration)]
    pub default_ttl: Option<Duration>,

    /// Timeout for each storage call (e.g. 10s)
    #[arg(long, env = "EMBERDROP_TIMEOUT", value_parser = parse_duration)]
    pub timeout: Option<Duration>,

    /// How often expired secrets are swept (e.g. 5s)
    #[arg(long, env = "EMBERDROP_CLEANUP_INTERVAL", value_parser = parse_duration)]
    pub cleanup_interval: Option<Duration>,

    /// Storage driver: memory, mongo, redis, postgres, mssql, mysql, mariadb, sqlite
    #[arg(long, env = "EMBERDROP_DATABASE_DRIVER", value_parser = parse_driver)]
    pub driver: Option<DatabaseDriver>,

    /// Full database connection URI
    #[arg(long, env = "EMBERDROP_DATABASE_URI", hide_env_values = true)]
    pub database_uri: Option<String>,

    /// Database host[:port]
    #[arg(long, env = "EMBERDROP_DATABASE_ADDRESS")]
    pub database_address: Option<String>,

    /// Database name
    #[arg(long, env = "EMBERDROP_DATABASE")]
    pub database: Option<String>,

    /// Database user
    #[arg(long, env = "EMBERDROP_DATABASE_USER")]
    pub database_user: Option<String>,

    /// Database password
    #[arg(long, env = "EMBERDROP_DATABASE_PASSWORD", hide_env_values = true)]
    pub database_password: Option<String>,

    /// Table or collection holding the secrets
    #[arg(long, env = "EMBERDROP_DATABASE_TABLE")]
    pub database_table: Option<String>,

    /// SQLite database file
    #[arg(long, env = "EMBERDROP_DATABASE_FILE")]
    pub database_file: Option<String>,

    /// Use an in-memory SQLite database
    #[arg(long, env = "EMBERDROP_DATABASE_IN_MEMORY")]
    pub database_in_memory: Option<bool>,

    /// Rate limiter refill, tokens per second
    #[arg(long, env = "EMBERDROP_RATE_LIMIT_RATE")]
    pub rate_limit_rate: Option<f64>,

    /// Rate limiter burst size
    #[arg(long, env = "EMBERDROP_RATE_LIMIT_BURST")]
    pub rate_limit_burst: Option<u32>,
}

impl SettingsArgs {
    pub fn into_overrides(self) -> Overrides {
        Overrides {
            host: self.host,
            port: self.port,
            encryption_key: self.encryption_key,
            default_ttl: self.default_ttl,
            timeout: self.timeout,
            cleanup_interval: self.cleanup_interval,
            driver: self.driver,
            database_uri: self.database_uri,
            database_address: self.database_address,
            database_name: self.database,
            database_user: self.database_user,
            database_password: self.database_password,
            database_table: self.database_table,
            database_file: self.database_file,
            database_in_memory: self.database_in_memory,
            rate_limit_rate: self.rate_limit_rate,
            rate_limit_burst: self.rate_limit_burst,
        }
    }
}

/// Load the config file and layer flag/env values on top.
pub fn load_settings(config_path: &Path, args: SettingsArgs) -> Result<Settings> {
    let mut settings = Settings::load(config_path)?;
    settings.apply(args.into_overrides());
    Ok(settings)
}

fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    duration::parse(s).map_err(|e| e.to_string())
}

fn parse_driver(s: &str) -> std::result::Result<DatabaseDriver, String> {
    s.parse().map_err(|e: crate::errors::EmberdropError| e.to_string())
}
