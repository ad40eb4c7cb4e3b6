pub mod duration;
pub mod settings;

pub use settings::{
    DatabaseDriver, DatabaseSettings, Overrides, RateLimiterSettings, SecretSettings,
    ServerSettings, Settings,
};
