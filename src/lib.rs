pub mod cli;
pub mod config;
pub mod crypto;
pub mod errors;
pub mod ratelimit;
pub mod secret;
pub mod server;
pub mod store;
pub mod telemetry;
