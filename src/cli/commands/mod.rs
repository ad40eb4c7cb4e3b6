pub mod completions;
pub mod config_cmd;
pub mod generate;
pub mod serve;
