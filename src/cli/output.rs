//! Colored terminal output helpers.
//!
//! All user-facing output goes through these functions so we get
//! consistent styling across every command.

use comfy_table::{ContentArrangement, Table};
use console::style;

use crate::config::{duration, Settings};

/// Print a green success message: "check_mark {msg}"
pub fn success(msg: &str) {
    println!("{} {}", style("\u{2713}").green().bold(), msg);
}

/// Print a red error message: "x_mark {msg}"
pub fn error(msg: &str) {
    eprintln!("{} {}", style("\u{2717}").red().bold(), msg);
}

/// Print a yellow warning: "warning_sign {msg}"
pub fn warning(msg: &str) {
    eprintln!("{} {}", style("\u{26a0}").yellow().bold(), msg);
}

/// Print a blue info message: "info_sign {msg}"
pub fn info(msg: &str) {
    println!("{} {}", style("\u{2139}").blue().bold(), msg);
}

/// Print a dim tip/hint: "arrow {msg}"
pub fn tip(msg: &str) {
    println!("{} {}", style("\u{2192}").dim(), style(msg).dim());
}

/// Print the effective settings as a two-column table.
///
/// Credentials are masked; only whether they are set is shown.
pub fn print_settings_table(settings: &Settings) {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Setting", "Value"]);

    for (name, value) in settings_rows(settings) {
        table.add_row(vec![name.to_string(), value]);
    }

    println!("{table}");
}

pub(crate) fn settings_rows(s: &Settings) -> Vec<(&'static str, String)> {
    let db = &s.database;
    vec![
        ("server.host", s.server.host.clone()),
        ("server.port", s.server.port.to_string()),
        ("secrets.encryption_key", masked(!s.secrets.encryption_key.is_empty())),
        ("secrets.default_ttl", duration::format(s.secrets.default_ttl)),
        ("secrets.timeout", duration::format(s.secrets.timeout)),
        ("secrets.cleanup_interval", duration::format(s.secrets.cleanup_interval)),
        ("database.driver", db.driver.to_string()),
        ("database.uri", masked(db.uri.is_some())),
        ("database.address", or_dash(db.address.as_deref())),
        ("database.database", db.database.clone()),
        ("database.username", or_dash(db.username.as_deref())),
        ("database.password", masked(db.password.is_some())),
        ("database.table", or_dash(db.table.as_deref())),
        ("database.tls_mode", or_dash(db.tls_mode.as_deref())),
        ("database.file", db.file.clone()),
        ("database.in_memory", db.in_memory.to_string()),
        ("database.connect_timeout", duration::format(db.connect_timeout)),
        ("rate_limiter.enabled", s.rate_limiter.enabled.to_string()),
        ("rate_limiter.rate", s.rate_limiter.rate.to_string()),
        ("rate_limiter.burst", s.rate_limiter.burst.to_string()),
        ("rate_limiter.ttl", duration::format(s.rate_limiter.ttl)),
        ("rate_limiter.cleanup_interval", duration::format(s.rate_limiter.cleanup_interval)),
    ]
}

fn masked(is_set: bool) -> String {
    if is_set { "********" } else { "(not set)" }.to_string()
}

fn or_dash(value: Option<&str>) -> String {
    value.unwrap_or("-").to_string()
}
