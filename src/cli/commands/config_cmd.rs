//! `emberdrop config` — show the merged configuration.

use std::path::Path;

use crate::cli::{load_settings, output, SettingsArgs};
use crate::errors::Result;

pub fn execute(config_path: &Path, args: SettingsArgs) -> Result<()> {
    if config_path.exists() {
        output::info(&format!("Config file: {}", config_path.display()));
    } else {
        output::info(&format!(
            "No config file at {}, showing defaults with overrides",
            config_path.display()
        ));
    }

    let settings = load_settings(config_path, args)?;
    output::print_settings_table(&settings);

    match settings.validate() {
        Ok(()) => output::success("Configuration is valid."),
        Err(e) => {
            output::warning(&e.to_string());
            if settings.secrets.encryption_key.is_empty() {
                output::tip("Set EMBERDROP_ENCRYPTION_KEY or add secrets.encryption_key to the config file.");
            }
        }
    }
    Ok(())
}
