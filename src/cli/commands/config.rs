//! Config Command
//!
//! Manage uiforge configuration.
//!
//! Usage:
//!   uiforge config show [-f json]
//!   uiforge config path
//!   uiforge config init [--force]

use crate::config::ConfigLoader;
use crate::types::{ForgeError, Result};

/// Show the merged effective configuration
pub fn show(format: &str) -> Result<()> {
    let config = ConfigLoader::load()?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&config)?),
        _ => {
            let rendered = toml::to_string_pretty(&config)
                .map_err(|e| ForgeError::Config(format!("Cannot render config: {e}")))?;
            println!("{rendered}");
        }
    }
    Ok(())
}

/// Show configuration file paths
pub fn path() -> Result<()> {
    ConfigLoader::show_path();
    Ok(())
}

/// Initialize the global configuration file
pub fn init(force: bool) -> Result<()> {
    let config_path = ConfigLoader::init_global(force)?;
    println!("✓ Initialized configuration");
    println!("  Config: {}", config_path.display());
    Ok(())
}
