//! Models Command
//!
//! List registered models and optionally check provider reachability.
//!
//! Usage:
//!   uiforge models
//!   uiforge models --health

use console::style;
use std::sync::Arc;

use crate::config::ConfigLoader;
use crate::provider::ProviderRouter;
use crate::types::Result;

pub async fn run(health: bool) -> Result<()> {
    let config = ConfigLoader::load()?;
    let router = Arc::new(ProviderRouter::from_config(&config)?);

    println!("{}", style("Registered models:").bold());
    for model in router.models() {
        let provider = config.models.get(model).map(String::as_str).unwrap_or("?");
        println!("  {model}  {}", style(format!("({provider})")).dim());
    }

    if health {
        println!();
        println!("{}", style("Provider health:").bold());
        for (provider, healthy) in router.health_check().await {
            let mark = if healthy {
                style("✓").green()
            } else {
                style("✗").red()
            };
            println!("  {mark} {provider}");
        }
    }
    Ok(())
}
