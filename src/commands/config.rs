use std::path::Path;

use actisync_core::SyncConfig;
use anyhow::Result;
use owo_colors::OwoColorize;

pub fn init(config_path: &Path, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        anyhow::bail!(
            "Config already exists at {}\n\nUse --force to overwrite it.",
            config_path.display()
        );
    }

    SyncConfig::create_default_config(config_path)?;

    println!("{} {}", "Created".green(), config_path.display());
    println!("\nSet calendar_id and your access tokens, then run:");
    println!("  actisync sync --dry-run");

    Ok(())
}

pub fn path(config_path: &Path) -> Result<()> {
    println!("{}", "Paths".bold());
    println!("  Config:  {}", config_path.display());

    if !config_path.exists() {
        println!("  {}", "(not created yet, run `actisync config init`)".dimmed());
    }

    Ok(())
}
