//! Config command handlers.

use std::path::Path;

use agentdock_session::SessionConfig;
use anyhow::{Context, Result};

pub fn path(config_path: &Path) {
    println!("{}", config_path.display());
}

pub fn init(config_path: &Path) -> Result<()> {
    SessionConfig::init(config_path)
        .with_context(|| format!("init config at {}", config_path.display()))?;
    println!("Created config at {}", config_path.display());
    Ok(())
}

pub fn show(config: &SessionConfig) -> Result<()> {
    print!("{}", config.to_toml()?);
    Ok(())
}
