use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use chbackup_core::Config;

pub fn load(path: &Path) -> Result<Config> {
    let config = Config::load(path).context("cannot load config")?;
    debug!(path = %path.display(), "Loaded config");
    Ok(config)
}

/// Like [`load`], but an unreadable file yields the built-in defaults.
pub fn load_or_default(path: &Path) -> Config {
    match Config::load(path) {
        Ok(config) => config,
        Err(e) => {
            debug!(error = %e, "Using built-in defaults");
            Config::default()
        }
    }
}
