use std::path::PathBuf;

use anyhow::{Context, Result};
use drudge_pool::PoolConfig;
use tracing::debug;

use crate::cli::CliArgs;

/// Resolve the pool config: file (explicit or default location), then
/// `DRUDGE_*` environment variables, then command-line overrides.
pub fn load(args: &CliArgs) -> Result<PoolConfig> {
    let mut config = match args.config.clone().or_else(default_config_path) {
        Some(path) => {
            debug!(path = %path.display(), "loading pool config");
            PoolConfig::from_file(&path)
                .with_context(|| format!("failed to load pool config from {}", path.display()))?
        }
        None => {
            let mut config = PoolConfig::default();
            config
                .apply_env_overrides()
                .context("invalid DRUDGE_* environment variable")?;
            config
        }
    };

    if let Some(min) = args.min_workers {
        config.min_workers = min;
    }
    if let Some(max) = args.max_workers {
        config.max_workers = Some(max);
    }
    config.validate().context("invalid pool configuration")?;
    Ok(config)
}

/// `~/.config/drudge/config.toml`, if it exists.
fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join("drudge").join("config.toml"))
        .filter(|path| path.exists())
}
