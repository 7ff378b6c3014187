use std::path::Path;

use crate::error::ConfigError;

use super::types::PoolConfig;

impl PoolConfig {
    /// Parse config from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    // ── Environment variable overrides ──────────────────────────────

    /// Apply environment variable overrides.
    ///
    /// - `DRUDGE_MIN_WORKERS` -> `min_workers` (integer or `max`)
    /// - `DRUDGE_MAX_WORKERS` -> `max_workers`
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    pub(crate) fn apply_overrides_from(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(v) = lookup("DRUDGE_MIN_WORKERS").filter(|v| !v.is_empty()) {
            self.min_workers = v
                .parse()
                .map_err(|e| ConfigError::Invalid(format!("DRUDGE_MIN_WORKERS: {e}")))?;
        }
        if let Some(v) = lookup("DRUDGE_MAX_WORKERS").filter(|v| !v.is_empty()) {
            let max = v.trim().parse::<usize>().map_err(|_| {
                ConfigError::Invalid(format!("DRUDGE_MAX_WORKERS: expected an integer, got '{v}'"))
            })?;
            self.max_workers = Some(max);
        }
        Ok(())
    }
}
