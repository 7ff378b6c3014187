use crate::error::ConfigError;

use super::types::PoolConfig;

impl PoolConfig {
    /// Validate the config. A `min_workers` above `max_workers` is allowed
    /// and capped when resolved.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers == Some(0) {
            return Err(ConfigError::Invalid(
                "max_workers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
