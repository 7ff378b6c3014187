use std::time::Duration;

use thiserror::Error;

/// Errors a task future can settle with.
///
/// `Cancelled`, `Timeout` and `Execution` are the three rejection kinds a
/// caller observes for a submitted task. The remaining variants are
/// submission-time or construction-time failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("task cancelled")]
    Cancelled,

    #[error("timed out after {} ms", .0.as_millis())]
    Timeout(Duration),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error("invalid method: {0}")]
    InvalidMethod(String),

    #[error("pool terminated")]
    Terminated,

    #[error("failed to start worker: {0}")]
    Spawn(String),

    #[error("no tokio runtime available to drive the pool")]
    NoRuntime,

    #[error("config error: {0}")]
    Config(String),
}

impl PoolError {
    /// True for the two abort kinds that force the owning worker to stop.
    pub fn is_abort(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Timeout(_))
    }
}

/// Failure reported by an execution context for one dispatched call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    /// The method ran and returned an error.
    #[error("{0}")]
    Failed(String),

    /// The execution context died while (or before) running the call.
    #[error("worker crashed: {0}")]
    Crashed(String),
}

/// Errors raised while loading or validating a [`crate::PoolConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl From<ConfigError> for PoolError {
    fn from(err: ConfigError) -> Self {
        PoolError::Config(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Method with name '{0}' is already registered")]
    DuplicateName(String),

    #[error("Method name '{0}' is reserved")]
    Reserved(String),

    #[error("Method name must not be empty")]
    EmptyName,
}
