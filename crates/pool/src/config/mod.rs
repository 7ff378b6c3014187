//! Pool sizing configuration.
//!
//! Parsed from TOML (`min_workers`, `max_workers`) with `DRUDGE_*`
//! environment variable overrides, or built directly in code.

mod loading;
mod types;
mod validation;


pub use types::{MinWorkers, PoolConfig, FALLBACK_MAX_WORKERS};
