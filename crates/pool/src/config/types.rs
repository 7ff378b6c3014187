use serde::{Deserialize, Serialize};

/// `max_workers` used when the platform's parallelism cannot be determined.
pub const FALLBACK_MAX_WORKERS: usize = 3;

/// Sizing of a worker pool.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Workers started eagerly and kept alive.
    #[serde(default)]
    pub min_workers: MinWorkers,

    /// Upper bound on live workers. `None` derives it from the CPU count.
    #[serde(default)]
    pub max_workers: Option<usize>,
}

/// Lower bound on live workers: a count, or `"max"` for `max_workers`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawMinWorkers", into = "RawMinWorkers")]
pub enum MinWorkers {
    Count(usize),
    Max,
}

impl Default for MinWorkers {
    fn default() -> Self {
        MinWorkers::Count(0)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawMinWorkers {
    Count(usize),
    Keyword(String),
}

impl TryFrom<RawMinWorkers> for MinWorkers {
    type Error = String;

    fn try_from(raw: RawMinWorkers) -> Result<Self, Self::Error> {
        match raw {
            RawMinWorkers::Count(n) => Ok(MinWorkers::Count(n)),
            RawMinWorkers::Keyword(word) => word.parse(),
        }
    }
}

impl From<MinWorkers> for RawMinWorkers {
    fn from(min: MinWorkers) -> Self {
        match min {
            MinWorkers::Count(n) => RawMinWorkers::Count(n),
            MinWorkers::Max => RawMinWorkers::Keyword("max".into()),
        }
    }
}

impl std::str::FromStr for MinWorkers {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("max") {
            return Ok(MinWorkers::Max);
        }
        s.parse::<usize>()
            .map(MinWorkers::Count)
            .map_err(|_| format!("min_workers must be a non-negative integer or \"max\", got '{s}'"))
    }
}

impl PoolConfig {
    /// Fixed bounds, mostly for tests and embedding.
    pub fn bounded(min_workers: usize, max_workers: usize) -> Self {
        Self {
            min_workers: MinWorkers::Count(min_workers),
            max_workers: Some(max_workers),
        }
    }

    /// Effective upper bound: the configured value, else CPU count minus
    /// one (at least 1), else [`FALLBACK_MAX_WORKERS`].
    pub fn resolved_max_workers(&self) -> usize {
        match self.max_workers {
            Some(n) => n,
            None => std::thread::available_parallelism()
                .map(|n| n.get().saturating_sub(1).max(1))
                .unwrap_or(FALLBACK_MAX_WORKERS),
        }
    }

    /// Effective lower bound, never above the upper bound.
    pub fn resolved_min_workers(&self) -> usize {
        let max = self.resolved_max_workers();
        match self.min_workers {
            MinWorkers::Max => max,
            MinWorkers::Count(n) => n.min(max),
        }
    }
}
