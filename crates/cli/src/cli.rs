use std::path::PathBuf;

use clap::Parser;
use drudge_pool::MinWorkers;

/// Run a batch of demo tasks on a drudge worker pool.
///
/// Submits `--tasks` calls of `--method` at once, prints pool stats while the
/// batch is in flight and after it settles, then shuts the pool down.
#[derive(Parser, Debug)]
#[command(name = "drudge", about = "Run a batch of demo tasks on a worker pool")]
pub struct CliArgs {
    /// Path to a TOML pool config (default: ~/.config/drudge/config.toml if present)
    #[arg(long, env = "DRUDGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override min_workers: a count or "max"
    #[arg(long)]
    pub min_workers: Option<MinWorkers>,

    /// Override max_workers
    #[arg(long)]
    pub max_workers: Option<usize>,

    /// Demo method every task runs: sleep, fib or fail
    #[arg(long, default_value = "sleep")]
    pub method: String,

    /// Number of tasks to submit
    #[arg(long, default_value = "8")]
    pub tasks: usize,

    /// Argument for each task (milliseconds for sleep, n for fib)
    #[arg(long, default_value = "100")]
    pub arg: u64,

    /// Per-task deadline in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Kill running tasks on shutdown instead of letting them finish
    #[arg(long)]
    pub force: bool,

    /// Deadline for a graceful shutdown, in milliseconds
    #[arg(long)]
    pub shutdown_timeout_ms: Option<u64>,
}
