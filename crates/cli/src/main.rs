mod cli;
mod config;
mod methods;

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use drudge_pool::Pool;
use futures::future::join_all;
use serde_json::json;
use tracing::{info, warn};

use crate::cli::CliArgs;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();
    let config = config::load(&args).context("failed to load configuration")?;
    let registry = methods::registry().context("failed to register demo methods")?;
    let pool = Pool::with_registry(registry, config).context("failed to start worker pool")?;

    info!(tasks = args.tasks, method = %args.method, arg = args.arg, "submitting batch");
    let started = Instant::now();
    let futures: Vec<_> = (0..args.tasks)
        .map(|_| {
            let future = pool.exec(args.method.as_str(), vec![json!(args.arg)]);
            if let Some(ms) = args.timeout_ms {
                future.timeout(Duration::from_millis(ms));
            }
            future
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&pool.stats())?);

    let mut failed = 0usize;
    for (index, outcome) in join_all(futures).await.into_iter().enumerate() {
        match outcome {
            Ok(value) => info!(task = index, result = %value, "task resolved"),
            Err(e) => {
                failed += 1;
                warn!(task = index, error = %e, "task rejected");
            }
        }
    }
    info!(
        elapsed = ?started.elapsed(),
        failed,
        "batch settled"
    );
    println!("{}", serde_json::to_string_pretty(&pool.stats())?);

    pool.terminate(args.force, args.shutdown_timeout_ms.map(Duration::from_millis))
        .await
        .context("failed to terminate worker pool")?;
    info!("worker pool terminated");
    Ok(())
}
