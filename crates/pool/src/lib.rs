//! A process-local worker pool.
//!
//! [`Pool::exec`] hands a task to a bounded set of workers and returns a
//! [`TaskFuture`] that can be chained, cancelled, given a deadline or simply
//! awaited.
//!
//! ```ignore
//! let mut registry = MethodRegistry::new();
//! registry.register("square", |args| {
//!     let n = args.first().and_then(Value::as_i64).ok_or("expected a number")?;
//!     Ok(json!(n * n))
//! })?;
//!
//! let pool = Pool::with_registry(registry, PoolConfig::bounded(1, 4))?;
//! let nine = pool.exec("square", vec![json!(3)]).timeout(Duration::from_secs(1)).clone().await?;
//! pool.terminate(false, None).await?;
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod future;
pub mod proxy;
pub mod queue;
pub mod registry;
pub mod scheduler;
pub mod stats;
mod sync;
pub mod types;
pub mod worker;

pub use config::{MinWorkers, PoolConfig};
pub use context::{ContextFactory, ExecutionContext, ThreadContext, ThreadContextFactory};
pub use error::{ConfigError, ExecutionError, PoolError, RegistryError};
pub use future::{FutureState, Outcome, Resolver, TaskFuture};
pub use proxy::Proxy;
pub use registry::{MethodFn, MethodRegistry};
pub use scheduler::Pool;
pub use stats::PoolStats;
pub use types::{InlineFn, Method, Request, TaskId, WorkerId};
pub use worker::WorkerState;
