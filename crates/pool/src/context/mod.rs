//! Execution contexts: the units that actually run a task's code.
//!
//! The scheduler only relies on the contract below. [`ThreadContext`] is the
//! in-process implementation used by default; anything that can run a
//! [`Request`] and be killed (a child process, a sandbox) can plug in through
//! [`ContextFactory`].

mod thread;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{ExecutionError, PoolError};
use crate::types::{Request, WorkerId};

pub use thread::{ThreadContext, ThreadContextFactory};

/// One isolated execution unit owned by a single worker.
#[async_trait]
pub trait ExecutionContext: Send + Sync {
    /// Run one request and report exactly one result or error.
    ///
    /// Returns [`ExecutionError::Crashed`] if the context dies before
    /// replying. The scheduler never dispatches a second request before the
    /// first one returned.
    async fn dispatch(&self, request: Request) -> Result<Value, ExecutionError>;

    /// Unconditionally stop the context. Any call still running is abandoned
    /// and its result discarded. Idempotent.
    fn kill(&self);

    /// False once the context was killed or has died on its own.
    fn is_alive(&self) -> bool;
}

/// Starts execution contexts for a pool and answers method lookups.
pub trait ContextFactory: Send + Sync {
    /// Start a fresh context for worker `worker`.
    fn spawn(&self, worker: WorkerId) -> Result<Arc<dyn ExecutionContext>, PoolError>;

    /// Whether contexts from this factory can run the named method.
    fn resolves(&self, method: &str) -> bool;
}
