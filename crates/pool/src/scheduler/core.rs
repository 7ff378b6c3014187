use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex};

use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::config::PoolConfig;
use crate::context::{ContextFactory, ThreadContextFactory};
use crate::error::PoolError;
use crate::queue::TaskQueue;
use crate::registry::MethodRegistry;
use crate::stats::PoolStats;
use crate::sync::lock;
use crate::types::WorkerId;
use crate::worker::WorkerHandle;

/// A worker pool. Cheap to clone; clones share the same workers and queue.
#[derive(Clone)]
pub struct Pool {
    pub(super) shared: Arc<PoolShared>,
}

pub(super) struct PoolShared {
    pub(super) state: Mutex<PoolState>,
    pub(super) factory: Arc<dyn ContextFactory>,
    pub(super) runtime: Handle,
    pub(super) min_workers: usize,
    pub(super) max_workers: usize,
    pub(super) next_task: AtomicU64,
}

pub(super) struct PoolState {
    pub(super) workers: Vec<WorkerHandle>,
    pub(super) queue: TaskQueue,
    /// Set by `terminate`; no submissions or refills afterwards.
    pub(super) terminated: bool,
    pub(super) next_worker: u64,
}

impl PoolState {
    pub(super) fn position(&self, worker: WorkerId) -> Option<usize> {
        self.workers.iter().position(|w| w.id() == worker)
    }
}

impl Pool {
    /// A pool of default workers: they run inline functions and the
    /// built-in `methods`, nothing else.
    pub fn new(config: PoolConfig) -> Result<Self, PoolError> {
        Self::with_factory(Arc::new(ThreadContextFactory::default()), config)
    }

    /// A pool of dedicated workers exposing the methods in `registry`.
    pub fn with_registry(registry: MethodRegistry, config: PoolConfig) -> Result<Self, PoolError> {
        Self::with_factory(Arc::new(ThreadContextFactory::new(registry)), config)
    }

    /// A pool whose workers run on contexts started by `factory`.
    ///
    /// Must be called from within a tokio runtime. Spawns `min_workers`
    /// workers before returning.
    pub fn with_factory(
        factory: Arc<dyn ContextFactory>,
        config: PoolConfig,
    ) -> Result<Self, PoolError> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| PoolError::NoRuntime)?;
        let shared = Arc::new(PoolShared {
            state: Mutex::new(PoolState {
                workers: Vec::new(),
                queue: TaskQueue::new(),
                terminated: false,
                next_worker: 0,
            }),
            factory,
            runtime,
            min_workers: config.resolved_min_workers(),
            max_workers: config.resolved_max_workers(),
            next_task: AtomicU64::new(0),
        });

        {
            let mut state = lock(&shared.state);
            shared.ensure_min_workers(&mut state)?;
        }
        info!(
            min_workers = shared.min_workers,
            max_workers = shared.max_workers,
            "worker pool started"
        );
        Ok(Self { shared })
    }

    pub fn min_workers(&self) -> usize {
        self.shared.min_workers
    }

    pub fn max_workers(&self) -> usize {
        self.shared.max_workers
    }

    /// Snapshot of worker and task counts. No side effects.
    pub fn stats(&self) -> PoolStats {
        let state = lock(&self.shared.state);
        PoolStats::collect(&state.workers, &state.queue)
    }

    /// Whether `terminate` has been called.
    pub fn is_terminated(&self) -> bool {
        lock(&self.shared.state).terminated
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("min_workers", &self.shared.min_workers)
            .field("max_workers", &self.shared.max_workers)
            .field("stats", &self.stats())
            .finish()
    }
}

impl PoolShared {
    /// Start one more idle worker. Returns its index in `state.workers`.
    pub(super) fn spawn_worker(&self, state: &mut PoolState) -> Result<usize, PoolError> {
        let id = WorkerId(state.next_worker);
        state.next_worker += 1;
        let context = self.factory.spawn(id)?;
        state.workers.push(WorkerHandle::new(id, context));
        debug!(worker = %id, total = state.workers.len(), "worker spawned");
        Ok(state.workers.len() - 1)
    }

    /// Top the pool up to `min_workers` unless it is terminating.
    pub(super) fn ensure_min_workers(&self, state: &mut PoolState) -> Result<(), PoolError> {
        while !state.terminated && state.workers.len() < self.min_workers {
            self.spawn_worker(state)?;
        }
        Ok(())
    }
}
