use std::sync::{Arc, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::PoolError;
use crate::future::{Resolver, TaskFuture};
use crate::sync::lock;
use crate::types::{TaskId, WorkerId};
use crate::worker::{ActiveTask, Termination, WorkerState};

use super::core::{Pool, PoolShared, PoolState};

/// What is left to settle once a worker has been removed from the pool.
pub(super) struct Retired {
    pub(super) task: Option<ActiveTask>,
    pub(super) waiters: Vec<Resolver<()>>,
}

impl Pool {
    /// Stop the pool.
    ///
    /// Queued tasks are rejected with [`PoolError::Cancelled`] and further
    /// submissions with [`PoolError::Terminated`]. With `force`, running
    /// tasks are abandoned and reject with `Cancelled`; otherwise they run to
    /// completion, unless `timeout` elapses first, in which case their
    /// workers are killed and the tasks reject with [`PoolError::Timeout`].
    ///
    /// The returned future resolves once every worker is terminated.
    pub fn terminate(&self, force: bool, timeout: Option<Duration>) -> TaskFuture<()> {
        self.shared.terminate(force, timeout)
    }

    /// Same as `terminate(force, None)`.
    #[deprecated(note = "use `Pool::terminate`")]
    pub fn clear(&self, force: bool) -> TaskFuture<()> {
        self.terminate(force, None)
    }
}

impl PoolShared {
    /// Remove the worker at `index`, killing its context.
    pub(super) fn retire(state: &mut PoolState, index: usize) -> Retired {
        let mut worker = state.workers.remove(index);
        let task = worker.kill();
        Retired {
            task,
            waiters: worker.take_waiters(),
        }
    }

    /// React to a task future that settled as cancelled or timed out.
    pub(super) fn abort(self: &Arc<Self>, task: TaskId) {
        let waiters = {
            let mut state = lock(&self.state);
            if state.queue.remove(task).is_some() {
                debug!(task = %task, "aborted task dropped from queue");
                return;
            }
            let Some(index) = state.workers.iter().position(|w| w.current_task() == Some(task))
            else {
                return;
            };
            info!(
                worker = %state.workers[index].id(),
                task = %task,
                "aborting running task, terminating its worker"
            );
            let retired = Self::retire(&mut state, index);
            if let Err(err) = self.ensure_min_workers(&mut state) {
                warn!(error = %err, "could not replace aborted worker");
            }
            retired.waiters
        };
        for waiter in waiters {
            waiter.resolve(());
        }
        self.next();
    }

    pub(super) fn terminate(
        self: &Arc<Self>,
        force: bool,
        timeout: Option<Duration>,
    ) -> TaskFuture<()> {
        let mut cancelled: Vec<Resolver<Value>> = Vec::new();
        let mut stopped: Vec<Resolver<()>> = Vec::new();
        let mut remaining: Vec<TaskFuture<()>> = Vec::new();
        {
            let mut state = lock(&self.state);
            state.terminated = true;
            cancelled.extend(state.queue.drain().into_iter().map(|t| t.resolver));

            let mut index = 0;
            while index < state.workers.len() {
                let (done, waiter) = TaskFuture::build(None, None, Some(self.runtime.clone()));
                remaining.push(done);
                let worker = &mut state.workers[index];
                worker.add_waiter(waiter);
                match worker.terminate(force) {
                    Termination::Killed(task) => {
                        cancelled.extend(task.map(|t| t.resolver));
                        stopped.extend(worker.take_waiters());
                        state.workers.remove(index);
                    }
                    Termination::Draining => {
                        if let Some(delay) = timeout {
                            let timer = self.escalation_timer(worker.id(), delay);
                            worker.set_escalation(timer);
                        }
                        index += 1;
                    }
                }
            }
            info!(
                force,
                ?timeout,
                cancelled = cancelled.len(),
                draining = state.workers.len(),
                "terminating worker pool"
            );
        }

        for resolver in cancelled {
            resolver.reject(PoolError::Cancelled);
        }
        for waiter in stopped {
            waiter.resolve(());
        }
        TaskFuture::all(remaining).then(|_| Ok(()))
    }

    fn escalation_timer(self: &Arc<Self>, worker: WorkerId, delay: Duration) -> JoinHandle<()> {
        let pool = Arc::downgrade(self);
        self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(pool) = pool.upgrade() {
                pool.escalate(worker, delay);
            }
        })
    }

    /// Graceful termination ran out of time: kill the worker.
    fn escalate(&self, worker: WorkerId, delay: Duration) {
        let retired = {
            let mut state = lock(&self.state);
            let Some(index) = state.position(worker) else {
                return;
            };
            if state.workers[index].state() != WorkerState::Terminating {
                return;
            }
            warn!(worker = %worker, ?delay, "graceful termination timed out, killing worker");
            Self::retire(&mut state, index)
        };
        if let Some(task) = retired.task {
            task.resolver.reject(PoolError::Timeout(delay));
        }
        for waiter in retired.waiters {
            waiter.resolve(());
        }
    }
}

impl Drop for PoolShared {
    /// The last `Pool` handle is gone: nothing can complete or abort a task
    /// any more, so everything still pending is cancelled.
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        state.terminated = true;
        let mut cancelled: Vec<Resolver<Value>> =
            state.queue.drain().into_iter().map(|t| t.resolver).collect();
        let mut stopped: Vec<Resolver<()>> = Vec::new();
        for mut worker in state.workers.drain(..) {
            cancelled.extend(worker.kill().map(|t| t.resolver));
            stopped.extend(worker.take_waiters());
        }
        if !cancelled.is_empty() {
            info!(cancelled = cancelled.len(), "worker pool dropped with pending tasks");
        }

        for resolver in cancelled {
            resolver.reject(PoolError::Cancelled);
        }
        for waiter in stopped {
            waiter.resolve(());
        }
    }
}
