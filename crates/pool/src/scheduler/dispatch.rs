use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{ExecutionError, PoolError};
use crate::future::{DeadlineHook, Resolver, TaskFuture};
use crate::queue::Task;
use crate::sync::lock;
use crate::types::{Method, TaskId, WorkerId};
use crate::worker::{Completion, WorkerHandle, WorkerState};

use super::core::{Pool, PoolShared};

impl Pool {
    /// Submit `method` with `args`. Never blocks.
    ///
    /// The returned future rejects immediately (nothing is queued) when the
    /// method is malformed or unknown to the workers, or when the pool has
    /// been terminated.
    ///
    /// An inline method must be self-contained; a plain `fn` cannot capture
    /// its surroundings.
    pub fn exec(&self, method: impl Into<Method>, args: Vec<Value>) -> TaskFuture<Value> {
        self.shared.submit(method.into(), args)
    }
}

/// Parks a `timeout()` issued while the task is still queued.
struct QueuedDeadline {
    pool: Weak<PoolShared>,
    task: TaskId,
}

impl DeadlineHook for QueuedDeadline {
    fn park(&self, delay: Duration) -> bool {
        let Some(pool) = self.pool.upgrade() else {
            return false;
        };
        let mut state = lock(&pool.state);
        match state.queue.get_mut(self.task) {
            Some(task) => {
                debug!(task = %self.task, ?delay, "deadline parked until assignment");
                task.timeout = Some(delay);
                true
            }
            None => false,
        }
    }
}

impl PoolShared {
    fn validate(&self, method: &Method) -> Result<(), PoolError> {
        match method {
            Method::Inline(_) => Ok(()),
            Method::Named(name) if name.trim().is_empty() => Err(PoolError::InvalidMethod(
                "method name must not be empty".to_string(),
            )),
            Method::Named(name) if !self.factory.resolves(name) => Err(
                PoolError::InvalidMethod(format!("unknown method '{name}'")),
            ),
            Method::Named(_) => Ok(()),
        }
    }

    pub(super) fn submit(self: &Arc<Self>, method: Method, args: Vec<Value>) -> TaskFuture<Value> {
        if let Err(err) = self.validate(&method) {
            debug!(error = %err, "submission rejected");
            return TaskFuture::rejected(err);
        }

        let id = TaskId(self.next_task.fetch_add(1, Ordering::Relaxed));
        let hook: Arc<dyn DeadlineHook> = Arc::new(QueuedDeadline {
            pool: Arc::downgrade(self),
            task: id,
        });
        let (future, resolver) = TaskFuture::build(None, Some(hook), Some(self.runtime.clone()));

        // Cancellation and timeouts settle the future first; the scheduler
        // then drops the task from the queue or kills its worker.
        let pool = Arc::downgrade(self);
        future.on_settle(move |outcome| {
            if let Err(err) = outcome {
                if err.is_abort() {
                    if let Some(pool) = pool.upgrade() {
                        pool.abort(id);
                    }
                }
            }
        });

        let refused = {
            let mut state = lock(&self.state);
            if state.terminated {
                Some(resolver)
            } else {
                debug!(task = %id, method = method.label(), queued = state.queue.len() + 1, "task submitted");
                state.queue.enqueue(Task::new(id, method, args, resolver));
                None
            }
        };
        match refused {
            Some(resolver) => {
                resolver.reject(PoolError::Terminated);
            }
            None => self.next(),
        }
        future
    }

    /// Assignment pass: pair queued tasks with idle workers, growing the
    /// pool up to `max_workers` instead of waiting.
    pub(super) fn next(self: &Arc<Self>) {
        let mut failed: Vec<(Resolver<Value>, PoolError)> = Vec::new();
        {
            let mut state = lock(&self.state);
            while !state.queue.is_empty() {
                let index = match state.workers.iter().position(WorkerHandle::is_idle) {
                    Some(index) => index,
                    None if state.workers.len() < self.max_workers => {
                        match self.spawn_worker(&mut state) {
                            Ok(index) => index,
                            Err(err) => {
                                warn!(error = %err, "could not grow the pool");
                                if !state.workers.is_empty() {
                                    break;
                                }
                                // Nobody will ever pick the head task up.
                                if let Some(task) = state.queue.dequeue() {
                                    failed.push((task.resolver, err));
                                }
                                continue;
                            }
                        }
                    }
                    None => break,
                };

                let Some(task) = state.queue.dequeue() else {
                    break;
                };
                if !task.resolver.is_pending() {
                    // Cancelled while queued; the abort listener has not
                    // reached the queue yet.
                    continue;
                }
                let on_complete = self.completion(state.workers[index].id(), task.id);
                if let Err(task) = state.workers[index].assign(task, &self.runtime, on_complete) {
                    state.queue.requeue_front(task);
                    break;
                }
            }
        }
        for (resolver, err) in failed {
            resolver.reject(err);
        }
    }

    fn completion(self: &Arc<Self>, worker: WorkerId, task: TaskId) -> Completion {
        let pool = Arc::downgrade(self);
        Box::new(move |outcome| {
            if let Some(pool) = pool.upgrade() {
                pool.complete(worker, task, outcome);
            }
        })
    }

    /// Route a context's reply to the task's future and recycle the worker.
    pub(super) fn complete(
        self: &Arc<Self>,
        worker: WorkerId,
        task: TaskId,
        outcome: Result<Value, ExecutionError>,
    ) {
        let (finished, stopped) = {
            let mut state = lock(&self.state);
            let Some(index) = state.position(worker) else {
                return;
            };
            let Some(active) = state.workers[index].complete(task) else {
                return;
            };
            let elapsed = Utc::now().signed_duration_since(active.started_at);
            debug!(
                worker = %worker,
                task = %task,
                ok = outcome.is_ok(),
                elapsed_ms = elapsed.num_milliseconds(),
                "task finished"
            );

            let crashed = matches!(outcome, Err(ExecutionError::Crashed(_)))
                || !state.workers[index].is_context_alive();
            let mut stopped = Vec::new();
            if crashed {
                warn!(worker = %worker, "execution context died, removing worker");
                stopped = Self::retire(&mut state, index).waiters;
                if let Err(err) = self.ensure_min_workers(&mut state) {
                    warn!(error = %err, "could not replace crashed worker");
                }
            } else if state.workers[index].state() == WorkerState::Terminating {
                stopped = Self::retire(&mut state, index).waiters;
            }
            ((active.resolver, outcome.map_err(PoolError::from)), stopped)
        };

        let (resolver, outcome) = finished;
        resolver.settle(outcome);
        for waiter in stopped {
            waiter.resolve(());
        }
        self.next();
    }
}
