use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::PoolError;
use crate::sync::lock;

use super::{Abort, Outcome, TaskFuture};

impl<T: Clone + Send + 'static> TaskFuture<T> {
    /// Transform a resolved value. Rejections pass through unchanged.
    pub fn then<U, F>(&self, on_result: F) -> TaskFuture<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Result<U, PoolError> + Send + 'static,
    {
        self.then_or_else(on_result, Err)
    }

    /// Transform either outcome. `on_error` may recover by returning `Ok`.
    pub fn then_or_else<U, F, G>(&self, on_result: F, on_error: G) -> TaskFuture<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Result<U, PoolError> + Send + 'static,
        G: FnOnce(PoolError) -> Result<U, PoolError> + Send + 'static,
    {
        let (next, resolver) = self.derive();
        self.on_settle(move |outcome| {
            let mapped = match outcome {
                Ok(value) => on_result(value),
                Err(err) => on_error(err),
            };
            resolver.settle(mapped);
        });
        next
    }

    /// Shorthand for `then_or_else(Ok, on_error)`.
    pub fn catch<G>(&self, on_error: G) -> TaskFuture<T>
    where
        G: FnOnce(PoolError) -> Result<T, PoolError> + Send + 'static,
    {
        self.then_or_else(Ok, on_error)
    }

    /// Run `handler` once this future settles, whatever the outcome, and
    /// adopt the outcome of the future it returns.
    pub fn always<U, F>(&self, handler: F) -> TaskFuture<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce() -> TaskFuture<U> + Send + 'static,
    {
        let (next, resolver) = self.derive();
        self.on_settle(move |_| {
            handler().on_settle(move |outcome| {
                resolver.settle(outcome);
            });
        });
        next
    }

    /// Settle once every input has settled.
    ///
    /// Resolves with the values in input order, or rejects with the error of
    /// the first rejected input in input order. A rejection never short
    /// circuits: the composite waits for the slowest input. Cancelling the
    /// composite cancels every input.
    pub fn all(futures: Vec<TaskFuture<T>>) -> TaskFuture<Vec<T>> {
        let members: Vec<Arc<dyn Abort>> = futures
            .iter()
            .map(|f| Arc::clone(&f.shared) as Arc<dyn Abort>)
            .collect();
        let runtime = futures.iter().find_map(|f| f.shared.runtime.clone());
        let (composite, resolver) =
            TaskFuture::build(Some(Arc::new(Group(members))), None, runtime);

        if futures.is_empty() {
            resolver.resolve(Vec::new());
            return composite;
        }

        let slots: Arc<Mutex<Vec<Option<Outcome<T>>>>> =
            Arc::new(Mutex::new(vec![None; futures.len()]));
        for (index, future) in futures.iter().enumerate() {
            let slots = Arc::clone(&slots);
            let resolver = resolver.clone();
            future.on_settle(move |outcome| {
                let complete = {
                    let mut slots = lock(&slots);
                    slots[index] = Some(outcome);
                    if slots.iter().all(Option::is_some) {
                        Some(std::mem::take(&mut *slots))
                    } else {
                        None
                    }
                };
                if let Some(outcomes) = complete {
                    resolver.settle(outcomes.into_iter().flatten().collect());
                }
            });
        }
        composite
    }
}

/// Cancellation fan-out for [`TaskFuture::all`].
struct Group(Vec<Arc<dyn Abort>>);

impl Abort for Group {
    fn is_pending(&self) -> bool {
        self.0.iter().any(|member| member.is_pending())
    }

    fn cancel(self: Arc<Self>) {
        for member in &self.0 {
            if member.is_pending() {
                Arc::clone(member).cancel();
            }
        }
    }

    fn timeout(self: Arc<Self>, delay: Duration) {
        for member in &self.0 {
            if member.is_pending() {
                Arc::clone(member).timeout(delay);
            }
        }
    }
}
