//! Cancellable, timeout-capable task futures.
//!
//! A [`TaskFuture`] is a single-assignment container: it starts `Pending` and
//! moves exactly once to `Resolved`, `Rejected` or `Cancelled`. Later writes
//! are ignored ([`Resolver::settle`] returns `false`).
//!
//! Continuations registered with `then`/`catch`/`always` run in registration
//! order, on the thread that settles the future (or immediately, on the
//! registering thread, if it is already settled). Every derived future keeps a
//! cancellation channel back to its source, so `cancel()` or `timeout()` on
//! any link of a chain aborts the task at the root.
//!
//! `TaskFuture` also implements [`std::future::Future`] and can be awaited.

mod combinators;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, Weak};
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::error::PoolError;
use crate::sync::lock;

/// Terminal or pending result of a task future.
pub type Outcome<T> = Result<T, PoolError>;

type Callback<T> = Box<dyn FnOnce(Outcome<T>) + Send>;

/// Observable settlement state of a [`TaskFuture`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FutureState {
    Pending,
    Resolved,
    Rejected,
    Cancelled,
}

// ── Cancellation channel ────────────────────────────────────────────

/// Upstream link of a derived future.
pub(crate) trait Abort: Send + Sync {
    fn is_pending(&self) -> bool;
    fn cancel(self: Arc<Self>);
    fn timeout(self: Arc<Self>, delay: Duration);
}

/// Scheduler hook installed on the root future of a submitted task.
pub(crate) trait DeadlineHook: Send + Sync {
    /// Park `delay` on the task while it is still queued. Returns `false`
    /// when the task is no longer queued and the timer must start now.
    fn park(&self, delay: Duration) -> bool;
}

// ── Shared state ────────────────────────────────────────────────────

struct Inner<T> {
    outcome: Option<Outcome<T>>,
    callbacks: Vec<Callback<T>>,
    draining: bool,
    wakers: Vec<Waker>,
}

pub(crate) struct Shared<T> {
    inner: Mutex<Inner<T>>,
    parent: Option<Arc<dyn Abort>>,
    deadline_hook: Option<Arc<dyn DeadlineHook>>,
    runtime: Option<Handle>,
}

impl<T: Clone + Send + 'static> Shared<T> {
    fn new(
        parent: Option<Arc<dyn Abort>>,
        deadline_hook: Option<Arc<dyn DeadlineHook>>,
        runtime: Option<Handle>,
    ) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                outcome: None,
                callbacks: Vec::new(),
                draining: false,
                wakers: Vec::new(),
            }),
            parent,
            deadline_hook,
            runtime,
        })
    }

    fn state(&self) -> FutureState {
        match &lock(&self.inner).outcome {
            None => FutureState::Pending,
            Some(Ok(_)) => FutureState::Resolved,
            Some(Err(PoolError::Cancelled)) => FutureState::Cancelled,
            Some(Err(_)) => FutureState::Rejected,
        }
    }

    fn outcome(&self) -> Option<Outcome<T>> {
        lock(&self.inner).outcome.clone()
    }

    /// First write wins. Continuations run before awaiting tasks are woken.
    fn settle(&self, outcome: Outcome<T>) -> bool {
        let wakers = {
            let mut inner = lock(&self.inner);
            if inner.outcome.is_some() {
                return false;
            }
            inner.outcome = Some(outcome);
            inner.draining = true;
            std::mem::take(&mut inner.wakers)
        };
        self.drain();
        for waker in wakers {
            waker.wake();
        }
        true
    }

    fn on_settle(&self, callback: Callback<T>) {
        {
            let mut inner = lock(&self.inner);
            inner.callbacks.push(callback);
            if inner.outcome.is_none() || inner.draining {
                return;
            }
            inner.draining = true;
        }
        self.drain();
    }

    fn drain(&self) {
        loop {
            let (batch, outcome) = {
                let mut inner = lock(&self.inner);
                let outcome = match &inner.outcome {
                    Some(outcome) if !inner.callbacks.is_empty() => outcome.clone(),
                    _ => {
                        inner.draining = false;
                        return;
                    }
                };
                (std::mem::take(&mut inner.callbacks), outcome)
            };
            for callback in batch {
                callback(outcome.clone());
            }
        }
    }

    fn arm_timer(shared: &Arc<Self>, delay: Duration) {
        let weak: Weak<Self> = Arc::downgrade(shared);
        let expire = move || {
            if let Some(shared) = weak.upgrade() {
                if shared.settle(Err(PoolError::Timeout(delay))) {
                    debug!(?delay, "future timed out");
                }
            }
        };
        match shared.runtime.clone().or_else(|| Handle::try_current().ok()) {
            Some(runtime) => {
                runtime.spawn(async move {
                    tokio::time::sleep(delay).await;
                    expire();
                });
            }
            None => {
                warn!(?delay, "no tokio runtime to run the deadline on");
                shared.settle(Err(PoolError::NoRuntime));
            }
        }
    }
}

impl<T: Clone + Send + 'static> Abort for Shared<T> {
    fn is_pending(&self) -> bool {
        lock(&self.inner).outcome.is_none()
    }

    fn cancel(self: Arc<Self>) {
        if let Some(parent) = &self.parent {
            if parent.is_pending() {
                Arc::clone(parent).cancel();
            }
        }
        // Still pending when the chain below the parent is waiting on
        // something else (e.g. the handler future of `always`).
        self.settle(Err(PoolError::Cancelled));
    }

    fn timeout(self: Arc<Self>, delay: Duration) {
        if !Abort::is_pending(&*self) {
            return;
        }
        if let Some(parent) = &self.parent {
            if parent.is_pending() {
                Arc::clone(parent).timeout(delay);
                return;
            }
        }
        if let Some(hook) = &self.deadline_hook {
            if hook.park(delay) {
                return;
            }
        }
        Self::arm_timer(&self, delay);
    }
}

// ── TaskFuture ──────────────────────────────────────────────────────

/// Caller-facing handle to the eventual outcome of a task.
pub struct TaskFuture<T = Value> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for TaskFuture<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone + Send + 'static> TaskFuture<T> {
    /// Create a pending future and the handle that settles it.
    pub fn pending() -> (Self, Resolver<T>) {
        Self::build(None, None, Handle::try_current().ok())
    }

    /// An already resolved future.
    pub fn resolved(value: T) -> Self {
        let (future, resolver) = Self::pending();
        resolver.resolve(value);
        future
    }

    /// An already rejected future.
    pub fn rejected(error: PoolError) -> Self {
        let (future, resolver) = Self::pending();
        resolver.reject(error);
        future
    }

    pub(crate) fn build(
        parent: Option<Arc<dyn Abort>>,
        deadline_hook: Option<Arc<dyn DeadlineHook>>,
        runtime: Option<Handle>,
    ) -> (Self, Resolver<T>) {
        let shared = Shared::new(parent, deadline_hook, runtime);
        (
            Self {
                shared: Arc::clone(&shared),
            },
            Resolver { shared },
        )
    }

    /// A pending future whose cancellation channel points back at `self`.
    fn derive<U: Clone + Send + 'static>(&self) -> (TaskFuture<U>, Resolver<U>) {
        let parent: Arc<dyn Abort> = self.shared.clone();
        TaskFuture::build(Some(parent), None, self.shared.runtime.clone())
    }

    pub fn state(&self) -> FutureState {
        self.shared.state()
    }

    pub fn is_pending(&self) -> bool {
        self.state() == FutureState::Pending
    }

    pub fn is_resolved(&self) -> bool {
        self.state() == FutureState::Resolved
    }

    /// True for both `Rejected` and `Cancelled`.
    pub fn is_rejected(&self) -> bool {
        matches!(self.state(), FutureState::Rejected | FutureState::Cancelled)
    }

    /// The settled outcome, if any, without waiting.
    pub fn outcome(&self) -> Option<Outcome<T>> {
        self.shared.outcome()
    }

    /// Abort the task behind this future.
    ///
    /// A no-op once the future has settled. If the task is queued it is
    /// dropped from the queue; if it is running, its worker is forcibly
    /// terminated.
    pub fn cancel(&self) -> &Self {
        Arc::clone(&self.shared).cancel();
        self
    }

    /// Reject with [`PoolError::Timeout`] if still pending after `delay`.
    ///
    /// For a task that is still queued the deadline starts counting when the
    /// task is handed to a worker. Expiry aborts the task like `cancel()`.
    ///
    /// The deadline runs on a tokio runtime. A standalone future created
    /// outside of one rejects with [`PoolError::NoRuntime`] instead.
    pub fn timeout(&self, delay: Duration) -> &Self {
        Arc::clone(&self.shared).timeout(delay);
        self
    }

    /// Start a deadline timer right away, ignoring any deadline hook.
    pub(crate) fn start_deadline(&self, delay: Duration) {
        if self.is_pending() {
            Shared::arm_timer(&self.shared, delay);
        }
    }

    /// Register an internal listener that sees the raw outcome.
    pub(crate) fn on_settle<F>(&self, listener: F)
    where
        F: FnOnce(Outcome<T>) + Send + 'static,
    {
        self.shared.on_settle(Box::new(listener));
    }
}

impl<T: Clone + Send + 'static> Future for TaskFuture<T> {
    type Output = Outcome<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut inner = lock(&self.shared.inner);
        if let Some(outcome) = &inner.outcome {
            return Poll::Ready(outcome.clone());
        }
        if !inner.wakers.iter().any(|w| w.will_wake(cx.waker())) {
            inner.wakers.push(cx.waker().clone());
        }
        Poll::Pending
    }
}

impl<T: Clone + Send + 'static> fmt::Debug for TaskFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskFuture")
            .field("state", &self.state())
            .finish()
    }
}

// ── Resolver ────────────────────────────────────────────────────────

/// Write side of a [`TaskFuture`].
pub struct Resolver<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Resolver<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone + Send + 'static> Resolver<T> {
    pub fn resolve(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    pub fn reject(&self, error: PoolError) -> bool {
        self.settle(Err(error))
    }

    /// Settle the future. Returns `false` (and changes nothing) if it had
    /// already settled.
    pub fn settle(&self, outcome: Outcome<T>) -> bool {
        self.shared.settle(outcome)
    }

    pub fn is_pending(&self) -> bool {
        Abort::is_pending(&*self.shared)
    }

    pub fn future(&self) -> TaskFuture<T> {
        TaskFuture {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone + Send + 'static> fmt::Debug for Resolver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("state", &self.shared.state())
            .finish()
    }
}
