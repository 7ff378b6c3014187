use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::context::ExecutionContext;
use crate::error::ExecutionError;
use crate::future::Resolver;
use crate::queue::Task;
use crate::types::{Request, TaskId, WorkerId};

/// Lifecycle of a worker: `Idle ⇄ Busy`, then `Terminating → Terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WorkerState {
    Idle,
    Busy,
    /// Draining: finishes the current task, then stops.
    Terminating,
    Terminated,
}

/// Called by the driver task with the context's reply.
pub(crate) type Completion = Box<dyn FnOnce(Result<Value, ExecutionError>) + Send>;

/// The task a worker is running.
#[derive(Debug)]
pub(crate) struct ActiveTask {
    pub id: TaskId,
    pub resolver: Resolver<Value>,
    pub started_at: DateTime<Utc>,
}

/// Outcome of a termination request.
#[derive(Debug)]
pub(crate) enum Termination {
    /// The context was killed. Carries the abandoned task, if any.
    Killed(Option<ActiveTask>),
    /// The worker will stop once its current task completes.
    Draining,
}

/// Wraps one execution context and tracks what it is doing.
///
/// All methods are called by the scheduler while it holds the pool lock;
/// none of them settles a future.
pub struct WorkerHandle {
    id: WorkerId,
    state: WorkerState,
    current: Option<ActiveTask>,
    context: Arc<dyn ExecutionContext>,
    driver: Option<JoinHandle<()>>,
    escalation: Option<JoinHandle<()>>,
    waiters: Vec<Resolver<()>>,
    spawned_at: DateTime<Utc>,
    completed: u64,
}

impl WorkerHandle {
    pub fn new(id: WorkerId, context: Arc<dyn ExecutionContext>) -> Self {
        Self {
            id,
            state: WorkerState::Idle,
            current: None,
            context,
            driver: None,
            escalation: None,
            waiters: Vec::new(),
            spawned_at: Utc::now(),
            completed: 0,
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Accepting work.
    pub fn is_idle(&self) -> bool {
        self.state == WorkerState::Idle
    }

    /// Running a task (a draining worker may still be busy).
    pub fn is_busy(&self) -> bool {
        self.current.is_some()
    }

    pub fn current_task(&self) -> Option<TaskId> {
        self.current.as_ref().map(|t| t.id)
    }

    pub fn is_context_alive(&self) -> bool {
        self.context.is_alive()
    }

    pub fn spawned_at(&self) -> DateTime<Utc> {
        self.spawned_at
    }

    /// Tasks this worker finished (successfully or not).
    pub fn completed(&self) -> u64 {
        self.completed
    }

    /// Idle → Busy. Dispatches the task on a driver task spawned on
    /// `runtime`; `on_complete` receives the context's reply.
    ///
    /// Hands the task back if the worker is not idle.
    pub(crate) fn assign(
        &mut self,
        task: Task,
        runtime: &Handle,
        on_complete: Completion,
    ) -> Result<(), Task> {
        if self.state != WorkerState::Idle {
            return Err(task);
        }
        let Task {
            id,
            method,
            args,
            resolver,
            timeout,
            submitted_at,
        } = task;

        if let Some(delay) = timeout {
            resolver.future().start_deadline(delay);
        }

        let waited = Utc::now().signed_duration_since(submitted_at);
        debug!(
            worker = %self.id,
            task = %id,
            method = method.label(),
            queued_ms = waited.num_milliseconds(),
            "task assigned"
        );

        let context = Arc::clone(&self.context);
        let request = Request {
            task_id: id,
            method,
            args,
        };
        self.driver = Some(runtime.spawn(async move {
            let outcome = context.dispatch(request).await;
            on_complete(outcome);
        }));
        self.current = Some(ActiveTask {
            id,
            resolver,
            started_at: Utc::now(),
        });
        self.state = WorkerState::Busy;
        Ok(())
    }

    /// Busy → Idle (or stays Terminating). Returns the finished task, or
    /// `None` if `task` is not the one this worker is running.
    pub(crate) fn complete(&mut self, task: TaskId) -> Option<ActiveTask> {
        if self.current_task() != Some(task) {
            return None;
        }
        self.driver = None;
        self.completed += 1;
        if self.state == WorkerState::Busy {
            self.state = WorkerState::Idle;
        }
        self.current.take()
    }

    /// Graceful (`force = false`) or forced termination.
    ///
    /// A graceful request on a busy worker only marks it `Terminating`; the
    /// scheduler kills it when the current task completes.
    pub(crate) fn terminate(&mut self, force: bool) -> Termination {
        if force || self.current.is_none() {
            Termination::Killed(self.kill())
        } else {
            self.state = WorkerState::Terminating;
            Termination::Draining
        }
    }

    /// Kill the context immediately and return the abandoned task.
    pub(crate) fn kill(&mut self) -> Option<ActiveTask> {
        self.context.kill();
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
        if let Some(escalation) = self.escalation.take() {
            escalation.abort();
        }
        if self.state != WorkerState::Terminated {
            debug!(worker = %self.id, completed = self.completed, "worker terminated");
        }
        self.state = WorkerState::Terminated;
        self.current.take()
    }

    /// Timer that escalates a graceful termination to a forced one.
    pub(crate) fn set_escalation(&mut self, timer: JoinHandle<()>) {
        if let Some(previous) = self.escalation.replace(timer) {
            previous.abort();
        }
    }

    /// Register a future to resolve once this worker is `Terminated`.
    pub(crate) fn add_waiter(&mut self, waiter: Resolver<()>) {
        self.waiters.push(waiter);
    }

    pub(crate) fn take_waiters(&mut self) -> Vec<Resolver<()>> {
        std::mem::take(&mut self.waiters)
    }
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("current", &self.current_task())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::oneshot;

    use super::*;
    use crate::future::TaskFuture;
    use crate::types::Method;

    /// Context that answers after `delay` and counts kills.
    struct SlowContext {
        delay: Duration,
        kills: AtomicUsize,
        alive: AtomicBool,
    }

    impl SlowContext {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                delay,
                kills: AtomicUsize::new(0),
                alive: AtomicBool::new(true),
            })
        }
    }

    #[async_trait]
    impl ExecutionContext for SlowContext {
        async fn dispatch(&self, request: Request) -> Result<Value, ExecutionError> {
            tokio::time::sleep(self.delay).await;
            Ok(json!(request.args.len()))
        }

        fn kill(&self) {
            self.kills.fetch_add(1, Ordering::SeqCst);
            self.alive.store(false, Ordering::SeqCst);
        }

        fn is_alive(&self) -> bool {
            self.alive.load(Ordering::SeqCst)
        }
    }

    fn task(id: u64) -> (Task, TaskFuture<Value>) {
        let (future, resolver) = TaskFuture::pending();
        let task = Task::new(TaskId(id), Method::named("len"), vec![json!(1), json!(2)], resolver);
        (task, future)
    }

    fn completion() -> (Completion, oneshot::Receiver<Result<Value, ExecutionError>>) {
        let (tx, rx) = oneshot::channel();
        (Box::new(move |outcome| {
            let _ = tx.send(outcome);
        }), rx)
    }

    #[tokio::test]
    async fn idle_busy_idle_cycle() {
        let ctx = SlowContext::new(Duration::from_millis(5));
        let mut worker = WorkerHandle::new(WorkerId(1), ctx);
        let (task, _future) = task(1);
        let (on_complete, reply) = completion();

        worker.assign(task, &Handle::current(), on_complete).unwrap();
        assert_eq!(worker.state(), WorkerState::Busy);
        assert_eq!(worker.current_task(), Some(TaskId(1)));

        assert_eq!(reply.await.unwrap(), Ok(json!(2)));
        assert!(worker.complete(TaskId(99)).is_none(), "stale completion is ignored");
        let finished = worker.complete(TaskId(1)).unwrap();
        assert_eq!(finished.id, TaskId(1));
        assert_eq!(worker.state(), WorkerState::Idle);
        assert_eq!(worker.completed(), 1);
    }

    #[tokio::test]
    async fn assign_is_refused_unless_idle() {
        let ctx = SlowContext::new(Duration::from_millis(50));
        let mut worker = WorkerHandle::new(WorkerId(2), ctx);
        let (first, _f1) = task(1);
        let (second, _f2) = task(2);

        worker.assign(first, &Handle::current(), completion().0).unwrap();
        let refused = worker.assign(second, &Handle::current(), completion().0);
        assert_eq!(refused.map_err(|t| t.id), Err(TaskId(2)));
    }

    #[tokio::test]
    async fn graceful_terminate_drains_then_forced_kills() {
        let ctx = SlowContext::new(Duration::from_millis(50));
        let mut worker = WorkerHandle::new(WorkerId(3), ctx.clone());
        let (task, _future) = task(1);
        worker.assign(task, &Handle::current(), completion().0).unwrap();

        assert!(matches!(worker.terminate(false), Termination::Draining));
        assert_eq!(worker.state(), WorkerState::Terminating);
        assert_eq!(ctx.kills.load(Ordering::SeqCst), 0);

        match worker.terminate(true) {
            Termination::Killed(Some(active)) => assert_eq!(active.id, TaskId(1)),
            other => panic!("expected forced kill, got {other:?}"),
        }
        assert_eq!(worker.state(), WorkerState::Terminated);
        assert_eq!(ctx.kills.load(Ordering::SeqCst), 1);
        assert!(!worker.is_context_alive());
    }

    #[tokio::test]
    async fn idle_worker_terminates_immediately() {
        let ctx = SlowContext::new(Duration::ZERO);
        let mut worker = WorkerHandle::new(WorkerId(4), ctx.clone());

        assert!(matches!(worker.terminate(false), Termination::Killed(None)));
        assert_eq!(worker.state(), WorkerState::Terminated);
    }
}
