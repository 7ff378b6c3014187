use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::{ExecutionError, PoolError};
use crate::registry::{MethodRegistry, METHODS};
use crate::sync::lock;
use crate::types::{Method, Request, WorkerId};

use super::{ContextFactory, ExecutionContext};

type Reply = oneshot::Sender<Result<Value, ExecutionError>>;

struct Job {
    request: Request,
    reply: Reply,
}

/// Execution context backed by a dedicated OS thread.
///
/// Requests travel over a channel to the thread, which runs them one at a
/// time against the shared [`MethodRegistry`]. A panicking method takes the
/// context down with it and is reported as [`ExecutionError::Crashed`].
///
/// Threads cannot be interrupted, so [`kill`](ExecutionContext::kill) closes
/// the job channel and abandons the running call: the thread exits as soon as
/// that call returns and its result goes nowhere.
pub struct ThreadContext {
    jobs: Mutex<Option<mpsc::Sender<Job>>>,
    alive: Arc<AtomicBool>,
    name: String,
}

impl ThreadContext {
    pub fn spawn(worker: WorkerId, registry: Arc<MethodRegistry>) -> Result<Self, PoolError> {
        let (tx, rx) = mpsc::channel::<Job>();
        let alive = Arc::new(AtomicBool::new(true));
        let name = format!("drudge-{worker}");

        let thread_alive = Arc::clone(&alive);
        std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || run_jobs(rx, registry, thread_alive))
            .map_err(|e| PoolError::Spawn(e.to_string()))?;

        debug!(thread = %name, "execution thread started");
        Ok(Self {
            jobs: Mutex::new(Some(tx)),
            alive,
            name,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl ExecutionContext for ThreadContext {
    async fn dispatch(&self, request: Request) -> Result<Value, ExecutionError> {
        let (reply, response) = oneshot::channel();
        {
            let jobs = lock(&self.jobs);
            let sender = jobs
                .as_ref()
                .ok_or_else(|| ExecutionError::Crashed("execution context was killed".into()))?;
            sender
                .send(Job { request, reply })
                .map_err(|_| ExecutionError::Crashed("execution thread has exited".into()))?;
        }
        response
            .await
            .map_err(|_| ExecutionError::Crashed("execution thread dropped the call".into()))?
    }

    fn kill(&self) {
        if lock(&self.jobs).take().is_some() {
            debug!(thread = %self.name, "execution thread killed");
        }
        self.alive.store(false, Ordering::SeqCst);
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

impl Drop for ThreadContext {
    fn drop(&mut self) {
        self.kill();
    }
}

fn run_jobs(jobs: mpsc::Receiver<Job>, registry: Arc<MethodRegistry>, alive: Arc<AtomicBool>) {
    while let Ok(Job { request, reply }) = jobs.recv() {
        let task = request.task_id;
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            invoke(&registry, request.method, request.args)
        }));
        match result {
            Ok(outcome) => {
                // The receiver is gone when the call was abandoned.
                let _ = reply.send(outcome.map_err(ExecutionError::Failed));
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(task = %task, %message, "method panicked, execution thread exiting");
                alive.store(false, Ordering::SeqCst);
                let _ = reply.send(Err(ExecutionError::Crashed(message)));
                return;
            }
        }
    }
    alive.store(false, Ordering::SeqCst);
}

fn invoke(registry: &MethodRegistry, method: Method, args: Vec<Value>) -> Result<Value, String> {
    match method {
        Method::Inline(f) => f(args),
        Method::Named(name) if name == METHODS => Ok(Value::Array(
            registry.names().into_iter().map(Value::String).collect(),
        )),
        Method::Named(name) => match registry.get(&name) {
            Some(f) => f(args),
            None => Err(format!("Unknown method \"{name}\"")),
        },
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Starts one [`ThreadContext`] per worker, all sharing one registry.
#[derive(Debug, Clone, Default)]
pub struct ThreadContextFactory {
    registry: Arc<MethodRegistry>,
}

impl ThreadContextFactory {
    pub fn new(registry: MethodRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub fn registry(&self) -> &MethodRegistry {
        &self.registry
    }
}

impl ContextFactory for ThreadContextFactory {
    fn spawn(&self, worker: WorkerId) -> Result<Arc<dyn ExecutionContext>, PoolError> {
        let context = ThreadContext::spawn(worker, Arc::clone(&self.registry))?;
        Ok(Arc::new(context))
    }

    fn resolves(&self, method: &str) -> bool {
        self.registry.resolves(method)
    }
}
