use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier of a submitted task, unique per pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Identifier of a worker, unique per pool. Never reused after termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerId(pub u64);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// A self-contained function shipped to a worker.
///
/// Being a plain `fn` pointer it cannot capture any state from the
/// submitting scope.
pub type InlineFn = fn(Vec<Value>) -> Result<Value, String>;

/// What a task asks a worker to run.
#[derive(Clone)]
pub enum Method {
    /// A method registered on the worker, looked up by name.
    Named(String),
    /// A function shipped with the task itself.
    Inline(InlineFn),
}

impl Method {
    pub fn named(name: impl Into<String>) -> Self {
        Method::Named(name.into())
    }

    pub fn inline(f: InlineFn) -> Self {
        Method::Inline(f)
    }

    /// Label used in logs.
    pub fn label(&self) -> &str {
        match self {
            Method::Named(name) => name,
            Method::Inline(_) => "<inline>",
        }
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Named(name) => f.debug_tuple("Named").field(name).finish(),
            Method::Inline(_) => f.write_str("Inline(<fn>)"),
        }
    }
}

impl From<&str> for Method {
    fn from(name: &str) -> Self {
        Method::Named(name.to_string())
    }
}

impl From<String> for Method {
    fn from(name: String) -> Self {
        Method::Named(name)
    }
}

/// Dispatch message handed to an execution context.
#[derive(Debug, Clone)]
pub struct Request {
    pub task_id: TaskId,
    pub method: Method,
    pub args: Vec<Value>,
}
