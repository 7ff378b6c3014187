use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::future::Resolver;
use crate::types::{Method, TaskId};

/// One unit of submitted work.
///
/// Owned by the queue until assigned, then by exactly one worker until its
/// future settles.
#[derive(Debug)]
pub struct Task {
    pub id: TaskId,
    pub method: Method,
    pub args: Vec<Value>,
    pub resolver: Resolver<Value>,
    /// Deadline parked while the task waits in the queue.
    pub timeout: Option<Duration>,
    pub submitted_at: DateTime<Utc>,
}

impl Task {
    pub fn new(id: TaskId, method: Method, args: Vec<Value>, resolver: Resolver<Value>) -> Self {
        Self {
            id,
            method,
            args,
            resolver,
            timeout: None,
            submitted_at: Utc::now(),
        }
    }
}

/// FIFO backlog of submitted but unassigned tasks.
#[derive(Debug, Default)]
pub struct TaskQueue {
    tasks: VecDeque<Task>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, task: Task) {
        self.tasks.push_back(task);
    }

    /// Remove and return the oldest task, or `None` when empty.
    pub fn dequeue(&mut self) -> Option<Task> {
        self.tasks.pop_front()
    }

    /// Put a task back at the head of the queue.
    pub(crate) fn requeue_front(&mut self, task: Task) {
        self.tasks.push_front(task);
    }

    /// Pull a specific task out of the queue (cancellation before assignment).
    pub fn remove(&mut self, id: TaskId) -> Option<Task> {
        let index = self.tasks.iter().position(|t| t.id == id)?;
        self.tasks.remove(index)
    }

    pub fn get_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    /// Empty the queue, oldest first.
    pub fn drain(&mut self) -> Vec<Task> {
        self.tasks.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
