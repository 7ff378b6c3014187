use serde::{Deserialize, Serialize};

use crate::queue::TaskQueue;
use crate::worker::WorkerHandle;

/// Point-in-time counts derived from scheduler state.
///
/// `total_workers == busy_workers + idle_workers` always holds; a worker that
/// is draining towards termination counts as busy while it still runs a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    pub total_workers: usize,
    pub busy_workers: usize,
    pub idle_workers: usize,
    /// Tasks waiting in the queue.
    pub pending_tasks: usize,
    /// Tasks assigned to a worker.
    pub active_tasks: usize,
}

impl PoolStats {
    pub(crate) fn collect(workers: &[WorkerHandle], queue: &TaskQueue) -> Self {
        let total = workers.len();
        let busy = workers.iter().filter(|w| w.is_busy()).count();
        Self {
            total_workers: total,
            busy_workers: busy,
            idle_workers: total - busy,
            pending_tasks: queue.len(),
            active_tasks: busy,
        }
    }

    /// No workers, no work.
    pub fn is_empty(&self) -> bool {
        self.total_workers == 0 && self.pending_tasks == 0
    }
}
