//! Per-worker run queue.
//!
//! A lock-based deque: the owning worker pushes and pops at one end (LIFO
//! for cache warmth), thieves steal from the other end (FIFO, oldest work
//! first). Lock-based keeps us inside the crate's `unsafe` prohibition
//! while preserving work-stealing semantics.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::runtime::task::TaskCell;

/// A worker's local run queue.
#[derive(Debug)]
pub struct LocalQueue {
    inner: Arc<Mutex<VecDeque<Arc<TaskCell>>>>,
}

impl LocalQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Pushes a runnable task.
    pub fn push(&self, task: Arc<TaskCell>) {
        let mut queue = self.inner.lock().expect("local queue lock poisoned");
        queue.push_back(task);
    }

    /// Pops the most recently pushed task.
    #[must_use]
    pub fn pop(&self) -> Option<Arc<TaskCell>> {
        let mut queue = self.inner.lock().expect("local queue lock poisoned");
        queue.pop_back()
    }

    /// True when no tasks are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let queue = self.inner.lock().expect("local queue lock poisoned");
        queue.is_empty()
    }

    /// Queued task count.
    #[must_use]
    pub fn len(&self) -> usize {
        let queue = self.inner.lock().expect("local queue lock poisoned");
        queue.len()
    }

    /// A handle other workers use to steal from this queue.
    #[must_use]
    pub fn stealer(&self) -> Stealer {
        Stealer {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Default for LocalQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Steal handle to another worker's queue.
#[derive(Debug, Clone)]
pub struct Stealer {
    inner: Arc<Mutex<VecDeque<Arc<TaskCell>>>>,
}

impl Stealer {
    /// Steals the oldest queued task.
    #[must_use]
    pub fn steal(&self) -> Option<Arc<TaskCell>> {
        let mut queue = self.inner.lock().expect("local queue lock poisoned");
        queue.pop_front()
    }

    /// Moves up to half of the victim's queue into `dest`.
    ///
    /// Returns true if anything was stolen.
    pub fn steal_batch(&self, dest: &LocalQueue) -> bool {
        let stolen: Vec<_> = {
            let mut queue = self.inner.lock().expect("local queue lock poisoned");
            if queue.is_empty() {
                return false;
            }
            let count = (queue.len() / 2).max(1);
            queue.drain(..count).collect()
        };
        for task in stolen {
            dest.push(task);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::scheduler::worker::WorkerShared;
    use crate::types::{Core, TaskId};

    fn cell(home: &Arc<WorkerShared>) -> Arc<TaskCell> {
        TaskCell::new(TaskId::next(), Box::pin(async {}), Arc::clone(home))
    }

    #[test]
    fn owner_pop_is_lifo() {
        let home = WorkerShared::new(Core::new(0));
        let a = cell(&home);
        let b = cell(&home);
        let queue = LocalQueue::new();
        queue.push(Arc::clone(&a));
        queue.push(Arc::clone(&b));
        assert_eq!(queue.pop().map(|t| t.id()), Some(b.id()));
        assert_eq!(queue.pop().map(|t| t.id()), Some(a.id()));
        assert!(queue.pop().is_none());
    }

    #[test]
    fn stealer_takes_oldest_first() {
        let home = WorkerShared::new(Core::new(0));
        let a = cell(&home);
        let b = cell(&home);
        let queue = LocalQueue::new();
        queue.push(Arc::clone(&a));
        queue.push(Arc::clone(&b));
        let stealer = queue.stealer();
        assert_eq!(stealer.steal().map(|t| t.id()), Some(a.id()));
        assert_eq!(queue.pop().map(|t| t.id()), Some(b.id()));
    }

    #[test]
    fn steal_batch_moves_half() {
        let home = WorkerShared::new(Core::new(0));
        let queue = LocalQueue::new();
        for _ in 0..8 {
            queue.push(cell(&home));
        }
        let dest = LocalQueue::new();
        assert!(queue.stealer().steal_batch(&dest));
        assert_eq!(dest.len(), 4);
        assert_eq!(queue.len(), 4);
    }

    #[test]
    fn steal_batch_from_empty_is_noop() {
        let queue = LocalQueue::new();
        let dest = LocalQueue::new();
        assert!(!queue.stealer().steal_batch(&dest));
        assert!(dest.is_empty());
    }
}
