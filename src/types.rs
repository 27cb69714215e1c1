//! Core identifier types.
//!
//! Cores and tasks are named by small copyable ids. A [`Core`] is the unit
//! of locality: one worker, one heap arena, one message inbox. Task ids are
//! allocated from a process-wide counter and are used only for logging and
//! debugging; the scheduler itself holds tasks by reference.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Identifier for a core in the cluster.
///
/// Cores are dense indices `0..cores`. The runtime does not interpret them
/// beyond equality, ordering, and arithmetic in the linear address mapping.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Core(u32);

impl Core {
    /// Creates a core id from a dense index.
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the dense index of this core.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Returns the raw numeric id.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Core {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C{}", self.0)
    }
}

static TASK_COUNTER: AtomicU64 = AtomicU64::new(1);

/// A unique identifier for a spawned task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

impl TaskId {
    /// Allocates the next unique task id.
    #[must_use]
    pub fn next() -> Self {
        Self(TASK_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw numeric identifier.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_display_and_index() {
        let core = Core::new(3);
        assert_eq!(core.index(), 3);
        assert_eq!(core.to_string(), "C3");
    }

    #[test]
    fn task_ids_are_unique() {
        let a = TaskId::next();
        let b = TaskId::next();
        assert_ne!(a, b);
        assert!(b.raw() > a.raw());
    }
}
