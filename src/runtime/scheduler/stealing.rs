//! Steal-victim selection.

use crate::runtime::scheduler::local_queue::Stealer;
use crate::runtime::task::TaskCell;
use crate::util::DetRng;
use std::sync::Arc;

/// Tries each stealer once, starting from a random victim.
pub fn steal_task(stealers: &[Stealer], rng: &mut DetRng) -> Option<Arc<TaskCell>> {
    if stealers.is_empty() {
        return None;
    }
    let len = stealers.len();
    let start = rng.next_usize(len);
    for i in 0..len {
        let idx = (start + i) % len;
        if let Some(task) = stealers[idx].steal() {
            return Some(task);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::scheduler::local_queue::LocalQueue;
    use crate::runtime::scheduler::worker::WorkerShared;
    use crate::types::{Core, TaskId};

    fn cell(home: &Arc<WorkerShared>) -> Arc<TaskCell> {
        TaskCell::new(TaskId::next(), Box::pin(async {}), Arc::clone(home))
    }

    #[test]
    fn steals_from_the_only_busy_queue() {
        let home = WorkerShared::new(Core::new(0));
        let empty_a = LocalQueue::new();
        let empty_b = LocalQueue::new();
        let busy = LocalQueue::new();
        busy.push(cell(&home));

        let stealers = vec![empty_a.stealer(), empty_b.stealer(), busy.stealer()];
        let mut rng = DetRng::new(42);
        assert!(steal_task(&stealers, &mut rng).is_some());
        assert!(busy.is_empty());
    }

    #[test]
    fn empty_queues_yield_nothing() {
        let queue = LocalQueue::new();
        let stealers = vec![queue.stealer()];
        let mut rng = DetRng::new(42);
        assert!(steal_task(&stealers, &mut rng).is_none());
    }

    #[test]
    fn no_stealers_yields_nothing() {
        let stealers: Vec<Stealer> = Vec::new();
        let mut rng = DetRng::new(42);
        assert!(steal_task(&stealers, &mut rng).is_none());
    }
}
