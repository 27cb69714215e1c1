//! Global completion event: a cluster-wide countdown latch.
//!
//! A [`GlobalCompletionEvent`] replicates a counter per core (a *shard*).
//! Tasks enroll and complete against their own core's shard; remote parties
//! may complete against any core's shard by address (the delegate layer
//! routes those as active messages). The event is globally satisfied only
//! when *every* shard's count is zero — local completion alone never wakes
//! a waiter.
//!
//! The cross-core reduction is maintained incrementally: a `busy_shards`
//! counter tracks how many shards are nonzero. A shard leaving zero checks
//! out; a shard returning to zero checks in; the completion that checks in
//! the last busy shard wakes every waiter on every shard. This is the
//! running form of the sum-reduction the wait operation is specified as.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::task::{Context, Poll, Waker};

use crate::types::Core;

#[derive(Debug)]
struct Waiter {
    id: u64,
    waker: Waker,
}

#[derive(Debug)]
struct ShardState {
    count: i64,
    waiters: Vec<Waiter>,
    next_waiter_id: u64,
}

#[derive(Debug)]
struct Shard {
    state: Mutex<ShardState>,
}

impl Shard {
    fn new() -> Self {
        Self {
            state: Mutex::new(ShardState {
                count: 0,
                waiters: Vec::new(),
                next_waiter_id: 0,
            }),
        }
    }
}

/// A completion event spanning every core in the cluster.
#[derive(Debug)]
pub struct GlobalCompletionEvent {
    shards: Vec<Shard>,
    busy_shards: AtomicUsize,
}

impl GlobalCompletionEvent {
    /// Creates an event with one shard per core, all satisfied.
    #[must_use]
    pub fn new(cores: u32) -> Self {
        Self {
            shards: (0..cores).map(|_| Shard::new()).collect(),
            busy_shards: AtomicUsize::new(0),
        }
    }

    fn shard(&self, core: Core) -> &Shard {
        &self.shards[core.index()]
    }

    /// Adds `n` expected completions to `core`'s shard.
    pub fn enroll(&self, core: Core, n: u64) {
        if n == 0 {
            return;
        }
        let mut state = self.shard(core).state.lock().expect("gce lock poisoned");
        if state.count == 0 {
            // Shard leaves the quiescent set.
            self.busy_shards.fetch_add(1, Ordering::SeqCst);
        }
        state.count += n as i64;
    }

    /// Retires `n` completions from `core`'s shard. If this returns the
    /// last busy shard to zero, every waiter on every core wakes.
    pub fn complete(&self, core: Core, n: u64) {
        if n == 0 {
            return;
        }
        let became_quiescent = {
            let mut state = self.shard(core).state.lock().expect("gce lock poisoned");
            state.count -= n as i64;
            debug_assert!(state.count >= 0, "gce shard count went negative on {core}");
            state.count == 0
        };
        if became_quiescent && self.busy_shards.fetch_sub(1, Ordering::SeqCst) == 1 {
            tracing::trace!(core = %core, "global completion event satisfied");
            self.wake_all();
        }
    }

    /// True when every shard's count is zero.
    #[must_use]
    pub fn is_satisfied(&self) -> bool {
        self.busy_shards.load(Ordering::SeqCst) == 0
    }

    /// Outstanding count on one core's shard.
    #[must_use]
    pub fn local_count(&self, core: Core) -> i64 {
        self.shard(core)
            .state
            .lock()
            .expect("gce lock poisoned")
            .count
    }

    /// Suspends the calling task until the event is globally satisfied.
    ///
    /// The waiter parks on its own core's shard; the completion that
    /// satisfies the event wakes waiters on every shard.
    pub fn wait(&self, core: Core) -> GlobalWaitFuture<'_> {
        GlobalWaitFuture {
            event: self,
            core,
            waiter_id: None,
        }
    }

    fn wake_all(&self) {
        for shard in &self.shards {
            let mut state = shard.state.lock().expect("gce lock poisoned");
            for waiter in state.waiters.drain(..) {
                waiter.waker.wake();
            }
        }
    }
}

/// Future returned by [`GlobalCompletionEvent::wait`].
pub struct GlobalWaitFuture<'a> {
    event: &'a GlobalCompletionEvent,
    core: Core,
    waiter_id: Option<u64>,
}

impl Drop for GlobalWaitFuture<'_> {
    fn drop(&mut self) {
        if let Some(id) = self.waiter_id {
            let mut state = self
                .event
                .shard(self.core)
                .state
                .lock()
                .expect("gce lock poisoned");
            state.waiters.retain(|w| w.id != id);
        }
    }
}

impl Future for GlobalWaitFuture<'_> {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let core = self.core;
        let mut state = self
            .event
            .shard(core)
            .state
            .lock()
            .expect("gce lock poisoned");

        // Register first, then check: the satisfying completion sets
        // busy_shards to zero before draining waiters, so a waiter that
        // registers late either sees zero here or is drained there.
        let id = if let Some(id) = self.waiter_id {
            id
        } else {
            let id = state.next_waiter_id;
            state.next_waiter_id = state.next_waiter_id.wrapping_add(1);
            self.waiter_id = Some(id);
            id
        };
        if let Some(existing) = state.waiters.iter_mut().find(|w| w.id == id) {
            existing.waker = cx.waker().clone();
        } else {
            state.waiters.push(Waiter {
                id,
                waker: cx.waker().clone(),
            });
        }

        if self.event.is_satisfied() {
            if let Some(id) = self.waiter_id.take() {
                state.waiters.retain(|w| w.id != id);
            }
            return Poll::Ready(());
        }
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{init_test_logging, poll_once};

    #[test]
    fn fresh_event_is_satisfied() {
        init_test_logging();
        let gce = GlobalCompletionEvent::new(4);
        assert!(gce.is_satisfied());
        let mut wait = gce.wait(Core::new(0));
        assert_eq!(poll_once(&mut wait), Some(()));
    }

    #[test]
    fn local_completion_alone_does_not_satisfy() {
        init_test_logging();
        let gce = GlobalCompletionEvent::new(2);
        gce.enroll(Core::new(0), 1);
        gce.enroll(Core::new(1), 1);

        let mut wait = gce.wait(Core::new(0));
        assert!(poll_once(&mut wait).is_none());

        gce.complete(Core::new(0), 1);
        // Core 0's shard is quiescent but core 1's is not.
        assert!(poll_once(&mut wait).is_none());

        gce.complete(Core::new(1), 1);
        assert_eq!(poll_once(&mut wait), Some(()));
    }

    #[test]
    fn waiters_on_every_core_wake_together() {
        init_test_logging();
        let gce = GlobalCompletionEvent::new(2);
        gce.enroll(Core::new(1), 2);

        let mut on_zero = gce.wait(Core::new(0));
        let mut on_one = gce.wait(Core::new(1));
        assert!(poll_once(&mut on_zero).is_none());
        assert!(poll_once(&mut on_one).is_none());

        gce.complete(Core::new(1), 2);
        assert_eq!(poll_once(&mut on_zero), Some(()));
        assert_eq!(poll_once(&mut on_one), Some(()));
    }

    #[test]
    fn reuse_after_satisfaction() {
        init_test_logging();
        let gce = GlobalCompletionEvent::new(1);
        gce.enroll(Core::new(0), 1);
        gce.complete(Core::new(0), 1);
        assert!(gce.is_satisfied());

        gce.enroll(Core::new(0), 1);
        assert!(!gce.is_satisfied());
        gce.complete(Core::new(0), 1);
        assert!(gce.is_satisfied());
    }
}
