//! Counting semaphore with suspending decrement.
//!
//! The value is a non-negative integer. `increment(n)` adds n and wakes
//! blocked decrementers; `decrement(n)` suspends the calling task until the
//! value can drop by n without going negative; `try_decrement(n)` is the
//! non-blocking variant. Fairness is best-effort: woken waiters re-poll and
//! may be overtaken, as with the other waiter-queue primitives.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::task::{Context, Poll, Waker};

#[derive(Debug)]
struct Waiter {
    id: u64,
    waker: Waker,
}

#[derive(Debug)]
struct SemState {
    value: u64,
    waiters: Vec<Waiter>,
    next_waiter_id: u64,
}

/// A counting semaphore.
#[derive(Debug)]
pub struct Semaphore {
    state: Mutex<SemState>,
}

impl Semaphore {
    /// Creates a semaphore with the given initial value.
    #[must_use]
    pub fn new(value: u64) -> Self {
        Self {
            state: Mutex::new(SemState {
                value,
                waiters: Vec::new(),
                next_waiter_id: 0,
            }),
        }
    }

    /// Current value.
    #[must_use]
    pub fn value(&self) -> u64 {
        self.state.lock().expect("semaphore lock poisoned").value
    }

    /// Adds `n` to the value and wakes blocked decrementers.
    pub fn increment(&self, n: u64) {
        let mut state = self.state.lock().expect("semaphore lock poisoned");
        state.value += n;
        for waiter in &state.waiters {
            waiter.waker.wake_by_ref();
        }
    }

    /// Suspends until the value can drop by `n` without going negative.
    pub fn decrement(&self, n: u64) -> DecrementFuture<'_> {
        DecrementFuture {
            semaphore: self,
            n,
            waiter_id: None,
        }
    }

    /// Attempts to drop the value by `n` without suspending.
    ///
    /// Returns true on success.
    pub fn try_decrement(&self, n: u64) -> bool {
        let mut state = self.state.lock().expect("semaphore lock poisoned");
        if state.value >= n {
            state.value -= n;
            true
        } else {
            false
        }
    }
}

/// Future returned by [`Semaphore::decrement`].
pub struct DecrementFuture<'a> {
    semaphore: &'a Semaphore,
    n: u64,
    waiter_id: Option<u64>,
}

impl Drop for DecrementFuture<'_> {
    fn drop(&mut self) {
        if let Some(id) = self.waiter_id {
            let mut state = self.semaphore.state.lock().expect("semaphore lock poisoned");
            state.waiters.retain(|w| w.id != id);
        }
    }
}

impl Future for DecrementFuture<'_> {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let n = self.n;
        let mut state = self.semaphore.state.lock().expect("semaphore lock poisoned");
        if state.value >= n {
            state.value -= n;
            if let Some(id) = self.waiter_id.take() {
                state.waiters.retain(|w| w.id != id);
            }
            return Poll::Ready(());
        }

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
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{init_test_logging, poll_once};

    #[test]
    fn try_decrement_succeeds_within_value() {
        init_test_logging();
        let sem = Semaphore::new(2);
        assert!(sem.try_decrement(2));
        assert!(!sem.try_decrement(1));
        assert_eq!(sem.value(), 0);
    }

    #[test]
    fn decrement_blocks_until_increment() {
        init_test_logging();
        let sem = Semaphore::new(0);
        let mut dec = sem.decrement(2);
        assert!(poll_once(&mut dec).is_none());

        sem.increment(1);
        assert!(poll_once(&mut dec).is_none());

        sem.increment(1);
        assert_eq!(poll_once(&mut dec), Some(()));
        assert_eq!(sem.value(), 0);
    }

    #[test]
    fn increment_wakes_multiple_waiters() {
        init_test_logging();
        let sem = Semaphore::new(0);
        let mut a = sem.decrement(1);
        let mut b = sem.decrement(1);
        assert!(poll_once(&mut a).is_none());
        assert!(poll_once(&mut b).is_none());

        sem.increment(2);
        assert_eq!(poll_once(&mut a), Some(()));
        assert_eq!(poll_once(&mut b), Some(()));
    }

    #[test]
    fn dropping_blocked_decrement_removes_waiter() {
        init_test_logging();
        let sem = Semaphore::new(0);
        let mut dec = sem.decrement(1);
        assert!(poll_once(&mut dec).is_none());
        drop(dec);
        assert_eq!(sem.state.lock().unwrap().waiters.len(), 0);
    }
}
