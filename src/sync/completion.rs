//! Completion event: a countdown latch for in-flight work.
//!
//! `enroll(n)` registers n units of expected work; `complete(n)` retires
//! them. The event is satisfied exactly when the count reaches zero, at
//! which point every task suspended in [`CompletionEvent::wait`] is woken.
//! Waiting on an event whose count is already zero returns immediately.
//!
//! Enrolling after the event has been observed satisfied is a usage error
//! caught only by debug assertion; callers serialize reuse themselves.

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
struct CeState {
    count: i64,
    waiters: Vec<Waiter>,
    next_waiter_id: u64,
}

/// A countdown latch over enrolled work units.
#[derive(Debug)]
pub struct CompletionEvent {
    state: Mutex<CeState>,
}

impl CompletionEvent {
    /// Creates an event with a count of zero (already satisfied).
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CeState {
                count: 0,
                waiters: Vec::new(),
                next_waiter_id: 0,
            }),
        }
    }

    /// Adds `n` units of expected work.
    pub fn enroll(&self, n: u64) {
        let mut state = self.state.lock().expect("completion lock poisoned");
        state.count += n as i64;
    }

    /// Retires `n` units; wakes all waiters when the count reaches zero.
    ///
    /// Completing more than was enrolled is a usage error (debug assert).
    pub fn complete(&self, n: u64) {
        let mut state = self.state.lock().expect("completion lock poisoned");
        state.count -= n as i64;
        debug_assert!(state.count >= 0, "completion count went negative");
        if state.count == 0 {
            for waiter in state.waiters.drain(..) {
                waiter.waker.wake();
            }
        }
    }

    /// Current outstanding count.
    #[must_use]
    pub fn count(&self) -> i64 {
        self.state.lock().expect("completion lock poisoned").count
    }

    /// Suspends the calling task until the count is zero.
    pub fn wait(&self) -> WaitFuture<'_> {
        WaitFuture {
            event: self,
            waiter_id: None,
        }
    }
}

impl Default for CompletionEvent {
    fn default() -> Self {
        Self::new()
    }
}

/// Future returned by [`CompletionEvent::wait`].
pub struct WaitFuture<'a> {
    event: &'a CompletionEvent,
    waiter_id: Option<u64>,
}

impl Drop for WaitFuture<'_> {
    fn drop(&mut self) {
        if let Some(id) = self.waiter_id {
            let mut state = self.event.state.lock().expect("completion lock poisoned");
            state.waiters.retain(|w| w.id != id);
        }
    }
}

impl Future for WaitFuture<'_> {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let mut state = self.event.state.lock().expect("completion lock poisoned");
        if state.count == 0 {
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
    fn wait_on_fresh_event_returns_immediately() {
        init_test_logging();
        let event = CompletionEvent::new();
        let mut wait = event.wait();
        assert_eq!(poll_once(&mut wait), Some(()));
    }

    #[test]
    fn wait_blocks_until_all_completions_arrive() {
        init_test_logging();
        let event = CompletionEvent::new();
        event.enroll(3);

        let mut wait = event.wait();
        assert!(poll_once(&mut wait).is_none());

        event.complete(1);
        assert!(poll_once(&mut wait).is_none());
        event.complete(1);
        assert!(poll_once(&mut wait).is_none());
        event.complete(1);
        assert_eq!(poll_once(&mut wait), Some(()));
    }

    #[test]
    fn interleaved_enroll_complete_satisfies_at_zero() {
        init_test_logging();
        let event = CompletionEvent::new();
        event.enroll(1);
        event.complete(1);
        event.enroll(2);
        let mut wait = event.wait();
        assert!(poll_once(&mut wait).is_none());
        event.complete(2);
        assert_eq!(poll_once(&mut wait), Some(()));
        assert_eq!(event.count(), 0);
    }

    #[test]
    fn multiple_waiters_all_wake() {
        init_test_logging();
        let event = CompletionEvent::new();
        event.enroll(1);
        let mut a = event.wait();
        let mut b = event.wait();
        assert!(poll_once(&mut a).is_none());
        assert!(poll_once(&mut b).is_none());
        event.complete(1);
        assert_eq!(poll_once(&mut a), Some(()));
        assert_eq!(poll_once(&mut b), Some(()));
    }

    #[test]
    fn dropping_a_waiter_removes_it() {
        init_test_logging();
        let event = CompletionEvent::new();
        event.enroll(1);
        let mut wait = event.wait();
        assert!(poll_once(&mut wait).is_none());
        drop(wait);
        assert_eq!(event.state.lock().unwrap().waiters.len(), 0);
    }
}
