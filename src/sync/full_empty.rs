//! Full/empty cell: a single-slot future/promise with full-bit semantics.
//!
//! A [`FullEmpty`] holds one value of type `T` plus a state bit: Empty (no
//! valid value) or Full. Operations name the state they require before and
//! after: `read_ff` waits for Full and leaves Full, `read_fe` waits for Full
//! and empties the cell, `write_ef` waits for Empty, `write_xf` requires
//! nothing and overwrites. Blocking operations suspend the calling task;
//! they never spin and never block the worker thread.
//!
//! The cell is the completion vehicle for one-sided operations: a delegate
//! request carries a reference to a local cell, and the reply handler fills
//! it, waking the suspended requester.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::task::{Context, Poll, Waker};

/// Which cell state a suspended operation is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitKind {
    Full,
    Empty,
}

#[derive(Debug)]
struct Waiter {
    id: u64,
    kind: WaitKind,
    waker: Waker,
}

#[derive(Debug)]
struct FeState<T> {
    value: Option<T>,
    waiters: Vec<Waiter>,
    next_waiter_id: u64,
}

impl<T> FeState<T> {
    fn wake_kind(&mut self, kind: WaitKind) {
        for waiter in &self.waiters {
            if waiter.kind == kind {
                waiter.waker.wake_by_ref();
            }
        }
    }

    fn upsert_waiter(&mut self, id: u64, kind: WaitKind, waker: &Waker) {
        if let Some(existing) = self.waiters.iter_mut().find(|w| w.id == id) {
            existing.waker = waker.clone();
            existing.kind = kind;
        } else {
            self.waiters.push(Waiter {
                id,
                kind,
                waker: waker.clone(),
            });
        }
    }

    fn remove_waiter(&mut self, id: u64) {
        self.waiters.retain(|w| w.id != id);
    }
}

/// A synchronization cell with full/empty state.
#[derive(Debug)]
pub struct FullEmpty<T> {
    state: Mutex<FeState<T>>,
}

impl<T> FullEmpty<T> {
    /// Creates an empty cell.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FeState {
                value: None,
                waiters: Vec::new(),
                next_waiter_id: 0,
            }),
        }
    }

    /// Creates a cell already holding `value`.
    #[must_use]
    pub fn full(value: T) -> Self {
        let cell = Self::new();
        cell.state.lock().expect("fullempty lock poisoned").value = Some(value);
        cell
    }

    /// Returns true if the cell currently holds a value.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.state
            .lock()
            .expect("fullempty lock poisoned")
            .value
            .is_some()
    }

    /// Writes unconditionally: Empty or Full becomes Full. Never suspends;
    /// overwrites any present value and wakes tasks waiting for Full.
    pub fn write_xf(&self, value: T) {
        let mut state = self.state.lock().expect("fullempty lock poisoned");
        state.value = Some(value);
        state.wake_kind(WaitKind::Full);
    }

    /// Suspends until the cell is Empty, then fills it.
    pub fn write_ef(&self, value: T) -> WriteEf<'_, T> {
        WriteEf {
            cell: self,
            value: Some(value),
            waiter_id: None,
        }
    }

    /// Suspends until the cell is Full, then overwrites it, staying Full.
    pub fn write_ff(&self, value: T) -> WriteFf<'_, T> {
        WriteFf {
            cell: self,
            value: Some(value),
            waiter_id: None,
        }
    }

    /// Suspends until the cell is Full, then takes the value, leaving Empty
    /// and waking tasks waiting for Empty.
    pub fn read_fe(&self) -> ReadFe<'_, T> {
        ReadFe {
            cell: self,
            waiter_id: None,
        }
    }

    /// Unconditionally forces the cell Empty.
    ///
    /// # Hazard
    ///
    /// Any tasks still suspended on this cell have their expectation of a
    /// future fill silently discarded: they stay parked until some later
    /// write. Calling `reset` with live waiters is a usage error — the
    /// caller is responsible for quiescing the cell first. Debug builds
    /// assert on it.
    pub fn reset(&self) {
        let mut state = self.state.lock().expect("fullempty lock poisoned");
        debug_assert!(
            state.waiters.is_empty(),
            "FullEmpty::reset with {} live waiters",
            state.waiters.len()
        );
        state.value = None;
        state.waiters.clear();
    }
}

impl<T: Clone> FullEmpty<T> {
    /// Suspends until the cell is Full, returns a copy, stays Full.
    pub fn read_ff(&self) -> ReadFf<'_, T> {
        ReadFf {
            cell: self,
            waiter_id: None,
        }
    }

    /// Returns the current value without suspending or signaling: `None`
    /// when Empty. No state transition.
    #[must_use]
    pub fn read_xx(&self) -> Option<T> {
        self.state
            .lock()
            .expect("fullempty lock poisoned")
            .value
            .clone()
    }
}

impl<T> Default for FullEmpty<T> {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! fe_future_boilerplate {
    ($name:ident) => {
        // No self-references; safe to poll through Pin::get_mut even when
        // T itself is not Unpin.
        impl<T> Unpin for $name<'_, T> {}

        impl<T> Drop for $name<'_, T> {
            fn drop(&mut self) {
                if let Some(id) = self.waiter_id {
                    self.cell
                        .state
                        .lock()
                        .expect("fullempty lock poisoned")
                        .remove_waiter(id);
                }
            }
        }
    };
}

fn claim_waiter_id<T>(state: &mut FeState<T>, slot: &mut Option<u64>) -> u64 {
    if let Some(id) = *slot {
        id
    } else {
        let id = state.next_waiter_id;
        state.next_waiter_id = state.next_waiter_id.wrapping_add(1);
        *slot = Some(id);
        id
    }
}

/// Future returned by [`FullEmpty::write_ef`].
pub struct WriteEf<'a, T> {
    cell: &'a FullEmpty<T>,
    value: Option<T>,
    waiter_id: Option<u64>,
}

fe_future_boilerplate!(WriteEf);

impl<T> Future for WriteEf<'_, T> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        let mut state = this.cell.state.lock().expect("fullempty lock poisoned");
        if state.value.is_none() {
            state.value = this.value.take();
            if let Some(id) = this.waiter_id.take() {
                state.remove_waiter(id);
            }
            state.wake_kind(WaitKind::Full);
            return Poll::Ready(());
        }
        let id = claim_waiter_id(&mut state, &mut this.waiter_id);
        state.upsert_waiter(id, WaitKind::Empty, cx.waker());
        Poll::Pending
    }
}

/// Future returned by [`FullEmpty::write_ff`].
pub struct WriteFf<'a, T> {
    cell: &'a FullEmpty<T>,
    value: Option<T>,
    waiter_id: Option<u64>,
}

fe_future_boilerplate!(WriteFf);

impl<T> Future for WriteFf<'_, T> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        let mut state = this.cell.state.lock().expect("fullempty lock poisoned");
        if state.value.is_some() {
            state.value = this.value.take();
            if let Some(id) = this.waiter_id.take() {
                state.remove_waiter(id);
            }
            state.wake_kind(WaitKind::Full);
            return Poll::Ready(());
        }
        let id = claim_waiter_id(&mut state, &mut this.waiter_id);
        state.upsert_waiter(id, WaitKind::Full, cx.waker());
        Poll::Pending
    }
}

/// Future returned by [`FullEmpty::read_ff`].
pub struct ReadFf<'a, T> {
    cell: &'a FullEmpty<T>,
    waiter_id: Option<u64>,
}

fe_future_boilerplate!(ReadFf);

impl<T: Clone> Future for ReadFf<'_, T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let this = self.get_mut();
        let mut state = this.cell.state.lock().expect("fullempty lock poisoned");
        if let Some(value) = state.value.clone() {
            if let Some(id) = this.waiter_id.take() {
                state.remove_waiter(id);
            }
            return Poll::Ready(value);
        }
        let id = claim_waiter_id(&mut state, &mut this.waiter_id);
        state.upsert_waiter(id, WaitKind::Full, cx.waker());
        Poll::Pending
    }
}

/// Future returned by [`FullEmpty::read_fe`].
pub struct ReadFe<'a, T> {
    cell: &'a FullEmpty<T>,
    waiter_id: Option<u64>,
}

fe_future_boilerplate!(ReadFe);

impl<T> Future for ReadFe<'_, T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let this = self.get_mut();
        let mut state = this.cell.state.lock().expect("fullempty lock poisoned");
        if let Some(value) = state.value.take() {
            if let Some(id) = this.waiter_id.take() {
                state.remove_waiter(id);
            }
            state.wake_kind(WaitKind::Empty);
            return Poll::Ready(value);
        }
        let id = claim_waiter_id(&mut state, &mut this.waiter_id);
        state.upsert_waiter(id, WaitKind::Full, cx.waker());
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{init_test_logging, poll_once};

    #[test]
    fn read_ff_blocks_until_write() {
        init_test_logging();
        let cell = FullEmpty::<u32>::new();
        let mut read = cell.read_ff();
        assert!(poll_once(&mut read).is_none());

        cell.write_xf(7);
        assert_eq!(poll_once(&mut read), Some(7));
        assert!(cell.is_full());
    }

    #[test]
    fn read_fe_empties_the_cell() {
        init_test_logging();
        let cell = FullEmpty::full(11u32);
        let mut read = cell.read_fe();
        assert_eq!(poll_once(&mut read), Some(11));
        assert!(!cell.is_full());
        assert_eq!(cell.read_xx(), None);
    }

    #[test]
    fn write_ef_blocks_while_full() {
        init_test_logging();
        let cell = FullEmpty::full(1u32);
        let mut write = cell.write_ef(2);
        assert!(poll_once(&mut write).is_none());

        // Emptying the cell lets the writer through.
        let mut read = cell.read_fe();
        assert_eq!(poll_once(&mut read), Some(1));
        assert_eq!(poll_once(&mut write), Some(()));
        assert_eq!(cell.read_xx(), Some(2));
    }

    #[test]
    fn write_ff_overwrites_only_when_full() {
        init_test_logging();
        let cell = FullEmpty::<u32>::new();
        let mut write = cell.write_ff(9);
        assert!(poll_once(&mut write).is_none());

        cell.write_xf(1);
        assert_eq!(poll_once(&mut write), Some(()));
        assert_eq!(cell.read_xx(), Some(9));
    }

    #[test]
    fn write_xf_never_blocks_and_overwrites() {
        init_test_logging();
        let cell = FullEmpty::full(1u32);
        cell.write_xf(2);
        assert_eq!(cell.read_xx(), Some(2));
    }

    #[test]
    fn read_xx_has_no_signaling_effect() {
        init_test_logging();
        let cell = FullEmpty::full(5u32);
        assert_eq!(cell.read_xx(), Some(5));
        assert!(cell.is_full());
    }

    #[test]
    fn reset_forces_empty() {
        init_test_logging();
        let cell = FullEmpty::full(3u32);
        cell.reset();
        assert!(!cell.is_full());
    }

    #[test]
    fn dropping_a_blocked_read_removes_its_waiter() {
        init_test_logging();
        let cell = FullEmpty::<u32>::new();
        let mut read = cell.read_ff();
        assert!(poll_once(&mut read).is_none());
        drop(read);
        let waiters = cell.state.lock().unwrap().waiters.len();
        assert_eq!(waiters, 0);
    }

    #[test]
    fn filled_cell_wakes_full_waiters_not_empty_waiters() {
        init_test_logging();
        let cell = FullEmpty::<u32>::new();
        let mut read = cell.read_ff();
        assert!(poll_once(&mut read).is_none());

        cell.write_xf(1);
        // The registered Full waiter was woken; a fresh poll completes.
        assert_eq!(poll_once(&mut read), Some(1));
    }
}
