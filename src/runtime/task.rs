//! Task cells and join handles.
//!
//! A task is a boxed future plus its scheduling state. The cell doubles as
//! the task's waker: waking re-queues the cell on its home worker. The
//! `queued` flag deduplicates concurrent wakes so a task sits in a queue at
//! most once; a wake that races with an in-progress poll results in one
//! extra (harmless) poll rather than a lost wakeup.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::Wake;

use crate::runtime::scheduler::worker::WorkerShared;
use crate::sync::FullEmpty;
use crate::types::TaskId;

pub(crate) type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// A spawned task: its future, scheduling state, and home worker.
pub(crate) struct TaskCell {
    id: TaskId,
    /// `None` once the future has completed.
    future: Mutex<Option<BoxFuture>>,
    /// True while the cell sits in a run queue.
    queued: AtomicBool,
    home: Arc<WorkerShared>,
}

impl TaskCell {
    pub(crate) fn new(id: TaskId, future: BoxFuture, home: Arc<WorkerShared>) -> Arc<Self> {
        Arc::new(Self {
            id,
            future: Mutex::new(Some(future)),
            queued: AtomicBool::new(false),
            home,
        })
    }

    pub(crate) fn id(&self) -> TaskId {
        self.id
    }

    /// Queues the cell on its home worker unless it is already queued.
    pub(crate) fn schedule(self: &Arc<Self>) {
        if !self.queued.swap(true, Ordering::AcqRel) {
            self.home.queue.push(Arc::clone(self));
            self.home.parker.unpark();
        }
    }

    /// Polls the task's future once.
    ///
    /// The future lock is held for the whole poll, so a steal or a
    /// duplicate wake that reaches a cell mid-poll waits and then re-polls
    /// instead of polling concurrently.
    pub(crate) fn run(self: &Arc<Self>) {
        self.queued.store(false, Ordering::Release);
        let mut slot = self.future.lock().expect("task future lock poisoned");
        let Some(future) = slot.as_mut() else {
            return;
        };
        let waker = std::task::Waker::from(Arc::clone(self));
        let mut cx = std::task::Context::from_waker(&waker);
        match future.as_mut().poll(&mut cx) {
            std::task::Poll::Ready(()) => {
                tracing::trace!(task = ?self.id, "task completed");
                *slot = None;
            }
            std::task::Poll::Pending => {}
        }
    }
}

impl Wake for TaskCell {
    fn wake(self: Arc<Self>) {
        self.schedule();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.schedule();
    }
}

impl std::fmt::Debug for TaskCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskCell")
            .field("id", &self.id)
            .field("queued", &self.queued.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Handle to a spawned task's result.
///
/// Dropping the handle detaches the task; it keeps running.
#[derive(Debug)]
pub struct JoinHandle<T> {
    id: TaskId,
    result: Arc<FullEmpty<T>>,
}

impl<T: Send + 'static> JoinHandle<T> {
    pub(crate) fn new(id: TaskId, result: Arc<FullEmpty<T>>) -> Self {
        Self { id, result }
    }

    /// The spawned task's id.
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Suspends until the task completes, yielding its output.
    pub async fn join(self) -> T {
        self.result.read_fe().await
    }
}
