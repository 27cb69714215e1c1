//! Worker threads: one per core.
//!
//! Each worker loops over three sources of work in priority order: frames
//! in its fabric inbox, tasks in its local run queue, then tasks stolen
//! from siblings. An idle worker parks with a timeout so a missed unpark
//! degrades to a short stall, never a deadlock.
//!
//! A panic on a worker aborts the whole process. A core that has lost a
//! task has lost state other cores may depend on; fail-stop is the only
//! honest answer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::runtime::cx::Cx;
use crate::runtime::scheduler::local_queue::{LocalQueue, Stealer};
use crate::runtime::scheduler::stealing::steal_task;
use crate::transport::Transport;
use crate::types::Core;
use crate::util::DetRng;

/// The parts of a worker visible to other threads: its run queue and the
/// parker that wakes it.
#[derive(Debug)]
pub struct WorkerShared {
    core: Core,
    pub(crate) queue: LocalQueue,
    pub(crate) parker: Parker,
}

impl WorkerShared {
    /// Creates the shared state for `core`'s worker.
    #[must_use]
    pub fn new(core: Core) -> Arc<Self> {
        Arc::new(Self {
            core,
            queue: LocalQueue::new(),
            parker: Parker::new(),
        })
    }

    /// The core this worker serves.
    #[must_use]
    pub fn core(&self) -> Core {
        self.core
    }

    /// A steal handle to this worker's queue.
    #[must_use]
    pub(crate) fn stealer(&self) -> Stealer {
        self.queue.stealer()
    }
}

/// Aborts the process if the worker thread unwinds.
struct AbortOnPanic;

impl Drop for AbortOnPanic {
    fn drop(&mut self) {
        if std::thread::panicking() {
            tracing::error!("worker panicked; cluster state is lost, aborting");
            std::process::abort();
        }
    }
}

/// One core's scheduler loop.
pub(crate) struct Worker {
    cx: Cx,
    stealers: Vec<Stealer>,
    shutdown: Arc<AtomicBool>,
    rng: DetRng,
    work_stealing: bool,
    park_timeout: Duration,
    frames_executed: u64,
}

impl Worker {
    pub(crate) fn new(
        cx: Cx,
        stealers: Vec<Stealer>,
        shutdown: Arc<AtomicBool>,
        work_stealing: bool,
        park_timeout: Duration,
    ) -> Self {
        let seed = 0x9e37_79b9_7f4a_7c15 ^ (cx.core().raw() as u64 + 1);
        Self {
            cx,
            stealers,
            shutdown,
            rng: DetRng::new(seed),
            work_stealing,
            park_timeout,
            frames_executed: 0,
        }
    }

    /// Runs until shutdown. Called on the worker's own thread.
    pub(crate) fn run(mut self) {
        let _abort_guard = AbortOnPanic;
        let core = self.cx.core();
        tracing::debug!(core = %core, "worker online");
        self.cx.fabric().barrier();

        loop {
            let drained = self.drain_inbox();
            if let Some(task) = self.cx.worker().queue.pop() {
                task.run();
                continue;
            }
            if drained {
                continue;
            }
            if self.shutdown.load(Ordering::Acquire) {
                break;
            }
            if self.work_stealing {
                if let Some(task) = steal_task(&self.stealers, &mut self.rng) {
                    tracing::trace!(core = %core, task = ?task.id(), "stole task");
                    task.run();
                    continue;
                }
            }
            self.cx.worker().parker.park_timeout(self.park_timeout);
        }

        // Final drain so acks already in flight settle their credits.
        self.drain_inbox();
        let total = self.cx.fabric().reduce_sum(self.frames_executed);
        if core.index() == 0 {
            tracing::debug!(total_frames = total, "cluster quiesced");
        }
        self.cx.fabric().barrier();
        tracing::debug!(core = %core, frames = self.frames_executed, "worker offline");
    }

    fn drain_inbox(&mut self) -> bool {
        let core = self.cx.core();
        let mut any = false;
        while let Some(frame) = self.cx.fabric().try_recv(core) {
            frame.execute(&self.cx);
            self.frames_executed += 1;
            any = true;
        }
        any
    }
}

/// Blocks and wakes a worker thread.
#[derive(Debug, Clone)]
pub struct Parker {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Parker {
    /// Creates a parker with no pending notification.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new((Mutex::new(false), Condvar::new())),
        }
    }

    /// Parks the current thread until notified or the timeout elapses.
    pub fn park_timeout(&self, duration: Duration) {
        let (lock, cvar) = &*self.inner;
        let mut notified = lock.lock().expect("parker lock poisoned");
        if !*notified {
            let (guard, _) = cvar
                .wait_timeout(notified, duration)
                .expect("parker lock poisoned");
            notified = guard;
        }
        *notified = false;
    }

    /// Wakes the parked thread, or makes the next park return immediately.
    pub fn unpark(&self) {
        let (lock, cvar) = &*self.inner;
        {
            let mut notified = lock.lock().expect("parker lock poisoned");
            *notified = true;
        }
        cvar.notify_one();
    }
}

impl Default for Parker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn unpark_before_park_returns_immediately() {
        let parker = Parker::new();
        parker.unpark();
        let start = Instant::now();
        parker.park_timeout(Duration::from_secs(5));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn park_timeout_elapses_without_unpark() {
        let parker = Parker::new();
        let start = Instant::now();
        parker.park_timeout(Duration::from_millis(20));
        assert!(start.elapsed() >= Duration::from_millis(10));
    }

    #[test]
    fn unpark_wakes_parked_thread() {
        let parker = Parker::new();
        let remote = parker.clone();
        let handle = std::thread::spawn(move || {
            remote.park_timeout(Duration::from_secs(10));
        });
        std::thread::sleep(Duration::from_millis(20));
        parker.unpark();
        handle.join().expect("thread");
    }
}
