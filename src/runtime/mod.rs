//! The runtime: one worker thread per core over a shared fabric.
//!
//! [`Runtime::new`] validates the configuration and builds the cluster:
//! arenas, fabric, message pools, and one [`Cx`] per core.
//! [`Runtime::run`] spawns the root task on core 0, starts every worker,
//! and blocks the calling thread until the root task's output arrives;
//! shutdown then stops the workers and joins their threads.
//!
//! Tasks left incomplete when the root task finishes are dropped at
//! shutdown, as are unfreed global allocations.

pub mod cx;
pub mod scheduler;
pub mod task;

pub use cx::Cx;
pub use task::JoinHandle;

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::RuntimeConfig;
use crate::error::ConfigError;
use crate::heap::HeapSpace;
use crate::message::MessagePool;
use crate::runtime::scheduler::worker::Worker;
use crate::runtime::scheduler::{Stealer, WorkerShared};
use crate::transport::{FabricStats, InProcessFabric, Transport};
use crate::types::Core;

/// A running cluster of cooperative workers.
pub struct Runtime {
    config: RuntimeConfig,
    space: Arc<HeapSpace>,
    fabric: Arc<InProcessFabric>,
    workers: Vec<Arc<WorkerShared>>,
    stealers: Vec<Stealer>,
    cxs: Vec<Cx>,
    shutdown: Arc<AtomicBool>,
}

impl Runtime {
    /// Validates `config` and builds the cluster.
    pub fn new(config: RuntimeConfig) -> Result<Self, ConfigError> {
        let layout = config.validate()?;
        let space = Arc::new(HeapSpace::new(
            layout,
            config.heap_per_core,
            config.symmetric_heap,
        ));
        let fabric = Arc::new(InProcessFabric::new(space.heaps().to_vec()));

        let workers: Vec<Arc<WorkerShared>> = (0..config.cores)
            .map(|i| WorkerShared::new(Core::new(i)))
            .collect();
        for worker in &workers {
            fabric.register_parker(worker.core(), worker.parker.clone());
        }
        let stealers: Vec<Stealer> = workers.iter().map(|w| w.stealer()).collect();

        let transport: Arc<dyn Transport> = Arc::clone(&fabric) as Arc<dyn Transport>;
        let cxs: Vec<Cx> = workers
            .iter()
            .map(|worker| {
                let pool = Arc::new(MessagePool::new(
                    worker.core(),
                    config.pool_capacity as u64,
                    config.inline_payload_max,
                    Arc::clone(&transport),
                ));
                Cx::new(
                    Arc::clone(worker),
                    Arc::clone(&space),
                    Arc::clone(&fabric),
                    pool,
                )
            })
            .collect();

        tracing::debug!(
            cores = config.cores,
            heap_per_core = config.heap_per_core,
            block_size = config.block_size,
            "cluster built",
        );
        Ok(Self {
            config,
            space,
            fabric,
            workers,
            stealers,
            cxs,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Number of cores in the cluster.
    #[must_use]
    pub fn cores(&self) -> u32 {
        self.config.cores
    }

    /// The configuration this runtime was built from.
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// The cluster's global memory.
    #[must_use]
    pub fn space(&self) -> &Arc<HeapSpace> {
        &self.space
    }

    /// The fabric connecting the workers.
    #[must_use]
    pub fn fabric(&self) -> &Arc<InProcessFabric> {
        &self.fabric
    }

    /// Fabric delivery counters.
    #[must_use]
    pub fn stats(&self) -> &FabricStats {
        self.fabric.stats()
    }

    /// Runs `root` as a task on core 0 and returns its output.
    ///
    /// Blocks the calling thread until the root task completes, then shuts
    /// the workers down and joins their threads.
    ///
    /// # Panics
    ///
    /// Panics if a worker thread cannot be spawned. A panic inside any
    /// task aborts the process.
    pub fn run<F, Fut, T>(&mut self, root: F) -> T
    where
        F: FnOnce(Cx) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.shutdown.store(false, Ordering::SeqCst);
        let (result_tx, result_rx) = std::sync::mpsc::channel();

        let root_cx = self.cxs[0].clone();
        let future = root(root_cx.clone());
        let _root_task = root_cx.spawn(async move {
            let output = future.await;
            let _ = result_tx.send(output);
        });

        let park_timeout = Duration::from_micros(self.config.park_timeout_us);
        let mut handles = Vec::with_capacity(self.cxs.len());
        for (index, cx) in self.cxs.iter().enumerate() {
            let stealers: Vec<Stealer> = self
                .stealers
                .iter()
                .enumerate()
                .filter(|&(victim, _)| victim != index)
                .map(|(_, s)| s.clone())
                .collect();
            let worker = Worker::new(
                cx.clone(),
                stealers,
                Arc::clone(&self.shutdown),
                self.config.work_stealing,
                park_timeout,
            );
            let thread = std::thread::Builder::new()
                .name(format!("farspace-worker-{index}"))
                .spawn(move || worker.run());
            match thread {
                Ok(handle) => handles.push(handle),
                Err(e) => panic!("failed to spawn worker thread {index}: {e}"),
            }
        }

        let result = result_rx.recv();

        self.shutdown.store(true, Ordering::SeqCst);
        for worker in &self.workers {
            worker.parker.unpark();
        }
        for handle in handles {
            if handle.join().is_err() {
                // Unreachable in practice: worker panics abort the process.
                tracing::error!("worker thread terminated abnormally");
            }
        }

        match result {
            Ok(output) => output,
            Err(_) => panic!("root task terminated without producing a result"),
        }
    }
}

/// Yields the calling task back to its worker once.
#[must_use]
pub fn yield_now() -> YieldNow {
    YieldNow { yielded: false }
}

/// Future returned by [`yield_now`].
#[derive(Debug)]
pub struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<()> {
        if self.yielded {
            std::task::Poll::Ready(())
        } else {
            self.yielded = true;
            cx.waker().wake_by_ref();
            std::task::Poll::Pending
        }
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("cores", &self.config.cores)
            .finish_non_exhaustive()
    }
}
