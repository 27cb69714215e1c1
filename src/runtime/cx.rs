//! Per-core capability context.
//!
//! A [`Cx`] bundles everything a task running on a core may touch: the
//! core's identity, the address layout, its arena, its message pool, the
//! fabric, and the spawn path onto the core's scheduler. Tasks receive a
//! `Cx` at spawn and thread it through explicitly; there is no thread-local
//! ambient state.
//!
//! `Cx` is a cheap clone (one `Arc`). A task stolen by another worker keeps
//! the `Cx` of its home core: locality is a property of the task, not of
//! the thread that happens to poll it.

use std::future::Future;
use std::sync::Arc;

use crate::addr::{AddressLayout, GlobalPtr};
use crate::codec::Plain;
use crate::error::AllocError;
use crate::heap::{CoreHeap, HeapSpace, SymmetricPtr};
use crate::message::MessagePool;
use crate::runtime::scheduler::WorkerShared;
use crate::runtime::task::{JoinHandle, TaskCell};
use crate::sync::FullEmpty;
use crate::transport::{InProcessFabric, Transport};
use crate::types::{Core, TaskId};

struct CxInner {
    core: Core,
    layout: AddressLayout,
    worker: Arc<WorkerShared>,
    space: Arc<HeapSpace>,
    heap: Arc<CoreHeap>,
    fabric: Arc<InProcessFabric>,
    transport: Arc<dyn Transport>,
    pool: Arc<MessagePool>,
}

/// Capability context for one core.
#[derive(Clone)]
pub struct Cx {
    inner: Arc<CxInner>,
}

impl Cx {
    pub(crate) fn new(
        worker: Arc<WorkerShared>,
        space: Arc<HeapSpace>,
        fabric: Arc<InProcessFabric>,
        pool: Arc<MessagePool>,
    ) -> Self {
        let core = worker.core();
        let layout = *space.layout();
        let heap = Arc::clone(space.core_heap(core));
        let transport: Arc<dyn Transport> = Arc::clone(&fabric) as Arc<dyn Transport>;
        Self {
            inner: Arc::new(CxInner {
                core,
                layout,
                worker,
                space,
                heap,
                fabric,
                transport,
                pool,
            }),
        }
    }

    /// The core this context belongs to.
    #[must_use]
    pub fn core(&self) -> Core {
        self.inner.core
    }

    /// Total cores in the cluster.
    #[must_use]
    pub fn cores(&self) -> u32 {
        self.inner.layout.cores()
    }

    /// The cluster's address layout.
    #[must_use]
    pub fn layout(&self) -> AddressLayout {
        self.inner.layout
    }

    /// This core's message pool.
    #[must_use]
    pub fn pool(&self) -> &Arc<MessagePool> {
        &self.inner.pool
    }

    /// The cluster's global memory.
    #[must_use]
    pub fn space(&self) -> &Arc<HeapSpace> {
        &self.inner.space
    }

    pub(crate) fn worker(&self) -> &Arc<WorkerShared> {
        &self.inner.worker
    }

    pub(crate) fn fabric(&self) -> &InProcessFabric {
        &self.inner.fabric
    }

    pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
        &self.inner.transport
    }

    pub(crate) fn local_heap(&self) -> &Arc<CoreHeap> {
        &self.inner.heap
    }

    /// Allocates `n` elements of `T` from the block-cyclic linear heap.
    pub fn global_alloc<T: Plain>(&self, n: u64) -> Result<GlobalPtr<T>, AllocError> {
        self.inner.space.alloc_linear(n)
    }

    /// Frees a linear allocation.
    pub fn global_free<T: Plain>(&self, ptr: GlobalPtr<T>, n: u64) -> Result<(), AllocError> {
        self.inner.space.free_linear(ptr, n)
    }

    /// Allocates one `T` at the same offset on every core.
    pub fn symmetric_alloc<T: Plain>(&self) -> Result<SymmetricPtr<T>, AllocError> {
        self.inner.space.alloc_symmetric()
    }

    /// Frees a symmetric allocation on every core.
    pub fn symmetric_free<T: Plain>(&self, ptr: SymmetricPtr<T>) -> Result<(), AllocError> {
        self.inner.space.free_symmetric(ptr)
    }

    /// Spawns a task on this context's core.
    ///
    /// The task starts on this core's run queue; an idle sibling may steal
    /// it, but anything it spawns in turn lands back here.
    pub fn spawn<F, T>(&self, future: F) -> JoinHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let id = TaskId::next();
        let result = Arc::new(FullEmpty::new());
        let completion = Arc::clone(&result);
        let wrapped = Box::pin(async move {
            let output = future.await;
            completion.write_xf(output);
        });
        let task = TaskCell::new(id, wrapped, Arc::clone(&self.inner.worker));
        tracing::trace!(core = %self.core(), task = ?id, "task spawned");
        task.schedule();
        JoinHandle::new(id, result)
    }
}

impl std::fmt::Debug for Cx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cx").field("core", &self.inner.core).finish()
    }
}
