//! Message fabric between cores.
//!
//! [`Transport`] is the seam between the messaging layer and whatever
//! carries frames from core to core. The shipped fabric,
//! [`inmem::InProcessFabric`], moves frames between worker threads of one
//! process; a networked fabric would implement the same trait with frames
//! serialized as named computations instead of boxed closures.
//!
//! Delivery contract: per ordered pair of cores, frames arrive in send
//! order and each frame is delivered exactly once. No ordering is implied
//! across different pairs.

pub mod inmem;

pub use inmem::InProcessFabric;

use std::sync::atomic::{AtomicU64, Ordering};

use crate::message::Frame;
use crate::types::Core;

/// A fabric that carries frames and bulk bytes between cores.
pub trait Transport: Send + Sync {
    /// Queues a frame for delivery to `dest`. Never blocks; backpressure
    /// lives in the message pool, not here.
    fn send(&self, dest: Core, frame: Frame);

    /// Copies `bytes` into `dest`'s arena at `offset`, atomically with
    /// respect to handlers running on `dest`.
    fn bulk_put(&self, dest: Core, offset: u64, bytes: &[u8]);

    /// Copies `len` bytes out of `src`'s arena at `offset`, atomically with
    /// respect to handlers running on `src`.
    fn bulk_get(&self, src: Core, offset: u64, len: usize) -> Vec<u8>;

    /// Blocks the calling worker thread until every core has arrived.
    ///
    /// Only for runtime startup and shutdown; tasks must never call this.
    fn barrier(&self);

    /// All-reduce: sums `value` across every core, returning the total to
    /// each. Blocks the worker thread like [`Transport::barrier`].
    fn reduce_sum(&self, value: u64) -> u64;

    /// Delivery counters.
    fn stats(&self) -> &FabricStats;
}

/// Monotonic counters maintained by a fabric.
#[derive(Debug, Default)]
pub struct FabricStats {
    frames_sent: AtomicU64,
    frames_delivered: AtomicU64,
    bulk_puts: AtomicU64,
    bulk_gets: AtomicU64,
}

impl FabricStats {
    pub(crate) fn record_send(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivery(&self) {
        self.frames_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_bulk_put(&self) {
        self.bulk_puts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_bulk_get(&self) {
        self.bulk_gets.fetch_add(1, Ordering::Relaxed);
    }

    /// Frames accepted for delivery.
    #[must_use]
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::Relaxed)
    }

    /// Frames placed in a destination inbox.
    #[must_use]
    pub fn frames_delivered(&self) -> u64 {
        self.frames_delivered.load(Ordering::Relaxed)
    }

    /// Bulk writes performed.
    #[must_use]
    pub fn bulk_puts(&self) -> u64 {
        self.bulk_puts.load(Ordering::Relaxed)
    }

    /// Bulk reads performed.
    #[must_use]
    pub fn bulk_gets(&self) -> u64 {
        self.bulk_gets.load(Ordering::Relaxed)
    }
}
