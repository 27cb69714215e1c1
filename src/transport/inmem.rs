//! In-process fabric: one inbox per core, frames moved by reference.
//!
//! Frames queue on lock-free inboxes; delivery unparks the destination
//! worker. Collectives (barrier, reduce) rendezvous all worker threads and
//! are only used at runtime startup and shutdown.
//!
//! Tests can pause delivery to one core with [`InProcessFabric::hold_delivery`]
//! to make backpressure observable; held frames keep their send order when
//! released.

use std::sync::{Barrier, Condvar, Mutex};

use crossbeam_queue::SegQueue;

use crate::heap::CoreHeap;
use crate::message::Frame;
use crate::runtime::scheduler::Parker;
use crate::transport::{FabricStats, Transport};
use crate::types::Core;

#[derive(Debug)]
struct ReduceState {
    generation: u64,
    arrived: u32,
    sum: u64,
    result: u64,
}

/// A fabric connecting the worker threads of one process.
pub struct InProcessFabric {
    cores: u32,
    heaps: Vec<std::sync::Arc<CoreHeap>>,
    inboxes: Vec<SegQueue<Frame>>,
    /// `Some(buffer)` while delivery to that core is held.
    held: Vec<Mutex<Option<Vec<Frame>>>>,
    parkers: Mutex<Vec<Option<Parker>>>,
    rendezvous: Barrier,
    reduce: Mutex<ReduceState>,
    reduce_done: Condvar,
    stats: FabricStats,
}

impl InProcessFabric {
    /// Builds a fabric over the given per-core arenas.
    #[must_use]
    pub fn new(heaps: Vec<std::sync::Arc<CoreHeap>>) -> Self {
        let cores = heaps.len() as u32;
        Self {
            cores,
            heaps,
            inboxes: (0..cores).map(|_| SegQueue::new()).collect(),
            held: (0..cores).map(|_| Mutex::new(None)).collect(),
            parkers: Mutex::new(vec![None; cores as usize]),
            rendezvous: Barrier::new(cores as usize),
            reduce: Mutex::new(ReduceState {
                generation: 0,
                arrived: 0,
                sum: 0,
                result: 0,
            }),
            reduce_done: Condvar::new(),
            stats: FabricStats::default(),
        }
    }

    /// Number of cores on the fabric.
    #[must_use]
    pub fn cores(&self) -> u32 {
        self.cores
    }

    /// Registers the parker a worker sleeps on, so delivery can wake it.
    pub fn register_parker(&self, core: Core, parker: Parker) {
        let mut parkers = self.parkers.lock().expect("fabric parker lock poisoned");
        parkers[core.index()] = Some(parker);
    }

    /// Pops the next frame addressed to `core`, if any.
    #[must_use]
    pub fn try_recv(&self, core: Core) -> Option<Frame> {
        self.inboxes[core.index()].pop()
    }

    /// Pauses delivery to `core`; sent frames buffer until
    /// [`InProcessFabric::release_held`].
    pub fn hold_delivery(&self, core: Core) {
        let mut held = self.held[core.index()]
            .lock()
            .expect("fabric hold lock poisoned");
        if held.is_none() {
            *held = Some(Vec::new());
        }
    }

    /// Resumes delivery to `core`, flushing buffered frames in send order.
    pub fn release_held(&self, core: Core) {
        let buffered = self.held[core.index()]
            .lock()
            .expect("fabric hold lock poisoned")
            .take();
        if let Some(frames) = buffered {
            let n = frames.len();
            for frame in frames {
                self.stats.record_delivery();
                self.inboxes[core.index()].push(frame);
            }
            tracing::trace!(core = %core, released = n, "held frames released");
            self.unpark(core);
        }
    }

    fn unpark(&self, core: Core) {
        let parkers = self.parkers.lock().expect("fabric parker lock poisoned");
        if let Some(parker) = &parkers[core.index()] {
            parker.unpark();
        }
    }
}

impl Transport for InProcessFabric {
    fn send(&self, dest: Core, frame: Frame) {
        self.stats.record_send();
        {
            let mut held = self.held[dest.index()]
                .lock()
                .expect("fabric hold lock poisoned");
            if let Some(buffer) = held.as_mut() {
                buffer.push(frame);
                return;
            }
        }
        self.stats.record_delivery();
        self.inboxes[dest.index()].push(frame);
        self.unpark(dest);
    }

    fn bulk_put(&self, dest: Core, offset: u64, bytes: &[u8]) {
        self.stats.record_bulk_put();
        let offset = offset as usize;
        self.heaps[dest.index()].with_arena(|arena| {
            arena[offset..offset + bytes.len()].copy_from_slice(bytes);
        });
    }

    fn bulk_get(&self, src: Core, offset: u64, len: usize) -> Vec<u8> {
        self.stats.record_bulk_get();
        let offset = offset as usize;
        self.heaps[src.index()].with_arena(|arena| arena[offset..offset + len].to_vec())
    }

    fn barrier(&self) {
        self.rendezvous.wait();
    }

    fn reduce_sum(&self, value: u64) -> u64 {
        let mut state = self.reduce.lock().expect("fabric reduce lock poisoned");
        let generation = state.generation;
        state.sum += value;
        state.arrived += 1;
        if state.arrived == self.cores {
            state.result = state.sum;
            state.sum = 0;
            state.arrived = 0;
            state.generation += 1;
            self.reduce_done.notify_all();
            return state.result;
        }
        while state.generation == generation {
            state = self
                .reduce_done
                .wait(state)
                .expect("fabric reduce lock poisoned");
        }
        state.result
    }

    fn stats(&self) -> &FabricStats {
        &self.stats
    }
}

impl std::fmt::Debug for InProcessFabric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InProcessFabric")
            .field("cores", &self.cores)
            .field("frames_sent", &self.stats.frames_sent())
            .field("frames_delivered", &self.stats.frames_delivered())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::message::{ActiveMessage, Payload};
    use crate::test_utils::init_test_logging;

    fn fabric(cores: u32, arena: usize) -> InProcessFabric {
        let heaps = (0..cores).map(|_| Arc::new(CoreHeap::new(arena))).collect();
        InProcessFabric::new(heaps)
    }

    fn noop_frame(origin: Core) -> Frame {
        let ActiveMessage {
            handler, payload, ..
        } = ActiveMessage::new(origin, |_| {});
        Frame {
            origin,
            handler,
            payload,
            credit: None,
        }
    }

    #[test]
    fn frames_arrive_in_send_order_per_pair() {
        init_test_logging();
        let fabric = fabric(2, 0);
        for i in 0..10u8 {
            let ActiveMessage {
                handler, payload: _, ..
            } = ActiveMessage::new(Core::new(1), |_| {});
            fabric.send(
                Core::new(1),
                Frame {
                    origin: Core::new(0),
                    handler,
                    payload: Payload::from_bytes(&[i], 16),
                    credit: None,
                },
            );
        }
        for i in 0..10u8 {
            let frame = fabric.try_recv(Core::new(1)).expect("frame");
            assert_eq!(frame.payload.as_slice(), &[i]);
        }
        assert!(fabric.try_recv(Core::new(1)).is_none());
        assert_eq!(fabric.stats().frames_sent(), 10);
        assert_eq!(fabric.stats().frames_delivered(), 10);
    }

    #[test]
    fn held_frames_buffer_until_release() {
        init_test_logging();
        let fabric = fabric(2, 0);
        fabric.hold_delivery(Core::new(1));

        fabric.send(Core::new(1), noop_frame(Core::new(0)));
        fabric.send(Core::new(1), noop_frame(Core::new(0)));
        assert!(fabric.try_recv(Core::new(1)).is_none());
        assert_eq!(fabric.stats().frames_sent(), 2);
        assert_eq!(fabric.stats().frames_delivered(), 0);

        fabric.release_held(Core::new(1));
        assert!(fabric.try_recv(Core::new(1)).is_some());
        assert!(fabric.try_recv(Core::new(1)).is_some());
        assert_eq!(fabric.stats().frames_delivered(), 2);
    }

    #[test]
    fn bulk_put_then_get_round_trips() {
        init_test_logging();
        let fabric = fabric(2, 256);
        fabric.bulk_put(Core::new(1), 32, &[1, 2, 3, 4]);
        assert_eq!(fabric.bulk_get(Core::new(1), 32, 4), vec![1, 2, 3, 4]);
        assert_eq!(fabric.stats().bulk_puts(), 1);
        assert_eq!(fabric.stats().bulk_gets(), 1);
    }

    #[test]
    fn reduce_sum_totals_across_threads() {
        init_test_logging();
        let fabric = Arc::new(fabric(4, 0));
        let mut handles = Vec::new();
        for value in 0..4u64 {
            let fabric = Arc::clone(&fabric);
            handles.push(std::thread::spawn(move || fabric.reduce_sum(value * 10)));
        }
        for handle in handles {
            assert_eq!(handle.join().expect("thread"), 60);
        }
    }

    #[test]
    fn barrier_rendezvous_completes() {
        init_test_logging();
        let fabric = Arc::new(fabric(3, 0));
        let mut handles = Vec::new();
        for _ in 0..3 {
            let fabric = Arc::clone(&fabric);
            handles.push(std::thread::spawn(move || fabric.barrier()));
        }
        for handle in handles {
            handle.join().expect("thread");
        }
    }
}
