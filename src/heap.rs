//! Global memory: per-core arenas and the allocators over them.
//!
//! Each core owns one byte arena split into two regions: the *data region*
//! at the bottom, carved up by the block-cyclic linear allocator, and the
//! *symmetric region* at the top, carved identically on every core so that
//! one offset names a replica on each. The runtime performs no garbage
//! collection: every allocation is freed explicitly, on the owning side.
//!
//! The allocators themselves are process-level free lists; the arena bytes
//! are only ever touched by their owning worker (executing active-message
//! handlers) or by the transport's bulk operations, both under the arena
//! lock.

use parking_lot::Mutex;

use crate::addr::{AddressLayout, GlobalAddress, GlobalPtr};
use crate::codec::Plain;
use crate::error::AllocError;
use crate::types::Core;

/// One core's byte arena.
#[derive(Debug)]
pub struct CoreHeap {
    arena: Mutex<Vec<u8>>,
}

impl CoreHeap {
    /// Allocates a zeroed arena of `len` bytes.
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            arena: Mutex::new(vec![0u8; len]),
        }
    }

    /// Arena length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.arena.lock().len()
    }

    /// True if the arena has zero length.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs `f` with exclusive access to the arena bytes.
    ///
    /// This lock is what makes a delegate handler atomic with respect to
    /// every other handler and bulk operation on the same core.
    pub fn with_arena<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let mut arena = self.arena.lock();
        f(&mut arena)
    }
}

/// A first-fit free-list allocator over an abstract offset space.
///
/// Tracks free runs only; a free that does not match a previously allocated
/// run is reported as [`AllocError::BadFree`] when it overlaps a free run.
#[derive(Debug)]
pub struct FreeList {
    region: &'static str,
    /// Free runs `(offset, len)`, sorted by offset, never adjacent.
    free: Vec<(u64, u64)>,
}

impl FreeList {
    /// Creates a free list covering `[0, total)`.
    #[must_use]
    pub fn new(region: &'static str, total: u64) -> Self {
        let free = if total == 0 {
            Vec::new()
        } else {
            vec![(0, total)]
        };
        Self { region, free }
    }

    /// Allocates `len` bytes aligned to `align` (a power of two).
    pub fn alloc(&mut self, len: u64, align: u64) -> Result<u64, AllocError> {
        debug_assert!(align.is_power_of_two());
        let len = len.max(1);
        for i in 0..self.free.len() {
            let (start, run) = self.free[i];
            let aligned = (start + align - 1) & !(align - 1);
            let pad = aligned - start;
            if run < pad + len {
                continue;
            }
            // Shrink or split the run around the allocation.
            self.free.remove(i);
            if pad > 0 {
                self.free.insert(i, (start, pad));
            }
            let tail = run - pad - len;
            if tail > 0 {
                let at = if pad > 0 { i + 1 } else { i };
                self.free.insert(at, (aligned + len, tail));
            }
            return Ok(aligned);
        }
        Err(AllocError::Exhausted {
            region: self.region,
            requested: len,
        })
    }

    /// Returns `[offset, offset + len)` to the free list, coalescing with
    /// neighbors.
    pub fn free(&mut self, offset: u64, len: u64) -> Result<(), AllocError> {
        let len = len.max(1);
        let pos = self.free.partition_point(|&(o, _)| o < offset);
        // Overlap with either neighbor means the caller freed something
        // that was not allocated.
        if let Some(&(next_off, _)) = self.free.get(pos) {
            if offset + len > next_off {
                return Err(AllocError::BadFree { offset, len });
            }
        }
        if pos > 0 {
            let (prev_off, prev_len) = self.free[pos - 1];
            if prev_off + prev_len > offset {
                return Err(AllocError::BadFree { offset, len });
            }
        }

        self.free.insert(pos, (offset, len));
        // Coalesce with the following run.
        if pos + 1 < self.free.len() && self.free[pos].0 + self.free[pos].1 == self.free[pos + 1].0
        {
            self.free[pos].1 += self.free[pos + 1].1;
            self.free.remove(pos + 1);
        }
        // Coalesce with the preceding run.
        if pos > 0 && self.free[pos - 1].0 + self.free[pos - 1].1 == self.free[pos].0 {
            self.free[pos - 1].1 += self.free[pos].1;
            self.free.remove(pos);
        }
        Ok(())
    }

    /// Total free bytes.
    #[must_use]
    pub fn free_bytes(&self) -> u64 {
        self.free.iter().map(|&(_, len)| len).sum()
    }
}

/// The cluster's global memory: all arenas plus the two shared allocators.
#[derive(Debug)]
pub struct HeapSpace {
    layout: AddressLayout,
    data_len: u64,
    heaps: Vec<std::sync::Arc<CoreHeap>>,
    linear: Mutex<FreeList>,
    symmetric: Mutex<FreeList>,
}

impl HeapSpace {
    /// Builds arenas and allocators for `layout.cores()` cores with
    /// `data_len` data bytes and `symmetric_len` mirrored bytes each.
    #[must_use]
    pub fn new(layout: AddressLayout, data_len: u64, symmetric_len: u64) -> Self {
        let cores = layout.cores();
        let arena_len = (data_len + symmetric_len) as usize;
        let heaps = (0..cores)
            .map(|_| std::sync::Arc::new(CoreHeap::new(arena_len)))
            .collect();
        Self {
            layout,
            data_len,
            heaps,
            linear: Mutex::new(FreeList::new("linear", data_len * u64::from(cores))),
            symmetric: Mutex::new(FreeList::new("symmetric", symmetric_len)),
        }
    }

    /// The address layout this heap was built for.
    #[must_use]
    pub fn layout(&self) -> &AddressLayout {
        &self.layout
    }

    /// The arena of one core.
    #[must_use]
    pub fn core_heap(&self, core: Core) -> &std::sync::Arc<CoreHeap> {
        &self.heaps[core.index()]
    }

    /// All arenas, indexed by core.
    #[must_use]
    pub fn heaps(&self) -> &[std::sync::Arc<CoreHeap>] {
        &self.heaps
    }

    /// Allocates `n` elements of `T` from the block-cyclic linear heap.
    ///
    /// The element type must pack evenly into a block so that no element
    /// straddles two owners.
    pub fn alloc_linear<T: Plain>(&self, n: u64) -> Result<GlobalPtr<T>, AllocError> {
        let block = self.layout.block_size();
        let size = T::SIZE.max(1) as u64;
        if block % size != 0 {
            return Err(AllocError::ElementStraddlesBlock {
                element: size,
                block_size: block,
            });
        }
        let bytes = (n * size).div_ceil(block) * block;
        let offset = self.linear.lock().alloc(bytes.max(block), block)?;
        Ok(GlobalPtr::new(GlobalAddress::linear(offset)))
    }

    /// Frees `n` elements previously allocated at `ptr`.
    pub fn free_linear<T: Plain>(&self, ptr: GlobalPtr<T>, n: u64) -> Result<(), AllocError> {
        let GlobalAddress::Linear { offset } = ptr.addr() else {
            return Err(AllocError::BadFree { offset: 0, len: 0 });
        };
        let block = self.layout.block_size();
        let size = T::SIZE.max(1) as u64;
        let bytes = ((n * size).div_ceil(block) * block).max(block);
        self.linear.lock().free(offset, bytes)
    }

    /// Allocates one `T` at the same offset on every core.
    pub fn alloc_symmetric<T: Plain>(&self) -> Result<SymmetricPtr<T>, AllocError> {
        let offset = self
            .symmetric
            .lock()
            .alloc(T::SIZE.max(1) as u64, 8)?;
        Ok(SymmetricPtr {
            arena_offset: self.data_len + offset,
            size: T::SIZE.max(1) as u64,
            _marker: std::marker::PhantomData,
        })
    }

    /// Frees a symmetric allocation on every core at once.
    pub fn free_symmetric<T: Plain>(&self, ptr: SymmetricPtr<T>) -> Result<(), AllocError> {
        self.symmetric
            .lock()
            .free(ptr.arena_offset - self.data_len, ptr.size)
    }
}

/// A pointer to a symmetric allocation: one offset, one replica per core.
///
/// The replica on a given core is named by plain arithmetic, never lookup.
pub struct SymmetricPtr<T> {
    arena_offset: u64,
    size: u64,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T: Plain> SymmetricPtr<T> {
    /// The replica on `core`.
    #[must_use]
    pub fn on(&self, core: Core) -> GlobalPtr<T> {
        GlobalPtr::new(GlobalAddress::direct(core, self.arena_offset))
    }
}

impl<T> Clone for SymmetricPtr<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for SymmetricPtr<T> {}

impl<T> std::fmt::Debug for SymmetricPtr<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricPtr")
            .field("arena_offset", &self.arena_offset)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(cores: u32) -> AddressLayout {
        AddressLayout::new(cores, 64).expect("layout")
    }

    #[test]
    fn free_list_first_fit_and_coalesce() {
        let mut list = FreeList::new("test", 1024);
        let a = list.alloc(100, 1).unwrap();
        let b = list.alloc(100, 1).unwrap();
        let c = list.alloc(100, 1).unwrap();
        assert_eq!((a, b, c), (0, 100, 200));

        list.free(b, 100).unwrap();
        // First fit reuses the hole.
        assert_eq!(list.alloc(50, 1).unwrap(), 100);

        list.free(a, 100).unwrap();
        list.free(150, 50).unwrap();
        list.free(c, 100).unwrap();
        assert_eq!(list.free_bytes(), 1024);
        assert_eq!(list.free.len(), 1);
    }

    #[test]
    fn free_list_respects_alignment() {
        let mut list = FreeList::new("test", 1024);
        let _ = list.alloc(10, 1).unwrap();
        let aligned = list.alloc(64, 64).unwrap();
        assert_eq!(aligned % 64, 0);
    }

    #[test]
    fn free_list_reports_exhaustion() {
        let mut list = FreeList::new("test", 64);
        assert!(list.alloc(32, 1).is_ok());
        let err = list.alloc(64, 1).unwrap_err();
        assert!(matches!(err, AllocError::Exhausted { .. }));
    }

    #[test]
    fn double_free_is_detected() {
        let mut list = FreeList::new("test", 256);
        let a = list.alloc(64, 1).unwrap();
        list.free(a, 64).unwrap();
        let err = list.free(a, 64).unwrap_err();
        assert!(matches!(err, AllocError::BadFree { .. }));
    }

    #[test]
    fn linear_allocations_are_block_aligned_and_distinct() {
        let space = HeapSpace::new(layout(4), 4096, 256);
        let a = space.alloc_linear::<u64>(10).unwrap();
        let b = space.alloc_linear::<u64>(10).unwrap();
        assert_ne!(a.addr(), b.addr());
        let GlobalAddress::Linear { offset } = a.addr() else {
            panic!("expected linear");
        };
        assert_eq!(offset % 64, 0);
        space.free_linear(a, 10).unwrap();
        space.free_linear(b, 10).unwrap();
    }

    #[test]
    fn straddling_element_rejected() {
        let space = HeapSpace::new(layout(2), 4096, 0);
        let err = space.alloc_linear::<[u8; 48]>(1).unwrap_err();
        assert!(matches!(err, AllocError::ElementStraddlesBlock { .. }));
    }

    #[test]
    fn symmetric_replicas_share_an_offset() {
        let space = HeapSpace::new(layout(4), 4096, 256);
        let ptr = space.alloc_symmetric::<u64>().unwrap();
        let on0 = ptr.on(Core::new(0)).addr();
        let on3 = ptr.on(Core::new(3)).addr();
        let (GlobalAddress::Direct { core: c0, offset: o0 },
             GlobalAddress::Direct { core: c3, offset: o3 }) = (on0, on3)
        else {
            panic!("expected direct addresses");
        };
        assert_eq!(o0, o3);
        assert_eq!(c0.index(), 0);
        assert_eq!(c3.index(), 3);
        // Symmetric offsets live above the data region.
        assert!(o0 >= 4096);
        space.free_symmetric(ptr).unwrap();
    }

    #[test]
    fn arena_is_zeroed_and_lockable() {
        let heap = CoreHeap::new(128);
        assert_eq!(heap.len(), 128);
        heap.with_arena(|bytes| {
            assert!(bytes.iter().all(|&b| b == 0));
            bytes[5] = 9;
        });
        heap.with_arena(|bytes| assert_eq!(bytes[5], 9));
    }
}
