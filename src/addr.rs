//! Global addresses: naming remote memory with one 64-bit value.
//!
//! A [`GlobalAddress`] is the only handle by which memory on another core is
//! named. Two address families coexist, distinguished by a reserved tag bit
//! in the packed encoding:
//!
//! - **Direct**: an explicit `(core, arena offset)` pair. Produced by
//!   decomposing another address or by naming a symmetric replica.
//! - **Linear**: a single global offset over the block-cyclic data heap.
//!   The owning core is *computed*, never stored:
//!   `core = (offset / block_size) % cores`.
//!
//! [`AddressLayout`] carries the field widths and block geometry, fixed at
//! startup by [`crate::config::RuntimeConfig::validate`]. All mappings here
//! are pure bit and block arithmetic — [`AddressLayout::core_of`] is
//! evaluated on the sending side before any message exists and must never
//! touch memory.
//!
//! Packing a component that does not fit its field is a fatal error
//! (assertion), not a recoverable one: the widths were chosen for this
//! cluster at startup, and an oversized value is a configuration bug.

use std::fmt;
use std::marker::PhantomData;

use crate::codec::Plain;
use crate::error::ConfigError;
use crate::types::Core;

/// Widest supported core-id field. Keeps at least 43 offset bits free.
const MAX_CORE_BITS: u32 = 20;

/// A global address naming bytes on some core.
///
/// Value type: trivially copyable, never owns the memory it names. The
/// owning core's allocator owns the underlying bytes; destruction happens
/// only through an explicit matching free.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GlobalAddress {
    /// Explicit core id plus byte offset into that core's arena.
    Direct {
        /// The owning core.
        core: Core,
        /// Byte offset into the owner's arena.
        offset: u64,
    },
    /// Global offset into the block-cyclic data heap.
    Linear {
        /// Global byte offset; the owner is derived by block arithmetic.
        offset: u64,
    },
}

impl GlobalAddress {
    /// Creates a direct address.
    #[must_use]
    pub const fn direct(core: Core, offset: u64) -> Self {
        Self::Direct { core, offset }
    }

    /// Creates a linear address.
    #[must_use]
    pub const fn linear(offset: u64) -> Self {
        Self::Linear { offset }
    }

    /// Advances the address by a signed number of bytes, staying within the
    /// same family.
    #[must_use]
    pub fn byte_add(self, delta: i64) -> Self {
        let add = |offset: u64| {
            if delta >= 0 {
                offset + delta as u64
            } else {
                offset - delta.unsigned_abs()
            }
        };
        match self {
            Self::Direct { core, offset } => Self::Direct {
                core,
                offset: add(offset),
            },
            Self::Linear { offset } => Self::Linear {
                offset: add(offset),
            },
        }
    }
}

impl fmt::Display for GlobalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct { core, offset } => write!(f, "g[{core}+{offset:#x}]"),
            Self::Linear { offset } => write!(f, "g[lin+{offset:#x}]"),
        }
    }
}

/// Field widths and block geometry of the packed address encoding.
///
/// Derived once from the cluster size; see the module docs for the layout.
/// Bit 63 is the family tag (1 = direct, 0 = linear); a direct address
/// carries the core id in the bits directly below the tag and the arena
/// offset in the remainder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AddressLayout {
    cores: u32,
    core_bits: u32,
    block_size: u64,
}

impl AddressLayout {
    /// Derives the layout for a cluster of `cores` cores.
    ///
    /// The core field is the smallest width that holds `cores - 1`; the
    /// offset field takes the remaining bits below the tag.
    pub fn new(cores: u32, block_size: u64) -> Result<Self, ConfigError> {
        if cores == 0 {
            return Err(ConfigError::ZeroCores);
        }
        let core_bits = (u32::BITS - (cores - 1).leading_zeros()).max(1);
        if core_bits > MAX_CORE_BITS {
            return Err(ConfigError::CoreFieldOverflow {
                cores,
                bits: MAX_CORE_BITS,
            });
        }
        Ok(Self {
            cores,
            core_bits,
            block_size,
        })
    }

    /// Number of cores this layout addresses.
    #[must_use]
    pub const fn cores(&self) -> u32 {
        self.cores
    }

    /// Width of the core-id field in bits.
    #[must_use]
    pub const fn core_bits(&self) -> u32 {
        self.core_bits
    }

    /// Width of the direct-offset field in bits.
    #[must_use]
    pub const fn offset_bits(&self) -> u32 {
        63 - self.core_bits
    }

    /// Block size of the linear family in bytes.
    #[must_use]
    pub const fn block_size(&self) -> u64 {
        self.block_size
    }

    /// Packs an address into its 64-bit encoding.
    ///
    /// # Panics
    ///
    /// Panics if a component does not fit its reserved field. Field widths
    /// are fixed at startup from the cluster size; an oversized component is
    /// a fatal configuration error.
    #[must_use]
    pub fn encode(&self, addr: GlobalAddress) -> u64 {
        match addr {
            GlobalAddress::Direct { core, offset } => {
                assert!(
                    core.raw() < self.cores,
                    "core id {core} out of range for {} cores",
                    self.cores
                );
                assert!(
                    offset < 1u64 << self.offset_bits(),
                    "direct offset {offset:#x} does not fit {} offset bits",
                    self.offset_bits()
                );
                (1u64 << 63) | (u64::from(core.raw()) << self.offset_bits()) | offset
            }
            GlobalAddress::Linear { offset } => {
                assert!(
                    offset < 1u64 << 63,
                    "linear offset {offset:#x} does not fit 63 bits"
                );
                offset
            }
        }
    }

    /// Unpacks a 64-bit encoding back into an address.
    ///
    /// `decode(encode(a)) == a` for every address whose components fit the
    /// layout's fields.
    #[must_use]
    pub fn decode(&self, bits: u64) -> GlobalAddress {
        if bits >> 63 == 1 {
            let offset_bits = self.offset_bits();
            let core = ((bits >> offset_bits) & ((1u64 << self.core_bits) - 1)) as u32;
            let offset = bits & ((1u64 << offset_bits) - 1);
            GlobalAddress::Direct {
                core: Core::new(core),
                offset,
            }
        } else {
            GlobalAddress::Linear { offset: bits }
        }
    }

    /// Returns the core that owns the bytes named by `addr`.
    ///
    /// Pure arithmetic: evaluated on the sending side to pick a message
    /// destination, before any memory is touched.
    #[must_use]
    pub fn core_of(&self, addr: GlobalAddress) -> Core {
        match addr {
            GlobalAddress::Direct { core, .. } => core,
            GlobalAddress::Linear { offset } => {
                let block = offset / self.block_size;
                Core::new((block % u64::from(self.cores)) as u32)
            }
        }
    }

    /// Returns the byte offset of `addr` within its owner's arena.
    ///
    /// For the linear family this is the block-cyclic mapping: the owner
    /// holds every `cores`-th block, packed densely from the bottom of its
    /// data region.
    #[must_use]
    pub fn pointer_of(&self, addr: GlobalAddress) -> u64 {
        match addr {
            GlobalAddress::Direct { offset, .. } => offset,
            GlobalAddress::Linear { offset } => {
                let block = offset / self.block_size;
                (block / u64::from(self.cores)) * self.block_size + offset % self.block_size
            }
        }
    }

    /// Returns true if `range` bytes starting at `addr` live on a single
    /// core. Direct ranges always do; a linear range must not cross a block
    /// boundary.
    #[must_use]
    pub fn single_owner(&self, addr: GlobalAddress, len: u64) -> bool {
        match addr {
            GlobalAddress::Direct { .. } => true,
            GlobalAddress::Linear { offset } => {
                len == 0 || offset / self.block_size == (offset + len - 1) / self.block_size
            }
        }
    }
}

/// A typed global pointer to a `T` on some core.
///
/// Thin wrapper over [`GlobalAddress`] carrying the element type; element
/// arithmetic advances the underlying byte offset by `T::SIZE`.
pub struct GlobalPtr<T> {
    addr: GlobalAddress,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Plain> GlobalPtr<T> {
    /// Wraps an address as a typed pointer.
    #[must_use]
    pub const fn new(addr: GlobalAddress) -> Self {
        Self {
            addr,
            _marker: PhantomData,
        }
    }

    /// Returns the untyped address.
    #[must_use]
    pub const fn addr(&self) -> GlobalAddress {
        self.addr
    }

    /// Advances by a signed number of elements.
    #[must_use]
    pub fn offset(self, elements: i64) -> Self {
        let bytes = elements
            .checked_mul(T::SIZE as i64)
            .expect("pointer arithmetic overflow");
        Self::new(self.addr.byte_add(bytes))
    }

    /// Element-count difference `self - other`.
    ///
    /// Both pointers must belong to the same family (and core, for direct
    /// pointers) and be element-aligned relative to each other.
    #[must_use]
    pub fn element_distance(self, other: Self) -> i64 {
        let (a, b) = match (self.addr, other.addr) {
            (
                GlobalAddress::Direct { core: ca, offset: a },
                GlobalAddress::Direct { core: cb, offset: b },
            ) => {
                debug_assert_eq!(ca, cb, "pointer difference across cores");
                (a, b)
            }
            (GlobalAddress::Linear { offset: a }, GlobalAddress::Linear { offset: b }) => (a, b),
            _ => panic!("pointer difference across address families"),
        };
        let bytes = a as i64 - b as i64;
        debug_assert_eq!(bytes % T::SIZE as i64, 0, "unaligned pointer difference");
        bytes / T::SIZE as i64
    }

    /// Returns true if this pointer's bytes live on `core` under `layout`.
    #[must_use]
    pub fn is_local_to(&self, layout: &AddressLayout, core: Core) -> bool {
        layout.core_of(self.addr) == core
    }
}

impl<T> Clone for GlobalPtr<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for GlobalPtr<T> {}

impl<T> fmt::Debug for GlobalPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("GlobalPtr").field(&self.addr).finish()
    }
}

impl<T> PartialEq for GlobalPtr<T> {
    fn eq(&self, other: &Self) -> bool {
        self.addr == other.addr
    }
}

impl<T> Eq for GlobalPtr<T> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(cores: u32) -> AddressLayout {
        AddressLayout::new(cores, 64).expect("layout")
    }

    #[test]
    fn direct_round_trip_across_widths() {
        for cores in [1u32, 2, 3, 5, 64, 1000] {
            let layout = layout(cores);
            for core in [0, cores / 2, cores - 1] {
                for offset in [0u64, 1, 63, 64, 0xfff, (1 << layout.offset_bits()) - 1] {
                    let addr = GlobalAddress::direct(Core::new(core), offset);
                    let bits = layout.encode(addr);
                    assert_eq!(layout.decode(bits), addr, "cores={cores} core={core}");
                }
            }
        }
    }

    #[test]
    fn linear_round_trip() {
        let layout = layout(4);
        for offset in [0u64, 1, 64, 65, 12345, (1 << 62) + 17] {
            let addr = GlobalAddress::linear(offset);
            assert_eq!(layout.decode(layout.encode(addr)), addr);
        }
    }

    #[test]
    fn families_are_distinguishable() {
        let layout = layout(4);
        let direct = layout.encode(GlobalAddress::direct(Core::new(0), 0));
        let linear = layout.encode(GlobalAddress::linear(0));
        assert_ne!(direct, linear);
        assert!(matches!(
            layout.decode(direct),
            GlobalAddress::Direct { .. }
        ));
        assert!(matches!(
            layout.decode(linear),
            GlobalAddress::Linear { .. }
        ));
    }

    #[test]
    fn linear_owner_is_block_cyclic() {
        let layout = layout(4);
        // Blocks 0,1,2,3 map to cores 0,1,2,3; block 4 wraps to core 0.
        assert_eq!(layout.core_of(GlobalAddress::linear(0)).index(), 0);
        assert_eq!(layout.core_of(GlobalAddress::linear(63)).index(), 0);
        assert_eq!(layout.core_of(GlobalAddress::linear(64)).index(), 1);
        assert_eq!(layout.core_of(GlobalAddress::linear(255)).index(), 3);
        assert_eq!(layout.core_of(GlobalAddress::linear(256)).index(), 0);
    }

    #[test]
    fn linear_local_offsets_pack_densely() {
        let layout = layout(4);
        // Core 0 owns blocks 0, 4, 8, ... at local offsets 0, 64, 128, ...
        assert_eq!(layout.pointer_of(GlobalAddress::linear(0)), 0);
        assert_eq!(layout.pointer_of(GlobalAddress::linear(10)), 10);
        assert_eq!(layout.pointer_of(GlobalAddress::linear(256)), 64);
        assert_eq!(layout.pointer_of(GlobalAddress::linear(256 + 7)), 64 + 7);
        // Core 1's first block is global block 1, at its local offset 0;
        // its second block is global block 5 (offsets 320..384).
        assert_eq!(layout.pointer_of(GlobalAddress::linear(64)), 0);
        assert_eq!(layout.pointer_of(GlobalAddress::linear(320 + 5)), 64 + 5);
    }

    #[test]
    fn single_owner_detects_block_straddle() {
        let layout = layout(4);
        assert!(layout.single_owner(GlobalAddress::linear(0), 64));
        assert!(!layout.single_owner(GlobalAddress::linear(60), 8));
        assert!(layout.single_owner(GlobalAddress::linear(60), 0));
        assert!(layout.single_owner(GlobalAddress::direct(Core::new(1), 60), 4096));
    }

    #[test]
    fn core_of_is_pure_for_every_encoded_value() {
        let layout = layout(8);
        for core in 0..8u32 {
            let addr = GlobalAddress::direct(Core::new(core), 0x40);
            assert_eq!(layout.core_of(addr).raw(), core);
            assert_eq!(layout.core_of(layout.decode(layout.encode(addr))).raw(), core);
        }
    }

    #[test]
    fn typed_pointer_arithmetic() {
        let base = GlobalPtr::<u64>::new(GlobalAddress::linear(0));
        let third = base.offset(3);
        assert_eq!(third.addr(), GlobalAddress::linear(24));
        assert_eq!(third.element_distance(base), 3);
        assert_eq!(base.element_distance(third), -3);

        let direct = GlobalPtr::<u32>::new(GlobalAddress::direct(Core::new(2), 100));
        assert_eq!(
            direct.offset(-5).addr(),
            GlobalAddress::direct(Core::new(2), 80)
        );
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn encoding_oversized_core_is_fatal() {
        let layout = layout(4);
        let _ = layout.encode(GlobalAddress::direct(Core::new(4), 0));
    }

    #[test]
    #[should_panic(expected = "does not fit")]
    fn encoding_oversized_offset_is_fatal() {
        let layout = layout(4);
        let offset = 1u64 << layout.offset_bits();
        let _ = layout.encode(GlobalAddress::direct(Core::new(0), offset));
    }

    #[test]
    fn huge_cluster_rejected() {
        let err = AddressLayout::new(u32::MAX, 64).unwrap_err();
        assert!(matches!(err, ConfigError::CoreFieldOverflow { .. }));
    }
}
