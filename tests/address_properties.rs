//! Property tests for the packed address encoding and the block-cyclic
//! mapping.

use farspace::{AddressLayout, Core, GlobalAddress};
use proptest::prelude::*;

fn arb_layout() -> impl Strategy<Value = AddressLayout> {
    (1u32..=4096, 3u32..=12).prop_map(|(cores, block_pow)| {
        AddressLayout::new(cores, 1 << block_pow).expect("layout")
    })
}

proptest! {
    #[test]
    fn direct_encoding_round_trips(
        layout in arb_layout(),
        core_pick in any::<u32>(),
        offset_pick in any::<u64>(),
    ) {
        let core = Core::new(core_pick % layout.cores());
        let offset = offset_pick & ((1u64 << layout.offset_bits()) - 1);
        let addr = GlobalAddress::direct(core, offset);
        prop_assert_eq!(layout.decode(layout.encode(addr)), addr);
    }

    #[test]
    fn linear_encoding_round_trips(
        layout in arb_layout(),
        offset_pick in any::<u64>(),
    ) {
        let offset = offset_pick & ((1u64 << 63) - 1);
        let addr = GlobalAddress::linear(offset);
        prop_assert_eq!(layout.decode(layout.encode(addr)), addr);
    }

    #[test]
    fn families_never_collide(
        layout in arb_layout(),
        offset_pick in any::<u64>(),
    ) {
        let direct_offset = offset_pick & ((1u64 << layout.offset_bits()) - 1);
        let linear_offset = offset_pick & ((1u64 << 63) - 1);
        let direct = layout.encode(GlobalAddress::direct(Core::new(0), direct_offset));
        let linear = layout.encode(GlobalAddress::linear(linear_offset));
        // The tag bit separates the families for every operand.
        prop_assert_eq!(direct >> 63, 1);
        prop_assert_eq!(linear >> 63, 0);
    }

    #[test]
    fn linear_owner_stays_in_range(
        layout in arb_layout(),
        offset in 0u64..1 << 40,
    ) {
        let addr = GlobalAddress::linear(offset);
        prop_assert!(layout.core_of(addr).raw() < layout.cores());
    }

    #[test]
    fn linear_mapping_is_injective(
        layout in arb_layout(),
        a in 0u64..1 << 32,
        b in 0u64..1 << 32,
    ) {
        prop_assume!(a != b);
        let (aa, ab) = (GlobalAddress::linear(a), GlobalAddress::linear(b));
        let image_a = (layout.core_of(aa), layout.pointer_of(aa));
        let image_b = (layout.core_of(ab), layout.pointer_of(ab));
        // Two distinct global offsets never share an owner-local slot.
        prop_assert_ne!(image_a, image_b);
    }

    #[test]
    fn owner_local_offsets_pack_densely(
        layout in arb_layout(),
        block_index in 0u64..1 << 20,
    ) {
        // The k-th block owned by a core lands at local offset k * block.
        let block = layout.block_size();
        let offset = block_index * block;
        let addr = GlobalAddress::linear(offset);
        let local = layout.pointer_of(addr);
        prop_assert_eq!(local % block, 0);
        prop_assert_eq!(
            local / block,
            block_index / u64::from(layout.cores())
        );
    }
}
