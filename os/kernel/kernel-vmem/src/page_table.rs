//! # ARM Short-Descriptor Page Tables

pub mod l1;
pub mod l2;

use kernel_memory_addresses::VirtualAddress;

pub use l1::{L1_ENTRIES, L1Descriptor, L1Index, L1Table, L1Type};
pub use l2::{AccessPermission, L2_ENTRIES, L2_TABLE_SIZE, L2Descriptor, L2Index, L2Table, L2Type};

/// Number of L2 tables that share one physical page.
pub const L2_TABLES_PER_PAGE: u16 = 4;

/// Split a virtual address into its L1 and L2 table indices.
#[inline]
#[must_use]
pub const fn split_indices(va: VirtualAddress) -> (L1Index, L2Index) {
    (L1Index::from(va), L2Index::from(va))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_and_offset_cover_the_address() {
        let va = VirtualAddress::new(0x4012_3456);
        let (i1, i2) = split_indices(va);
        assert_eq!(i1.as_usize(), 0x401);
        assert_eq!(i2.as_usize(), 0x23);

        let rebuilt = ((i1.as_usize() as u32) << 20) | ((i2.as_usize() as u32) << 12) | 0x456;
        assert_eq!(rebuilt, va.as_u32());
    }
}
