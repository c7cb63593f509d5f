//! # ARM First-Level Table (L1)
//!
//! - [`L1Index`]: index type for VA bits `[31:20]`.
//! - [`L1Descriptor`]: one 32-bit first-level descriptor.
//! - [`L1Table`]: a 16 KiB-aligned array of 4096 descriptors, one per MiB.
//!
//! ## Descriptor layout (coarse page table)
//!
//! | Bits   | Field        | Meaning |
//! |--------|--------------|---------|
//! | 0–1    | `type`       | `00` no mapping, `01` coarse L2 table |
//! | 2–4    | SBZ          | Should be zero |
//! | 5–8    | `domain`     | Domain checked against DACR (always 0 here) |
//! | 9      | `IMP`        | Implementation defined (always 0 here) |
//! | 10–31  | `L2_base`    | L2 table physical address >> 10 |

use bitfield_struct::bitfield;
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};

/// Number of descriptors in an L1 table.
pub const L1_ENTRIES: usize = 4096;

/// Index into the L1 table (derived from VA bits `[31:20]`).
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct L1Index(u16);

impl L1Index {
    /// Build an index from a virtual address (extracts bits `[31:20]`).
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from(va: VirtualAddress) -> Self {
        Self::new((va.as_u32() >> 20) as u16)
    }

    /// Construct from a raw `u16`.
    ///
    /// ### Debug assertions
    /// - Asserts `v < 4096` in debug builds.
    #[inline]
    #[must_use]
    pub const fn new(v: u16) -> Self {
        debug_assert!((v as usize) < L1_ENTRIES);
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// The index `n` entries further on.
    #[inline]
    #[must_use]
    pub const fn offset(self, n: u16) -> Self {
        Self::new(self.0 + n)
    }
}

/// First-level descriptor type (bits `[1:0]`).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum L1Type {
    /// Translation fault on access.
    NoMap = 0b00,
    /// Points at a 1 KiB coarse L2 table.
    Coarse = 0b01,
    /// 1 MiB section. Never written by this crate.
    Section = 0b10,
    /// Fine L2 table (ARMv5). Never written by this crate.
    Fine = 0b11,
}

impl L1Type {
    #[inline]
    #[must_use]
    pub const fn into_bits(self) -> u8 {
        self as u8
    }

    #[inline]
    #[must_use]
    pub const fn from_bits(v: u8) -> Self {
        match v & 0b11 {
            0b00 => Self::NoMap,
            0b01 => Self::Coarse,
            0b10 => Self::Section,
            _ => Self::Fine,
        }
    }
}

/// A single first-level descriptor.
///
/// Fields are only written together, through [`L1Descriptor::encode`]; there
/// are no per-field setters.
#[bitfield(u32)]
#[derive(Eq, PartialEq)]
pub struct L1Descriptor {
    /// Bits 0–1 — descriptor type.
    #[bits(2)]
    desc_type: L1Type,

    /// Bits 2–4 — Should be zero.
    #[bits(3)]
    _sbz: u8,

    /// Bits 5–8 — domain.
    #[bits(4)]
    domain_id: u8,

    /// Bit 9 — implementation defined.
    imp_bit: bool,

    /// Bits 10–31 — L2 table physical address >> 10.
    #[bits(22)]
    l2_base_1k: u32,
}

impl L1Descriptor {
    /// The unmapped descriptor: every field zero.
    pub const EMPTY: Self = Self::new();

    /// Encode every field at once.
    ///
    /// `l2_table` keeps 10-bit precision: its low ten bits are dropped.
    #[inline]
    #[must_use]
    pub const fn encode(kind: L1Type, domain: u8, imp: bool, l2_table: PhysicalAddress) -> Self {
        Self::new()
            .with_desc_type(kind)
            .with_domain_id(domain & 0xF)
            .with_imp_bit(imp)
            .with_l2_base_1k(l2_table.as_u32() >> 10)
    }

    /// A coarse descriptor in domain 0 pointing at `l2_table`.
    #[inline]
    #[must_use]
    pub const fn coarse(l2_table: PhysicalAddress) -> Self {
        Self::encode(L1Type::Coarse, 0, false, l2_table)
    }

    #[inline]
    #[must_use]
    pub const fn kind(self) -> L1Type {
        self.desc_type()
    }

    #[inline]
    #[must_use]
    pub const fn domain(self) -> u8 {
        self.domain_id()
    }

    #[inline]
    #[must_use]
    pub const fn imp(self) -> bool {
        self.imp_bit()
    }

    /// Physical address of the L2 table this descriptor points at.
    #[inline]
    #[must_use]
    pub const fn l2_table(self) -> PhysicalAddress {
        PhysicalAddress::new(self.l2_base_1k() << 10)
    }

    /// Returns `true` if the descriptor points at a coarse L2 table.
    #[inline]
    #[must_use]
    pub const fn is_coarse(self) -> bool {
        matches!(self.kind(), L1Type::Coarse)
    }
}

/// The L1 table: 4096 descriptors, 16 KiB aligned.
#[repr(C, align(16384))]
pub struct L1Table {
    entries: [L1Descriptor; L1_ENTRIES],
}

impl L1Table {
    /// A table with every entry unmapped.
    #[inline]
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            entries: [L1Descriptor::EMPTY; L1_ENTRIES],
        }
    }

    /// Reset every entry to [`L1Descriptor::EMPTY`].
    #[inline]
    pub fn clear(&mut self) {
        self.entries.fill(L1Descriptor::EMPTY);
    }

    #[inline]
    #[must_use]
    pub const fn get(&self, i: L1Index) -> L1Descriptor {
        self.entries[i.as_usize()]
    }

    /// The live slot at `i`.
    #[inline]
    pub const fn get_mut(&mut self, i: L1Index) -> &mut L1Descriptor {
        &mut self.entries[i.as_usize()]
    }

    #[inline]
    pub const fn set(&mut self, i: L1Index, e: L1Descriptor) {
        self.entries[i.as_usize()] = e;
    }

    /// Write every field of the descriptor at `i`.
    #[inline]
    pub const fn fill_index(
        &mut self,
        i: L1Index,
        kind: L1Type,
        domain: u8,
        imp: bool,
        l2_table: PhysicalAddress,
    ) {
        self.set(i, L1Descriptor::encode(kind, domain, imp, l2_table));
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = L1Descriptor> + '_ {
        self.entries.iter().copied()
    }
}

const _: () = {
    assert!(size_of::<L1Descriptor>() == 4);
    assert!(size_of::<L1Table>() == 16 * 1024);
    assert!(align_of::<L1Table>() == 16 * 1024);
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_is_top_twelve_bits() {
        assert_eq!(L1Index::from(VirtualAddress::new(0x0000_0000)).as_usize(), 0);
        assert_eq!(L1Index::from(VirtualAddress::new(0x3EC0_1234)).as_usize(), 0x3EC);
        assert_eq!(L1Index::from(VirtualAddress::new(0xFFFF_FFFF)).as_usize(), 0xFFF);
    }

    #[test]
    fn coarse_bit_layout() {
        let d = L1Descriptor::coarse(PhysicalAddress::new(0x0000_A400));
        assert_eq!(d.into_bits(), 0x0000_A400 | 0b01);
        assert_eq!(L1Descriptor::EMPTY.into_bits(), 0);
    }

    #[test]
    fn fill_then_get_reproduces_fields() {
        let mut table = L1Table::empty();
        let i = L1Index::new(0x123);
        table.fill_index(i, L1Type::Coarse, 0xA, true, PhysicalAddress::new(0x0123_4FFF));

        let d = table.get(i);
        assert_eq!(d.kind(), L1Type::Coarse);
        assert_eq!(d.domain(), 0xA);
        assert!(d.imp());
        // 10-bit precision on the table base.
        assert_eq!(d.l2_table(), PhysicalAddress::new(0x0123_4C00));
        assert_eq!(d.into_bits() & 0b1_1100, 0, "SBZ bits must stay clear");

        assert_eq!(table.get(i.offset(1)), L1Descriptor::EMPTY);
    }

    #[test]
    fn clear_unmaps_everything() {
        let mut table = L1Table::empty();
        table.set(L1Index::new(7), L1Descriptor::coarse(PhysicalAddress::new(0x4000)));
        table.clear();
        assert!(table.iter().all(|d| d == L1Descriptor::EMPTY));
    }
}
