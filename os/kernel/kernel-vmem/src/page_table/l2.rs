//! # ARM Second-Level Table (coarse L2)
//!
//! - [`L2Index`]: index type for VA bits `[19:12]`.
//! - [`L2Descriptor`]: one 32-bit small-page descriptor.
//! - [`L2Table`]: a 1 KiB-aligned array of 256 descriptors. Four of them
//!   share one physical page.
//!
//! ## Descriptor layout (small page)
//!
//! | Bits   | Field       | Meaning |
//! |--------|-------------|---------|
//! | 0–1    | `type`      | `00` no mapping, `10` small 4 KiB page |
//! | 2      | `B`         | Bufferable |
//! | 3      | `C`         | Cacheable |
//! | 4–11   | `AP0..AP3`  | Access permissions per 1 KiB subpage, written identically |
//! | 12–31  | `phy_base`  | Physical page number |

use bitfield_struct::bitfield;
use kernel_memory_addresses::{PageNumber, PhysicalAddress, PhysicalPage, Size4K, VirtualAddress};

/// Number of descriptors in a coarse L2 table.
pub const L2_ENTRIES: usize = 256;

/// Bytes of one coarse L2 table.
pub const L2_TABLE_SIZE: u32 = 1024;

/// Index into a coarse L2 table (derived from VA bits `[19:12]`).
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct L2Index(u8);

impl L2Index {
    /// Build an index from a virtual address (extracts bits `[19:12]`).
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from(va: VirtualAddress) -> Self {
        Self::new(((va.as_u32() >> 12) & 0xFF) as u8)
    }

    #[inline]
    #[must_use]
    pub const fn new(v: u8) -> Self {
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// Second-level descriptor type (bits `[1:0]`).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum L2Type {
    /// Translation fault on access.
    NoMap = 0b00,
    /// 64 KiB large page. Never written by this crate.
    Large = 0b01,
    /// 4 KiB small page.
    Small = 0b10,
    /// Extended small page (ARMv6 with XP set). Never written by this crate.
    Extended = 0b11,
}

impl L2Type {
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
            0b01 => Self::Large,
            0b10 => Self::Small,
            _ => Self::Extended,
        }
    }
}

/// Access permission encoding of the `AP` fields, with domain 0 as client.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum AccessPermission {
    /// No access in any mode (subject to SCTLR.S/R).
    NoAccess = 0b00,
    /// Privileged read/write, user no access.
    KernelOnly = 0b01,
    /// Privileged read/write, user read-only.
    UserReadOnly = 0b10,
    /// Read/write in every mode.
    UserReadWrite = 0b11,
}

impl AccessPermission {
    #[inline]
    #[must_use]
    pub const fn into_bits(self) -> u8 {
        self as u8
    }

    #[inline]
    #[must_use]
    pub const fn from_bits(v: u8) -> Self {
        match v & 0b11 {
            0b00 => Self::NoAccess,
            0b01 => Self::KernelOnly,
            0b10 => Self::UserReadOnly,
            _ => Self::UserReadWrite,
        }
    }
}

/// A single small-page descriptor.
///
/// The four subpage permissions are always written with the same value, so
/// the descriptor means the same thing whether SCTLR.XP is set or not.
#[bitfield(u32)]
#[derive(Eq, PartialEq)]
pub struct L2Descriptor {
    /// Bits 0–1 — descriptor type.
    #[bits(2)]
    desc_type: L2Type,

    /// Bit 2 — B.
    bufferable_bit: bool,

    /// Bit 3 — C.
    cacheable_bit: bool,

    /// Bits 4–5 — AP0.
    #[bits(2)]
    ap0: AccessPermission,

    /// Bits 6–7 — AP1.
    #[bits(2)]
    ap1: AccessPermission,

    /// Bits 8–9 — AP2.
    #[bits(2)]
    ap2: AccessPermission,

    /// Bits 10–11 — AP3.
    #[bits(2)]
    ap3: AccessPermission,

    /// Bits 12–31 — physical page number.
    #[bits(20)]
    phy_base: u32,
}

impl L2Descriptor {
    /// The unmapped descriptor used to stamp fresh L2 tables:
    /// no mapping, page 0, kernel-only permissions.
    pub const EMPTY: Self = Self::encode(
        L2Type::NoMap,
        false,
        false,
        AccessPermission::KernelOnly,
        PageNumber::new(0),
    );

    /// Encode every field at once.
    ///
    /// Only the low 20 bits of `page` fit the descriptor.
    #[inline]
    #[must_use]
    pub const fn encode(
        kind: L2Type,
        bufferable: bool,
        cacheable: bool,
        ap: AccessPermission,
        page: PageNumber,
    ) -> Self {
        Self::new()
            .with_desc_type(kind)
            .with_bufferable_bit(bufferable)
            .with_cacheable_bit(cacheable)
            .with_ap0(ap)
            .with_ap1(ap)
            .with_ap2(ap)
            .with_ap3(ap)
            .with_phy_base(page.as_u32() & 0xF_FFFF)
    }

    /// A small, uncached, unbuffered mapping of `page`.
    #[inline]
    #[must_use]
    pub const fn small(page: PageNumber, ap: AccessPermission) -> Self {
        Self::encode(L2Type::Small, false, false, ap, page)
    }

    /// This descriptor with the mapping removed: type no-map and page 0,
    /// the attribute bits left as they were.
    #[inline]
    #[must_use]
    pub const fn unmapped(self) -> Self {
        Self::encode(
            L2Type::NoMap,
            self.bufferable(),
            self.cacheable(),
            self.ap(),
            PageNumber::new(0),
        )
    }

    #[inline]
    #[must_use]
    pub const fn kind(self) -> L2Type {
        self.desc_type()
    }

    #[inline]
    #[must_use]
    pub const fn bufferable(self) -> bool {
        self.bufferable_bit()
    }

    #[inline]
    #[must_use]
    pub const fn cacheable(self) -> bool {
        self.cacheable_bit()
    }

    /// Access permission of the page (subpage 0; all four are equal).
    #[inline]
    #[must_use]
    pub const fn ap(self) -> AccessPermission {
        self.ap0()
    }

    /// Returns `true` if all four subpage permissions agree.
    #[inline]
    #[must_use]
    pub const fn ap_uniform(self) -> bool {
        let ap = self.ap0() as u8;
        ap == self.ap1() as u8 && ap == self.ap2() as u8 && ap == self.ap3() as u8
    }

    /// Physical page number stored in the descriptor.
    #[inline]
    #[must_use]
    pub const fn page(self) -> PageNumber {
        PageNumber::new(self.phy_base())
    }

    /// Base of the mapped physical page.
    #[inline]
    #[must_use]
    pub const fn phys_page(self) -> PhysicalPage<Size4K> {
        PhysicalAddress::new(self.phy_base() << 12).page::<Size4K>()
    }

    #[inline]
    #[must_use]
    pub const fn is_mapped(self) -> bool {
        !matches!(self.kind(), L2Type::NoMap)
    }
}

/// A coarse L2 table: 256 descriptors, 1 KiB aligned.
#[repr(C, align(1024))]
pub struct L2Table {
    entries: [L2Descriptor; L2_ENTRIES],
}

impl L2Table {
    /// A table with every entry set to [`L2Descriptor::EMPTY`].
    #[inline]
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            entries: [L2Descriptor::EMPTY; L2_ENTRIES],
        }
    }

    #[inline]
    pub fn clear(&mut self) {
        self.entries.fill(L2Descriptor::EMPTY);
    }

    #[inline]
    #[must_use]
    pub const fn get(&self, i: L2Index) -> L2Descriptor {
        self.entries[i.as_usize()]
    }

    /// The live slot at `i`.
    #[inline]
    pub const fn get_mut(&mut self, i: L2Index) -> &mut L2Descriptor {
        &mut self.entries[i.as_usize()]
    }

    #[inline]
    pub const fn set(&mut self, i: L2Index, e: L2Descriptor) {
        self.entries[i.as_usize()] = e;
    }

    /// Write every field of the descriptor at `i`.
    #[inline]
    pub const fn fill_index(
        &mut self,
        i: L2Index,
        kind: L2Type,
        bufferable: bool,
        cacheable: bool,
        ap: AccessPermission,
        page: PageNumber,
    ) {
        self.set(i, L2Descriptor::encode(kind, bufferable, cacheable, ap, page));
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = L2Descriptor> + '_ {
        self.entries.iter().copied()
    }
}

const _: () = {
    assert!(size_of::<L2Descriptor>() == 4);
    assert!(size_of::<L2Table>() == L2_TABLE_SIZE as usize);
    assert!(align_of::<L2Table>() == L2_TABLE_SIZE as usize);
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_is_bits_19_to_12() {
        assert_eq!(L2Index::from(VirtualAddress::new(0x0000_0FFF)).as_usize(), 0);
        assert_eq!(L2Index::from(VirtualAddress::new(0x3EC4_5678)).as_usize(), 0x45);
        assert_eq!(L2Index::from(VirtualAddress::new(0xFFFF_FFFF)).as_usize(), 0xFF);
    }

    #[test]
    fn small_page_bit_layout() {
        let d = L2Descriptor::small(PageNumber::new(0x2_0201), AccessPermission::UserReadWrite);
        assert_eq!(d.into_bits(), 0x2020_1000 | 0xFF0 | 0b10);
        assert_eq!(d.kind(), L2Type::Small);
        assert_eq!(d.phys_page().base(), PhysicalAddress::new(0x2020_1000));
        assert!(d.ap_uniform());
    }

    #[test]
    fn empty_descriptor_is_kernel_only_nomap() {
        assert_eq!(L2Descriptor::EMPTY.into_bits(), 0x0000_0550);
        assert!(!L2Descriptor::EMPTY.is_mapped());
        assert_eq!(L2Descriptor::EMPTY.ap(), AccessPermission::KernelOnly);
    }

    #[test]
    fn unmapped_keeps_attributes_and_clears_base() {
        let d = L2Descriptor::encode(
            L2Type::Small,
            true,
            true,
            AccessPermission::UserReadOnly,
            PageNumber::new(0x1234),
        );
        let u = d.unmapped();
        assert_eq!(u.kind(), L2Type::NoMap);
        assert_eq!(u.page(), PageNumber::new(0));
        assert!(u.bufferable() && u.cacheable());
        assert_eq!(u.ap(), AccessPermission::UserReadOnly);
    }

    #[test]
    fn fill_then_get_reproduces_fields() {
        let mut table = L2Table::empty();
        let i = L2Index::new(0x80);
        table.fill_index(
            i,
            L2Type::Small,
            true,
            false,
            AccessPermission::NoAccess,
            PageNumber::new(0x7FFF),
        );
        let d = table.get(i);
        assert_eq!(d.kind(), L2Type::Small);
        assert!(d.bufferable());
        assert!(!d.cacheable());
        assert_eq!(d.ap(), AccessPermission::NoAccess);
        assert_eq!(d.page(), PageNumber::new(0x7FFF));
        assert_eq!(table.get(L2Index::new(0x81)), L2Descriptor::EMPTY);
    }
}
