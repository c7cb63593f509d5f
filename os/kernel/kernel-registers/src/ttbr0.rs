#[cfg(all(feature = "asm", target_arch = "arm"))]
use crate::{LoadRegisterUnsafe, StoreRegisterUnsafe};
use bitfield_struct::bitfield;
use kernel_memory_addresses::PhysicalAddress;

/// Alignment of an L1 translation table.
pub const L1_TABLE_ALIGN: u32 = 16 * 1024;

/// TTBR0 — Translation Table Base Register 0 (CP15 c2, ARMv6, TTBCR.N = 0).
///
/// Holds the physical base of the current L1 table plus the cacheability
/// attributes of table walks.
#[bitfield(u32)]
pub struct Ttbr0 {
    /// Bit 0 — C: table walks are inner cacheable.
    pub c_cacheable: bool,

    /// Bit 1 — S: table walks are shareable.
    pub s_shareable: bool,

    /// Bit 2 — P: ECC enabled (implementation defined).
    pub p_ecc: bool,

    /// Bits 3–4 — RGN: outer cacheability of table walks.
    #[bits(2)]
    pub rgn_outer_cache: u8,

    /// Bits 5–13 — Should be zero.
    #[bits(9)]
    _sbz: u16,

    /// Bits 14–31 — L1 table physical base >> 14.
    #[bits(18)]
    base_16k: u32,
}

impl Ttbr0 {
    /// Create a `Ttbr0` value pointing at the L1 table at `table`.
    ///
    /// `table` must be 16 KiB aligned; the low bits are dropped.
    #[must_use]
    pub const fn from_table(table: PhysicalAddress) -> Self {
        debug_assert!(
            table.as_u32().is_multiple_of(L1_TABLE_ALIGN),
            "L1 table must be 16K-aligned"
        );
        Self::new().with_base_16k(table.as_u32() >> 14)
    }

    /// Physical address of the L1 table.
    #[must_use]
    pub const fn table(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.base_16k() << 14)
    }
}

#[cfg(all(feature = "asm", target_arch = "arm"))]
impl LoadRegisterUnsafe for Ttbr0 {
    unsafe fn load_unsafe() -> Self {
        let ttbr0: u32;
        unsafe {
            core::arch::asm!("mrc p15, 0, {}, c2, c0, 0", out(reg) ttbr0, options(nomem, nostack, preserves_flags));
        }
        Self::from_bits(ttbr0)
    }
}

#[cfg(all(feature = "asm", target_arch = "arm"))]
impl StoreRegisterUnsafe for Ttbr0 {
    unsafe fn store_unsafe(self) {
        let ttbr0 = self.into_bits();
        unsafe {
            core::arch::asm!("mcr p15, 0, {}, c2, c0, 0", in(reg) ttbr0, options(nostack, preserves_flags));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_base_round_trip() {
        let ttbr = Ttbr0::from_table(PhysicalAddress::new(0x0010_C000));
        assert_eq!(ttbr.into_bits(), 0x0010_C000);
        assert_eq!(ttbr.table(), PhysicalAddress::new(0x0010_C000));
    }

    #[test]
    fn attributes_do_not_leak_into_base() {
        let ttbr = Ttbr0::from_bits(0x0000_4000 | 0b1_1011);
        assert!(ttbr.c_cacheable());
        assert!(ttbr.s_shareable());
        assert_eq!(ttbr.rgn_outer_cache(), 0b11);
        assert_eq!(ttbr.table(), PhysicalAddress::new(0x4000));
    }
}
