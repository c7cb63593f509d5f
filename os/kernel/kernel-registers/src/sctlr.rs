#[cfg(all(feature = "asm", target_arch = "arm"))]
use crate::{LoadRegisterUnsafe, StoreRegisterUnsafe};
use bitfield_struct::bitfield;

/// SCTLR — System Control Register (CP15 c1, ARMv6).
///
/// Only the translation enable bit [`m_mmu_enable`](Self::m_mmu_enable)
/// matters to the paging code. All other bits are carried through a
/// read-modify-write unchanged, including the reserved ones.
#[bitfield(u32)]
pub struct Sctlr {
    /// Bit 0 — M: MMU enable.
    pub m_mmu_enable: bool,

    /// Bit 1 — A: strict alignment fault checking.
    pub a_alignment_check: bool,

    /// Bit 2 — C: L1 data cache enable.
    pub c_data_cache: bool,

    /// Bit 3 — W: write buffer enable.
    pub w_write_buffer: bool,

    /// Bits 4–6 — Reserved (read as one on ARM1176).
    #[bits(3)]
    _reserved_4_6: u8,

    /// Bit 7 — B: big-endian memory system (BE-32).
    pub b_big_endian: bool,

    /// Bit 8 — S: system protection (legacy, with R).
    pub s_system_protection: bool,

    /// Bit 9 — R: ROM protection (legacy, with S).
    pub r_rom_protection: bool,

    /// Bit 10 — F: implementation defined.
    pub f_impl_defined: bool,

    /// Bit 11 — Z: branch prediction enable.
    pub z_branch_prediction: bool,

    /// Bit 12 — I: L1 instruction cache enable.
    pub i_instruction_cache: bool,

    /// Bit 13 — V: high exception vectors at `0xFFFF_0000`.
    pub v_high_vectors: bool,

    /// Bit 14 — RR: predictable cache replacement strategy.
    pub rr_round_robin: bool,

    /// Bit 15 — L4: loads to PC do not set the T bit.
    pub l4_thumb_interworking: bool,

    /// Bits 16–21 — Reserved.
    #[bits(6)]
    _reserved_16_21: u8,

    /// Bit 22 — U: unaligned data access support.
    pub u_unaligned: bool,

    /// Bit 23 — XP: extended page tables, subpage AP bits disabled.
    ///
    /// The paging code writes identical `ap0..ap3` values, so descriptors
    /// stay valid with either setting.
    pub xp_extended_pages: bool,

    /// Bit 24 — VE: vectored interrupts.
    pub ve_vectored_interrupts: bool,

    /// Bit 25 — EE: CPSR E bit value on exception.
    pub ee_exception_endian: bool,

    /// Bits 26–31 — Reserved.
    #[bits(6)]
    _reserved_26_31: u8,
}

#[cfg(all(feature = "asm", target_arch = "arm"))]
impl LoadRegisterUnsafe for Sctlr {
    unsafe fn load_unsafe() -> Self {
        let sctlr: u32;
        unsafe {
            core::arch::asm!("mrc p15, 0, {}, c1, c0, 0", out(reg) sctlr, options(nomem, nostack, preserves_flags));
        }
        Self::from_bits(sctlr)
    }
}

#[cfg(all(feature = "asm", target_arch = "arm"))]
impl StoreRegisterUnsafe for Sctlr {
    unsafe fn store_unsafe(self) {
        let sctlr = self.into_bits();
        unsafe {
            // Flush the prefetch buffer so the next fetch sees the new regime.
            core::arch::asm!(
                "mcr p15, 0, {v}, c1, c0, 0",
                "mcr p15, 0, {z}, c7, c5, 4",
                v = in(reg) sctlr,
                z = in(reg) 0u32,
                options(nostack, preserves_flags)
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enable_bit_is_bit_zero() {
        let sctlr = Sctlr::new().with_m_mmu_enable(true);
        assert_eq!(sctlr.into_bits(), 1);
    }

    #[test]
    fn read_modify_write_preserves_other_bits() {
        // Caches, branch prediction, XP and the reserved bits set.
        let raw = 0x00C5_1878;
        let sctlr = Sctlr::from_bits(raw);
        assert!(!sctlr.m_mmu_enable());
        assert!(sctlr.xp_extended_pages());
        assert!(sctlr.i_instruction_cache());

        let enabled = sctlr.with_m_mmu_enable(true);
        assert_eq!(enabled.into_bits(), raw | 1);
        assert_eq!(enabled.with_m_mmu_enable(false).into_bits(), raw);
    }
}
