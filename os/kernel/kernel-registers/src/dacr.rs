#[cfg(all(feature = "asm", target_arch = "arm"))]
use crate::{LoadRegisterUnsafe, StoreRegisterUnsafe};
use bitfield_struct::bitfield;

/// Access type of one memory domain.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[repr(u8)]
pub enum DomainAccess {
    /// Any access generates a domain fault.
    NoAccess = 0b00,
    /// Accesses are checked against the descriptor's AP bits.
    Client = 0b01,
    /// Unpredictable on ARMv6; never programmed.
    Reserved = 0b10,
    /// Accesses are not checked; AP bits are ignored.
    Manager = 0b11,
}

impl DomainAccess {
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
            0b01 => Self::Client,
            0b10 => Self::Reserved,
            _ => Self::Manager,
        }
    }
}

/// Number of memory domains.
pub const DOMAIN_COUNT: u8 = 16;

/// DACR — Domain Access Control Register (CP15 c3).
///
/// Sixteen two-bit fields, one per domain. Every descriptor the paging
/// code writes uses domain 0.
#[bitfield(u32)]
pub struct Dacr {
    /// Bits 0–1 — domain 0.
    #[bits(2)]
    pub domain0: DomainAccess,

    /// Bits 2–31 — domains 1 to 15.
    #[bits(30)]
    _upper_domains: u32,
}

impl Dacr {
    /// Access type of domain `index` (`0..16`).
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn domain(&self, index: u8) -> DomainAccess {
        debug_assert!(index < DOMAIN_COUNT);
        let shift = u32::from(index % DOMAIN_COUNT) * 2;
        DomainAccess::from_bits(((self.into_bits() >> shift) & 0b11) as u8)
    }

    /// Returns a copy with domain `index` set to `access`.
    #[must_use]
    pub fn with_domain(self, index: u8, access: DomainAccess) -> Self {
        debug_assert!(index < DOMAIN_COUNT);
        let shift = u32::from(index % DOMAIN_COUNT) * 2;
        let bits = self.into_bits() & !(0b11 << shift);
        Self::from_bits(bits | (u32::from(access.into_bits()) << shift))
    }
}

#[cfg(all(feature = "asm", target_arch = "arm"))]
impl LoadRegisterUnsafe for Dacr {
    unsafe fn load_unsafe() -> Self {
        let dacr: u32;
        unsafe {
            core::arch::asm!("mrc p15, 0, {}, c3, c0, 0", out(reg) dacr, options(nomem, nostack, preserves_flags));
        }
        Self::from_bits(dacr)
    }
}

#[cfg(all(feature = "asm", target_arch = "arm"))]
impl StoreRegisterUnsafe for Dacr {
    unsafe fn store_unsafe(self) {
        let dacr = self.into_bits();
        unsafe {
            core::arch::asm!("mcr p15, 0, {}, c3, c0, 0", in(reg) dacr, options(nostack, preserves_flags));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_zero_client() {
        let dacr = Dacr::new().with_domain0(DomainAccess::Client);
        assert_eq!(dacr.into_bits(), 0b01);
        assert_eq!(dacr.domain(0), DomainAccess::Client);
    }

    #[test]
    fn indexed_domains_leave_neighbours_alone() {
        let dacr = Dacr::from_bits(u32::MAX).with_domain(5, DomainAccess::NoAccess);
        assert_eq!(dacr.domain(5), DomainAccess::NoAccess);
        assert_eq!(dacr.domain(4), DomainAccess::Manager);
        assert_eq!(dacr.domain(6), DomainAccess::Manager);
        assert_eq!(dacr.into_bits(), !(0b11 << 10));
    }
}
