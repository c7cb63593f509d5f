//! # Typed ARMv6 CP15 Registers
//!
//! Bit-level models of the system control coprocessor registers the paging
//! code touches, built with [`bitfield_struct`]:
//!
//! | Register | Type | Role |
//! |----------|------|------|
//! | SCTLR (c1) | [`Sctlr`] | Translation enable bit and cache controls. |
//! | TTBR0 (c2) | [`Ttbr0`] | Physical base of the current L1 table. |
//! | DACR (c3) | [`Dacr`] | Client/manager access type per domain. |
//! | TLB ops (c8) | [`invalidate_tlb_entry`] | Drop stale translations. |
//!
//! The raw `mrc`/`mcr` accessors sit behind [`LoadRegisterUnsafe`] and
//! [`StoreRegisterUnsafe`] and are only compiled for ARM targets with the
//! `asm` feature. Code that drives the registers goes through
//! [`ControlRegisters`] instead, so a simulated register file can stand in
//! for the coprocessor when testing on the host.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod dacr;
mod sctlr;
mod tlb;
mod ttbr0;

pub use dacr::{DOMAIN_COUNT, Dacr, DomainAccess};
pub use sctlr::Sctlr;
pub use tlb::{invalidate_tlb_all, invalidate_tlb_entry};
pub use ttbr0::{L1_TABLE_ALIGN, Ttbr0};

pub trait LoadRegisterUnsafe {
    /// # Safety
    /// The caller must uphold the implementation-specific safety requirements.
    /// For example, the register access might be privileged and require a
    /// privileged processor mode (SVC, IRQ, ...).
    unsafe fn load_unsafe() -> Self;
}

pub trait StoreRegisterUnsafe {
    /// # Safety
    /// The caller must uphold the implementation-specific safety requirements.
    /// Changing the translation regime affects every subsequent memory access.
    unsafe fn store_unsafe(self);
}

/// Access to the translation control registers.
///
/// Reads are side-effect free. Writes change how every following memory
/// access is translated and are therefore `unsafe`.
pub trait ControlRegisters {
    /// Current value of SCTLR.
    fn read_control_register(&self) -> Sctlr;

    /// Replace SCTLR.
    ///
    /// # Safety
    /// Toggling translation must leave the executing code, its stack and
    /// all live references valid under the new regime (for example by
    /// identity-mapping them).
    unsafe fn write_control_register(&self, value: Sctlr);

    /// Current value of TTBR0.
    fn read_translation_table_base(&self) -> Ttbr0;

    /// Replace TTBR0.
    ///
    /// # Safety
    /// If translation is enabled, the new table must map the executing code
    /// and every live reference the same way the old one did.
    unsafe fn write_translation_table_base(&self, value: Ttbr0);

    /// Current value of DACR.
    fn read_domain_access_control(&self) -> Dacr;

    /// Replace DACR.
    ///
    /// # Safety
    /// Revoking a domain in use while translation is enabled faults on the
    /// next access.
    unsafe fn write_domain_access_control(&self, value: Dacr);
}

/// The CP15 coprocessor of the executing core.
#[derive(Debug)]
pub struct Cp15 {
    _private: (),
}

impl Cp15 {
    /// # Safety
    /// CP15 registers are only accessible from a privileged mode. The
    /// returned handle must not be used from user mode.
    #[must_use]
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

#[cfg(all(feature = "asm", target_arch = "arm"))]
impl ControlRegisters for Cp15 {
    #[inline]
    fn read_control_register(&self) -> Sctlr {
        unsafe { Sctlr::load_unsafe() }
    }

    #[inline]
    unsafe fn write_control_register(&self, value: Sctlr) {
        unsafe { value.store_unsafe() }
    }

    #[inline]
    fn read_translation_table_base(&self) -> Ttbr0 {
        unsafe { Ttbr0::load_unsafe() }
    }

    #[inline]
    unsafe fn write_translation_table_base(&self, value: Ttbr0) {
        unsafe { value.store_unsafe() }
    }

    #[inline]
    fn read_domain_access_control(&self) -> Dacr {
        unsafe { Dacr::load_unsafe() }
    }

    #[inline]
    unsafe fn write_domain_access_control(&self, value: Dacr) {
        unsafe { value.store_unsafe() }
    }
}
