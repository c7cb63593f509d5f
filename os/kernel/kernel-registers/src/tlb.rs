//! TLB maintenance.

use kernel_memory_addresses::VirtualAddress;

/// Invalidate the unified TLB entry for the page containing `va`.
///
/// A no-op when not built for ARM with the `asm` feature.
///
/// # Safety
/// Must be executed from a privileged mode.
#[inline]
pub unsafe fn invalidate_tlb_entry(va: VirtualAddress) {
    #[cfg(all(feature = "asm", target_arch = "arm"))]
    unsafe {
        core::arch::asm!(
            "mcr p15, 0, {va}, c8, c7, 1",
            "mcr p15, 0, {zero}, c7, c10, 4",
            va = in(reg) va.as_u32() & !0xFFF,
            zero = in(reg) 0u32,
            options(nostack, preserves_flags)
        );
    }
    #[cfg(not(all(feature = "asm", target_arch = "arm")))]
    let _ = va;
}

/// Invalidate the whole unified TLB.
///
/// # Safety
/// Must be executed from a privileged mode.
#[inline]
pub unsafe fn invalidate_tlb_all() {
    #[cfg(all(feature = "asm", target_arch = "arm"))]
    unsafe {
        core::arch::asm!(
            "mcr p15, 0, {zero}, c8, c7, 0",
            "mcr p15, 0, {zero}, c7, c10, 4",
            zero = in(reg) 0u32,
            options(nostack, preserves_flags)
        );
    }
}
