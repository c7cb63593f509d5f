//! # Identity-mapped Physical Memory
//!
//! The kernel identity-maps the low part of RAM that holds its control
//! structures (L1 table, L2 tables, PAT, bootstrap slot), so a physical
//! address in that range is also a usable pointer, whether translation is
//! on or off.
//!
//! Memory outside the identity map is reached through the bootstrap window
//! instead; see [`kernel_vmem::bootstrap`].

use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
use kernel_registers::{invalidate_tlb_all, invalidate_tlb_entry};
use kernel_vmem::{PhysMapper, VirtMapper};

/// [`PhysMapper`] for an identity-mapped kernel: `pa` is used as a pointer.
///
/// # Safety
/// - The referenced physical range must be identity-mapped (or translation
///   must be off).
/// - The returned references must only be used for valid, writable memory.
#[derive(Debug, Default, Copy, Clone)]
pub struct IdentityPhysMapper;

impl PhysMapper for IdentityPhysMapper {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let ptr = pa.as_u32() as usize as *mut T;
        // SAFETY: Caller must ensure the physical address is identity-mapped.
        unsafe { &mut *ptr }
    }
}

impl VirtMapper for IdentityPhysMapper {
    unsafe fn virt_to_mut<'a, T>(&self, va: VirtualAddress) -> &'a mut T {
        let ptr = va.as_u32() as usize as *mut T;
        // SAFETY: Caller must ensure `va` is mapped in the active table.
        unsafe { &mut *ptr }
    }

    #[inline]
    fn invalidate(&self, va: VirtualAddress) {
        // SAFETY: the paging code runs in a privileged mode.
        unsafe { invalidate_tlb_entry(va) }
    }

    #[inline]
    fn invalidate_all(&self) {
        // SAFETY: the paging code runs in a privileged mode.
        unsafe { invalidate_tlb_all() }
    }
}
