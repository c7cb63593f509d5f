//! # MMU Context
//!
//! [`Mmu`] owns everything the paging core needs at run time: the page
//! allocation table, access to physical memory, the translation control
//! registers and the memory layout. It is built once by [`Mmu::init`] and
//! passed around explicitly; a kernel that shares it between execution
//! contexts wraps it in a [`SpinLock`](kernel_sync::SpinLock) and takes it
//! with `lock_irq`.
//!
//! ## Translation regimes
//!
//! Every operation works with translation on or off. The regime is read
//! back from SCTLR each time, never cached:
//!
//! - off: [`Mmu::get_phys_addr`] is the identity, new table pages are
//!   written directly,
//! - on: addresses are resolved by walking the current L1 table, new table
//!   pages are written through the bootstrap window and every changed
//!   mapping is dropped from the TLB.

use crate::frame_alloc::PageAllocationTable;
use kernel_info::memory::{
    IO_BYTES, IO_PHYS_BASE, IO_VIRT_BASE, KERNEL_IDENTITY_BYTES, MemoryLayout, PAGE_SHIFT,
    PAGE_SIZE,
};
use kernel_memory_addresses::{PageNumber, PhysicalAddress, VirtualAddress};
use kernel_registers::{ControlRegisters, Dacr, DomainAccess, L1_TABLE_ALIGN, Ttbr0};
use kernel_vmem::{
    AccessPermission, AddressSpace, BootstrapWindow, FrameAlloc, L1Table, L2Table, MmuError,
    PhysMapper, TranslationRegime, VirtMapper,
};
use log::{debug, info, trace, warn};

/// Pages occupied by one L1 table.
pub const L1_TABLE_PAGES: u32 = L1_TABLE_ALIGN / PAGE_SIZE;

/// The MMU of the executing core plus the state the paging core keeps.
pub struct Mmu<'m, M, R>
where
    M: PhysMapper + VirtMapper,
    R: ControlRegisters,
{
    mapper: &'m M,
    registers: R,
    layout: MemoryLayout,
    pat: PageAllocationTable<'m>,
}

/// Source of L2 table pages.
///
/// Table entries are written through the identity map, so a table page
/// must lie below `limit`, the end of the identity-mapped RAM.
struct TablePages<'p, 'a> {
    pat: &'p mut PageAllocationTable<'a>,
    limit: PageNumber,
}

impl FrameAlloc for TablePages<'_, '_> {
    fn alloc_page(&mut self) -> Option<PageNumber> {
        let page = FrameAlloc::alloc_page(&mut *self.pat)?;
        if page < self.limit {
            return Some(page);
        }
        warn!("MMU: no identity-mapped page left for L2 tables ({page} is past the map)");
        self.pat.dealloc_page(page);
        None
    }
}

/// Borrow the PAT words described by `layout`.
///
/// # Safety
/// `layout.pat` must be reachable through `mapper` and hold
/// `layout.pat_words()` words that nothing else references.
unsafe fn pat_words<'m, M: PhysMapper>(mapper: &'m M, layout: &MemoryLayout) -> &'m mut [u32] {
    let first: &'m mut u32 = unsafe { mapper.phys_to_mut(layout.pat) };
    unsafe { core::slice::from_raw_parts_mut(core::ptr::from_mut(first), layout.pat_words()) }
}

impl<'m, M, R> Mmu<'m, M, R>
where
    M: PhysMapper + VirtMapper,
    R: ControlRegisters,
{
    /// Set up the paging core from scratch.
    ///
    /// - the PAT is cleared, then the low reserved region, the L1 table,
    ///   the PAT itself and the bootstrap slot are marked allocated,
    /// - the L1 table at `layout.l1_table` is reset to all unmapped,
    /// - the bootstrap slot is reset to empty,
    /// - TTBR0 points at the L1 table and domain 0 is made a client.
    ///
    /// # Safety
    /// - Translation must be off.
    /// - The memory named by `layout` must be reachable through `mapper` and
    ///   must not be referenced by anyone else for `'m`.
    pub unsafe fn init(mapper: &'m M, registers: R, layout: MemoryLayout) -> Self {
        debug_assert!(
            !registers.read_control_register().m_mmu_enable(),
            "paging core initialised with translation on"
        );

        let mut pat = PageAllocationTable::new(unsafe { pat_words(mapper, &layout) }, layout.total_pages());
        pat.clear();
        pat.reserve(PageNumber::new(0), layout.reserved_low_pages());
        pat.reserve(PageNumber::containing(layout.l1_table), L1_TABLE_PAGES);
        pat.reserve(PageNumber::containing(layout.pat), layout.pat_pages());
        pat.reserve(PageNumber::containing(layout.temp_l2_slot), 1);

        unsafe { mapper.phys_to_mut::<L1Table>(layout.l1_table) }.clear();
        unsafe { mapper.phys_to_mut::<L2Table>(layout.temp_l2_slot) }.clear();

        unsafe {
            registers.write_translation_table_base(Ttbr0::from_table(layout.l1_table));
            registers.write_domain_access_control(Dacr::new().with_domain(0, DomainAccess::Client));
        }

        info!(
            "MMU: L1 table at {}, PAT at {} ({} of {} pages free)",
            layout.l1_table,
            layout.pat,
            pat.free_pages(),
            pat.total_pages()
        );

        Self {
            mapper,
            registers,
            layout,
            pat,
        }
    }

    #[inline]
    pub const fn layout(&self) -> &MemoryLayout {
        &self.layout
    }

    #[inline]
    pub const fn registers(&self) -> &R {
        &self.registers
    }

    /// Turn address translation on.
    ///
    /// # Safety
    /// The current L1 table must map the executing code, its stack and all
    /// live references at their current addresses.
    pub unsafe fn enable(&self) {
        let sctlr = self.registers.read_control_register();
        unsafe { self.registers.write_control_register(sctlr.with_m_mmu_enable(true)) };
        debug!("MMU: translation on, L1 table at {}", self.page_table_addr());
    }

    /// Turn address translation off.
    ///
    /// # Safety
    /// The executing code, its stack and all live references must be valid
    /// at their physical addresses.
    pub unsafe fn disable(&self) {
        let sctlr = self.registers.read_control_register();
        unsafe { self.registers.write_control_register(sctlr.with_m_mmu_enable(false)) };
        debug!("MMU: translation off");
    }

    /// Returns `true` if translation is on, as read from SCTLR.
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.registers.read_control_register().m_mmu_enable()
    }

    #[inline]
    pub fn regime(&self) -> TranslationRegime {
        TranslationRegime::from_enabled(self.is_enabled())
    }

    /// Physical address of the current L1 table, as read from TTBR0.
    #[inline]
    pub fn page_table_addr(&self) -> PhysicalAddress {
        self.registers.read_translation_table_base().table()
    }

    /// Make the L1 table at `table` current.
    ///
    /// # Safety
    /// `table` must hold a valid, 16 KiB aligned L1 table. With translation
    /// on it must map everything in use the same way the old one did.
    pub unsafe fn set_page_table_addr(&self, table: PhysicalAddress) {
        debug_assert!(table.as_u32().is_multiple_of(L1_TABLE_ALIGN));
        unsafe { self.registers.write_translation_table_base(Ttbr0::from_table(table)) };
        self.mapper.invalidate_all();
        trace!("MMU: switched to L1 table at {table}");
    }

    /// The address space rooted at the current L1 table.
    #[inline]
    pub fn address_space(&self) -> AddressSpace<'m, M> {
        AddressSpace::from_root(
            self.mapper,
            self.page_table_addr(),
            BootstrapWindow::from_layout(&self.layout),
        )
    }

    #[inline]
    pub const fn allocator(&self) -> &PageAllocationTable<'m> {
        &self.pat
    }

    #[inline]
    pub const fn allocator_mut(&mut self) -> &mut PageAllocationTable<'m> {
        &mut self.pat
    }

    /// Allocate one physical page.
    ///
    /// # Errors
    /// - [`MmuError::OutOfMemory`] if every page is taken.
    #[inline]
    pub fn alloc_page(&mut self) -> Result<PageNumber, MmuError> {
        self.pat.alloc_page()
    }

    /// Allocate `count` contiguous pages starting at a multiple of `align`.
    ///
    /// # Errors
    /// - [`MmuError::OutOfMemory`] if no such run is free.
    #[inline]
    pub fn alloc_pages_align(&mut self, count: u32, align: u32) -> Result<PageNumber, MmuError> {
        self.pat.alloc_pages_align(count, align)
    }

    #[inline]
    pub fn dealloc_page(&mut self, page: PageNumber) {
        self.pat.dealloc_page(page);
    }

    #[inline]
    pub fn dealloc_pages(&mut self, first: PageNumber, count: u32) {
        self.pat.dealloc_pages(first, count);
    }

    /// Physical base address of `page`.
    ///
    /// # Errors
    /// - [`MmuError::OutOfRange`] if `page` is beyond physical memory.
    #[inline]
    pub const fn page_number_to_address(&self, page: PageNumber) -> Result<PhysicalAddress, MmuError> {
        self.pat.page_number_to_address(page)
    }

    /// Map the page containing `va` to the page containing `pa` in the
    /// current address space.
    ///
    /// Pages for new L2 tables come from the identity-mapped part of RAM
    /// only, see [`map_boot_regions`](Self::map_boot_regions).
    ///
    /// # Errors
    /// - [`MmuError::ReservedWindow`] if `va` is in the bootstrap region.
    /// - [`MmuError::OutOfMemory`] if a page for new L2 tables is needed
    ///   and no identity-mapped page is free.
    pub fn create_map(
        &mut self,
        pa: PhysicalAddress,
        va: VirtualAddress,
        ap: AccessPermission,
    ) -> Result<(), MmuError> {
        let regime = self.regime();
        let space = self.address_space();
        let mut tables = TablePages {
            limit: PageNumber::new(self.identity_bytes() >> PAGE_SHIFT),
            pat: &mut self.pat,
        };
        space.create_map(&mut tables, pa, va, ap, regime)?;
        self.flush(va, regime);
        Ok(())
    }

    /// Remove the mapping of the page containing `va` from the current
    /// address space. The L2 tables of the region stay in place.
    ///
    /// # Errors
    /// - [`MmuError::ReservedWindow`] if `va` is in the bootstrap region.
    /// - [`MmuError::NotMapped`] if nothing was mapped at `va`.
    pub fn remove_map(&mut self, va: VirtualAddress) -> Result<(), MmuError> {
        let regime = self.regime();
        self.address_space().remove_map(va)?;
        self.flush(va, regime);
        Ok(())
    }

    /// Physical address `va` refers to.
    ///
    /// With translation off this is `va` itself, mapped or not.
    ///
    /// # Errors
    /// - [`MmuError::NotMapped`] if translation is on and `va` is unmapped.
    pub fn get_phys_addr(&self, va: VirtualAddress) -> Result<PhysicalAddress, MmuError> {
        if !self.is_enabled() {
            return Ok(PhysicalAddress::new(va.as_u32()));
        }
        self.address_space().query(va)
    }

    /// Map `len` bytes at `va` to the same number of bytes at `pa`, one
    /// page at a time. `len` is rounded up to whole pages; the range stops
    /// at the top of the address space.
    ///
    /// # Errors
    /// The first error of [`create_map`](Self::create_map). Pages mapped
    /// before it stay mapped.
    pub fn map_region(
        &mut self,
        pa: PhysicalAddress,
        va: VirtualAddress,
        len: u32,
        ap: AccessPermission,
    ) -> Result<(), MmuError> {
        debug_assert!(pa.as_u32().is_multiple_of(PAGE_SIZE) && va.as_u32().is_multiple_of(PAGE_SIZE));

        let pages = len.div_ceil(PAGE_SIZE);
        for n in 0..pages {
            let offset = n * PAGE_SIZE;
            let (Some(p), Some(v)) = (pa.checked_add(offset), va.checked_add(offset)) else {
                break;
            };
            self.create_map(p, v, ap)?;
        }
        debug!("MMU: mapped {va} -> {pa} ({pages} pages, {ap:?})");
        Ok(())
    }

    /// Remove every mapping in `len` bytes from `va`. Unmapped pages in the
    /// range are skipped.
    ///
    /// Returns the number of mappings removed.
    ///
    /// # Errors
    /// - [`MmuError::ReservedWindow`] if the range touches the bootstrap
    ///   region.
    pub fn unmap_region(&mut self, va: VirtualAddress, len: u32) -> Result<u32, MmuError> {
        let mut removed = 0;
        for n in 0..len.div_ceil(PAGE_SIZE) {
            let Some(v) = va.checked_add(n * PAGE_SIZE) else {
                break;
            };
            match self.remove_map(v) {
                Ok(()) => removed += 1,
                Err(MmuError::NotMapped(_)) => {}
                Err(e) => return Err(e),
            }
        }
        debug!("MMU: unmapped {removed} page(s) from {va}");
        Ok(removed)
    }

    /// Identity-map the kernel's RAM and map the peripheral block at its
    /// virtual base, both kernel-only.
    ///
    /// # Errors
    /// - [`MmuError::OutOfMemory`] if the L2 tables cannot be allocated.
    pub fn map_boot_regions(&mut self) -> Result<(), MmuError> {
        let kernel = self.identity_bytes();
        self.map_region(
            PhysicalAddress::zero(),
            VirtualAddress::zero(),
            kernel,
            AccessPermission::KernelOnly,
        )?;
        self.map_region(
            PhysicalAddress::new(IO_PHYS_BASE),
            VirtualAddress::new(IO_VIRT_BASE),
            IO_BYTES,
            AccessPermission::KernelOnly,
        )
    }

    /// Fill `page` with `data` repeated back to back.
    ///
    /// # Errors
    /// - [`MmuError::OutOfRange`] if `page` has no 32-bit address.
    #[inline]
    pub fn fill_page_with_data(&self, page: PageNumber, data: &[u8]) -> Result<(), MmuError> {
        self.address_space()
            .fill_page_with_data(page, data, self.regime())
    }

    /// Stamp `page` with unmapped L1 descriptors.
    ///
    /// # Errors
    /// - [`MmuError::OutOfRange`] if `page` has no 32-bit address.
    #[inline]
    pub fn fill_page_with_empty_l1_table(&self, page: PageNumber) -> Result<(), MmuError> {
        self.address_space()
            .fill_page_with_empty_l1_table(page, self.regime())
    }

    /// Stamp `page` with four empty L2 tables.
    ///
    /// # Errors
    /// - [`MmuError::OutOfRange`] if `page` has no 32-bit address.
    #[inline]
    pub fn fill_page_with_empty_l2_table(&self, page: PageNumber) -> Result<(), MmuError> {
        self.address_space()
            .fill_page_with_empty_l2_table(page, self.regime())
    }

    /// Allocate and clear a new L1 table.
    ///
    /// The table maps nothing; the caller decides what to map before making
    /// it current with [`set_page_table_addr`](Self::set_page_table_addr).
    ///
    /// # Errors
    /// - [`MmuError::OutOfMemory`] if no 16 KiB aligned run is free.
    pub fn create_address_space(&mut self) -> Result<PhysicalAddress, MmuError> {
        let first = self
            .pat
            .alloc_pages_align(L1_TABLE_PAGES, L1_TABLE_PAGES)?;

        for n in 0..L1_TABLE_PAGES {
            if let Err(e) = self.fill_page_with_empty_l1_table(first + n) {
                self.pat.dealloc_pages(first, L1_TABLE_PAGES);
                return Err(e);
            }
        }

        let table = self.pat.page_number_to_address(first)?;
        debug!("MMU: new L1 table at {table}");
        Ok(table)
    }

    /// Bytes of RAM the boot identity map covers.
    #[inline]
    const fn identity_bytes(&self) -> u32 {
        if KERNEL_IDENTITY_BYTES < self.layout.total_memory {
            KERNEL_IDENTITY_BYTES
        } else {
            self.layout.total_memory
        }
    }

    #[inline]
    fn flush(&self, va: VirtualAddress, regime: TranslationRegime) {
        if regime == TranslationRegime::Enabled {
            self.mapper.invalidate(va);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_pages_stay_below_the_identity_map() {
        let mut words = [0u32; 2];
        let mut pat = PageAllocationTable::new(&mut words, 64);
        pat.clear();
        pat.reserve(PageNumber::new(0), 30);

        let mut tables = TablePages {
            pat: &mut pat,
            limit: PageNumber::new(32),
        };
        assert_eq!(tables.alloc_page(), Some(PageNumber::new(30)));
        assert_eq!(tables.alloc_page(), Some(PageNumber::new(31)));
        assert_eq!(tables.alloc_page(), None);

        // The rejected page went back to the pool.
        assert!(!pat.is_allocated(PageNumber::new(32)));
        assert_eq!(pat.free_pages(), 32);
    }
}
