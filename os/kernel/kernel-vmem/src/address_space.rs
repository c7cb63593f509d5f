//! # Address Space (ARM, L1-rooted)
//!
//! Strongly-typed helpers to build and manipulate a **single** virtual address
//! space: the two-level tree below one L1 table.
//!
//! ## Highlights
//!
//! - [`AddressSpace::create_map`] installs one 4 KiB mapping, allocating and
//!   linking a page of L2 tables for the surrounding 4 MiB region first if
//!   needed.
//! - [`AddressSpace::remove_map`] clears one mapping.
//! - [`AddressSpace::query`] translates a VA to a PA the way the hardware does.
//! - [`AddressSpace::get_l1_desc`] / [`AddressSpace::get_l2_desc`] hand out
//!   the live descriptor slots.
//!
//! ## Design
//!
//! - Every descriptor lives in domain 0; permissions come from the `AP`
//!   bits alone.
//! - Mappings are uncached and unbuffered.
//! - Pages of L2 tables are never reclaimed, even once every mapping in
//!   their region is gone.
//! - The 4 MiB region around the bootstrap window is off limits.
//!
//! ## Safety
//!
//! - Mutating active mappings may leave stale TLB entries; invalidating
//!   them is the caller's business.
//! - The provided `PhysMapper` must yield **writable** references to table
//!   memory.

use crate::bootstrap::BootstrapWindow;
use crate::page_table::{
    AccessPermission, L1Descriptor, L1Index, L1Type, L2_TABLE_SIZE, L2_TABLES_PER_PAGE,
    L2Descriptor, L2Index, L1Table, L2Type,
};
use crate::{FrameAlloc, MmuError, PhysMapper, TranslationRegime, VirtMapper, get_l1_table, get_l2_table};
use kernel_memory_addresses::{PageNumber, PhysicalAddress, Size4M, VirtualAddress};
use log::{debug, trace};

/// Handle to a single, concrete address space.
pub struct AddressSpace<'m, M: PhysMapper> {
    root: PhysicalAddress,
    mapper: &'m M,
    window: BootstrapWindow,
}

impl<'m, M: PhysMapper> AddressSpace<'m, M> {
    /// An address space rooted at the L1 table at `root` (16 KiB aligned).
    #[inline]
    pub const fn from_root(mapper: &'m M, root: PhysicalAddress, window: BootstrapWindow) -> Self {
        debug_assert!(root.as_u32().is_multiple_of(16 * 1024), "L1 table must be 16K-aligned");
        Self {
            root,
            mapper,
            window,
        }
    }

    /// Physical address of the L1 table.
    #[inline]
    pub const fn root(&self) -> PhysicalAddress {
        self.root
    }

    #[inline]
    pub const fn mapper(&self) -> &'m M {
        self.mapper
    }

    #[inline]
    pub const fn window(&self) -> BootstrapWindow {
        self.window
    }

    /// Borrow the L1 table.
    ///
    /// # Safety
    /// No other reference into the table may be alive while the result is.
    #[inline]
    pub(crate) unsafe fn l1_table_mut(&self) -> &'m mut L1Table {
        unsafe { get_l1_table(self.mapper, self.root) }
    }

    /// The live L1 slot for `va`.
    ///
    /// # Safety
    /// No other reference to the same slot may be alive while the result is.
    #[inline]
    pub unsafe fn get_l1_desc(&self, va: VirtualAddress) -> &'m mut L1Descriptor {
        let table = unsafe { self.l1_table_mut() };
        table.get_mut(L1Index::from(va))
    }

    /// The live L2 slot for `va`.
    ///
    /// # Errors
    /// - [`MmuError::NotMapped`] if the L1 entry for `va` has no L2 table.
    ///
    /// # Safety
    /// No other reference to the same slot may be alive while the result is.
    #[inline]
    pub unsafe fn get_l2_desc(&self, va: VirtualAddress) -> Result<&'m mut L2Descriptor, MmuError> {
        let l1 = unsafe { self.l1_table_mut() }.get(L1Index::from(va));
        if !l1.is_coarse() {
            return Err(MmuError::NotMapped(va));
        }
        let table = unsafe { get_l2_table(self.mapper, l1.l2_table()) };
        Ok(table.get_mut(L2Index::from(va)))
    }

    /// Translate `va` to a physical address by walking the tables.
    ///
    /// # Errors
    /// - [`MmuError::NotMapped`] if either level has no mapping for `va`.
    pub fn query(&self, va: VirtualAddress) -> Result<PhysicalAddress, MmuError> {
        // SAFETY: both references are dropped before returning.
        let l2 = unsafe { self.get_l2_desc(va) }?;
        if !l2.is_mapped() {
            return Err(MmuError::NotMapped(va));
        }
        Ok(l2.phys_page().join(va.offset()))
    }

    /// Clear the mapping of the page containing `va`.
    ///
    /// The descriptor becomes type no-map with base 0; its L2 page stays.
    ///
    /// # Errors
    /// - [`MmuError::ReservedWindow`] if `va` is inside the bootstrap region.
    /// - [`MmuError::NotMapped`] if nothing was mapped at `va`.
    pub fn remove_map(&self, va: VirtualAddress) -> Result<(), MmuError> {
        if self.window.reserves(va) {
            return Err(MmuError::ReservedWindow(va));
        }

        let l2 = unsafe { self.get_l2_desc(va) }?;
        if !l2.is_mapped() {
            return Err(MmuError::NotMapped(va));
        }
        let old = l2.page();
        *l2 = l2.unmapped();
        trace!("unmapped {va} (was page {old})");
        Ok(())
    }

    /// Returns `true` if the 4 MiB region containing `va` has L2 tables.
    #[must_use]
    pub fn has_region(&self, va: VirtualAddress) -> bool {
        let base = va.page::<Size4M>().base();
        unsafe { self.l1_table_mut() }.get(L1Index::from(base)).is_coarse()
    }

    /// Link the four L2 tables in `page` into the L1 entries of the 4 MiB
    /// region that starts at `region`.
    fn link_region(&self, region: VirtualAddress, table_page: PhysicalAddress) {
        let l1 = unsafe { self.l1_table_mut() };
        let first = L1Index::from(region);
        for quarter in 0..L2_TABLES_PER_PAGE {
            let l2_table = table_page + u32::from(quarter) * L2_TABLE_SIZE;
            l1.fill_index(first.offset(quarter), L1Type::Coarse, 0, false, l2_table);
        }
    }
}

impl<M: PhysMapper + VirtMapper> AddressSpace<'_, M> {
    /// Map the page containing `va` to the page containing `pa`.
    ///
    /// If the 4 MiB region around `va` has no L2 tables yet, one page is
    /// taken from `alloc`, stamped with empty L2 tables and linked into the
    /// four L1 entries of the region. Mapping an already mapped page
    /// replaces the old mapping.
    ///
    /// # Errors
    /// - [`MmuError::ReservedWindow`] if `va` is inside the bootstrap region.
    /// - [`MmuError::OutOfMemory`] if `alloc` has no page for the L2 tables.
    /// - [`MmuError::OutOfRange`] if the allocated page has no address.
    pub fn create_map<A: FrameAlloc>(
        &self,
        alloc: &mut A,
        pa: PhysicalAddress,
        va: VirtualAddress,
        ap: AccessPermission,
        regime: TranslationRegime,
    ) -> Result<(), MmuError> {
        if self.window.reserves(va) {
            return Err(MmuError::ReservedWindow(va));
        }

        if !self.has_region(va) {
            let region = va.page::<Size4M>().base();
            let page = alloc
                .alloc_page()
                .ok_or(MmuError::OutOfMemory { count: 1, align: 1 })?;
            let table_page = page.base().ok_or(MmuError::OutOfRange(page))?;

            self.fill_page_with_empty_l2_table(page, regime)?;
            self.link_region(region, table_page);
            debug!("L2 tables for region {region} in page {page}");
        }

        let l2 = unsafe { self.get_l2_desc(va) }?;
        let page = PageNumber::containing(pa);
        if l2.is_mapped() && l2.page() != page {
            trace!("remapping {va}: page {} -> {page}", l2.page());
        }
        *l2 = L2Descriptor::encode(L2Type::Small, false, false, ap, page);
        trace!("mapped {va} -> {pa} ({ap:?})");
        Ok(())
    }
}
