//! # Page-Table Bootstrap
//!
//! New L1 and L2 tables live in pages fresh from the allocator. Those pages
//! usually have no virtual mapping yet, so once translation is on the
//! kernel cannot simply write to them. The bootstrap window solves this
//! with one reserved virtual page and one reserved 1 KiB L2 table:
//!
//! 1. point `L1[window]` at the reserved L2 slot and `slot[window]` at the
//!    target page (kernel-only),
//! 2. write the page through the window,
//! 3. reset both entries to unmapped.
//!
//! Steps 1 and 3 are the constructor and the `Drop` impl of
//! [`TemporaryMapping`], so the window is never left installed, whatever
//! way the writer exits. The whole sequence runs with IRQs masked and under
//! a global lock, since there is exactly one window.
//!
//! With translation off the window is not needed: the page is written
//! directly through its physical address.

use crate::page_table::{AccessPermission, L1Descriptor, L2Descriptor, L2Index, L2Table, L2Type};
use crate::{AddressSpace, MmuError, PhysMapper, TranslationRegime, VirtMapper, get_l2_table};
use core::fmt;
use kernel_info::memory::{MemoryLayout, PAGE_SIZE};
use kernel_memory_addresses::{PageNumber, PhysicalAddress, Size4M, VirtualAddress};
use kernel_sync::{IrqGuard, SpinLock, SpinLockGuard};
use log::trace;

/// One page worth of bytes as seen through the window.
pub type PageBytes = [u8; PAGE_SIZE as usize];

/// Serialises use of the single bootstrap window.
static WINDOW_LOCK: SpinLock<()> = SpinLock::new(());

/// Location of the bootstrap window.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BootstrapWindow {
    /// Physical address of the reserved 1 KiB L2 table.
    pub l2_slot: PhysicalAddress,
    /// Virtual address of the window page. 4 MiB aligned.
    pub va: VirtualAddress,
}

impl BootstrapWindow {
    #[inline]
    #[must_use]
    pub const fn from_layout(layout: &MemoryLayout) -> Self {
        Self {
            l2_slot: layout.temp_l2_slot,
            va: layout.temp_window,
        }
    }

    /// Returns `true` if `va` falls in the 4 MiB region reserved around the
    /// window. Regular mappings there could end up sharing its L1 entry.
    #[inline]
    #[must_use]
    pub const fn reserves(&self, va: VirtualAddress) -> bool {
        self.va.page::<Size4M>().contains(va)
    }
}

impl Default for BootstrapWindow {
    fn default() -> Self {
        Self::from_layout(&MemoryLayout::DEFAULT)
    }
}

/// The installed bootstrap window.
///
/// Created by [`AddressSpace::map_temporary`]; dropping it resets the
/// window's L2 and L1 entries to unmapped, then releases the window lock
/// and restores the IRQ state.
pub struct TemporaryMapping<'a, M: VirtMapper> {
    mapper: &'a M,
    l1: &'a mut L1Descriptor,
    l2: &'a mut L2Descriptor,
    va: VirtualAddress,
    page: PageNumber,
    // Drop order: unlock, then unmask.
    _lock: SpinLockGuard<'static, ()>,
    _irq: IrqGuard,
}

impl<M: VirtMapper> TemporaryMapping<'_, M> {
    /// Virtual address the target page is visible at.
    #[inline]
    #[must_use]
    pub const fn va(&self) -> VirtualAddress {
        self.va
    }

    /// The page mapped into the window.
    #[inline]
    #[must_use]
    pub const fn page(&self) -> PageNumber {
        self.page
    }

    /// The target page's bytes, through the window.
    #[inline]
    pub fn bytes_mut(&mut self) -> &mut PageBytes {
        // SAFETY: the window maps exactly one writable page while `self` lives.
        unsafe { self.mapper.virt_to_mut::<PageBytes>(self.va) }
    }
}

impl<M: VirtMapper> Drop for TemporaryMapping<'_, M> {
    fn drop(&mut self) {
        *self.l2 = L2Descriptor::EMPTY;
        *self.l1 = L1Descriptor::EMPTY;
        self.mapper.invalidate(self.va);
        trace!("bootstrap window: released page {}", self.page);
    }
}

impl<M: VirtMapper> fmt::Debug for TemporaryMapping<'_, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemporaryMapping")
            .field("va", &self.va)
            .field("page", &self.page)
            .finish_non_exhaustive()
    }
}

/// Copy `pattern` back to back across `dst`, `dst.len() / pattern.len()`
/// times. A trailing remainder is left untouched.
#[inline]
fn stamp(dst: &mut [u8], pattern: &[u8]) {
    if pattern.is_empty() {
        return;
    }
    for chunk in dst.chunks_exact_mut(pattern.len()) {
        chunk.copy_from_slice(pattern);
    }
}

impl<'m, M: PhysMapper + VirtMapper> AddressSpace<'m, M> {
    /// Install the bootstrap window over `page`.
    ///
    /// Blocks while another window is installed, then masks IRQs for the
    /// lifetime of the returned guard.
    ///
    /// # Errors
    /// - [`MmuError::OutOfRange`] if `page` has no 32-bit address.
    pub fn map_temporary(&self, page: PageNumber) -> Result<TemporaryMapping<'m, M>, MmuError> {
        page.base().ok_or(MmuError::OutOfRange(page))?;

        let irq = IrqGuard::new();
        let lock = WINDOW_LOCK.lock();

        let window = self.window();
        // SAFETY: the window lock makes these the only references to the
        // window's two slots.
        let l1 = unsafe { self.get_l1_desc(window.va) };
        *l1 = L1Descriptor::coarse(window.l2_slot);

        let slot: &'m mut L2Table = unsafe { get_l2_table(self.mapper(), window.l2_slot) };
        let index = L2Index::from(window.va);
        slot.fill_index(
            index,
            L2Type::Small,
            false,
            false,
            AccessPermission::KernelOnly,
            page,
        );
        let l2 = slot.get_mut(index);

        self.mapper().invalidate(window.va);
        trace!("bootstrap window: page {page} at {}", window.va);

        Ok(TemporaryMapping {
            mapper: self.mapper(),
            l1,
            l2,
            va: window.va,
            page,
            _lock: lock,
            _irq: irq,
        })
    }

    /// Fill `page` with `data` repeated back to back
    /// (`PAGE_SIZE / data.len()` copies).
    ///
    /// With translation on the page is written through the bootstrap window,
    /// which is gone again when this returns. With translation off it is
    /// written directly.
    ///
    /// # Errors
    /// - [`MmuError::OutOfRange`] if `page` has no 32-bit address.
    pub fn fill_page_with_data(
        &self,
        page: PageNumber,
        data: &[u8],
        regime: TranslationRegime,
    ) -> Result<(), MmuError> {
        match regime {
            TranslationRegime::Disabled => {
                let pa = page.base().ok_or(MmuError::OutOfRange(page))?;
                // SAFETY: with translation off every physical page is reachable.
                let bytes = unsafe { self.mapper().phys_to_mut::<PageBytes>(pa) };
                stamp(bytes, data);
            }
            TranslationRegime::Enabled => {
                let mut window = self.map_temporary(page)?;
                stamp(window.bytes_mut(), data);
            }
        }
        Ok(())
    }

    /// Stamp `page` with unmapped L1 descriptors.
    ///
    /// # Errors
    /// - [`MmuError::OutOfRange`] if `page` has no 32-bit address.
    pub fn fill_page_with_empty_l1_table(
        &self,
        page: PageNumber,
        regime: TranslationRegime,
    ) -> Result<(), MmuError> {
        let pattern = L1Descriptor::EMPTY.into_bits().to_ne_bytes();
        self.fill_page_with_data(page, &pattern, regime)
    }

    /// Stamp `page` with unmapped L2 descriptors (four empty L2 tables).
    ///
    /// # Errors
    /// - [`MmuError::OutOfRange`] if `page` has no 32-bit address.
    pub fn fill_page_with_empty_l2_table(
        &self,
        page: PageNumber,
        regime: TranslationRegime,
    ) -> Result<(), MmuError> {
        let pattern = L2Descriptor::EMPTY.into_bits().to_ne_bytes();
        self.fill_page_with_data(page, &pattern, regime)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::L1Type;
    use crate::test_support::TestPhys;

    const L1: u32 = 0x0000;
    const SLOT: u32 = 0x4000;
    const WINDOW: u32 = 0x0040_0000;

    fn window() -> BootstrapWindow {
        BootstrapWindow {
            l2_slot: PhysicalAddress::new(SLOT),
            va: VirtualAddress::new(WINDOW),
        }
    }

    #[test]
    fn stamp_repeats_and_leaves_remainder() {
        let mut buf = [0xEEu8; 10];
        stamp(&mut buf, &[1, 2, 3]);
        assert_eq!(buf, [1, 2, 3, 1, 2, 3, 1, 2, 3, 0xEE]);

        stamp(&mut buf, &[]);
        assert_eq!(buf[0], 1);
    }

    #[test]
    fn window_reserves_its_4m_region() {
        let w = BootstrapWindow::default();
        assert!(w.reserves(VirtualAddress::new(0x3EC0_0000)));
        assert!(w.reserves(VirtualAddress::new(0x3EFF_FFFF)));
        assert!(!w.reserves(VirtualAddress::new(0x3F00_0000)));
        assert!(!w.reserves(VirtualAddress::new(0x3EBF_FFFF)));
    }

    #[test]
    fn fill_with_translation_off_writes_physically() {
        let phys = TestPhys::with_bytes(64 * 1024);
        let space = AddressSpace::from_root(&phys, PhysicalAddress::new(L1), window());

        space
            .fill_page_with_data(PageNumber::new(9), &[0xAB, 0xCD], TranslationRegime::Disabled)
            .unwrap();

        assert_eq!(phys.read_u8(0x9000), 0xAB);
        assert_eq!(phys.read_u8(0x9FFF), 0xCD);
        assert_eq!(phys.read_u8(0xA000), 0);
        assert_eq!(phys.invalidations.get(), 0, "no window without translation");
    }

    #[test]
    fn fill_through_window_touches_only_window_entries() {
        let phys = TestPhys::with_bytes(64 * 1024);
        let space = AddressSpace::from_root(&phys, PhysicalAddress::new(L1), window());
        phys.root.set(Some(PhysicalAddress::new(L1)));

        let l1_before: Vec<u8> = (0..0x4400).map(|pa| phys.read_u8(pa)).collect();

        space
            .fill_page_with_empty_l2_table(PageNumber::new(0xC), TranslationRegime::Enabled)
            .unwrap();

        // The target page carries the empty L2 pattern.
        assert_eq!(phys.read_u8(0xC000), 0x50);
        assert_eq!(phys.read_u8(0xC001), 0x05);
        assert_eq!(phys.read_u8(0xCFFC), 0x50);

        // L1 table and slot are byte-for-byte what they were, except that the
        // window's L2 slot entry now holds the empty descriptor.
        let l1_after: Vec<u8> = (0..0x4400).map(|pa| phys.read_u8(pa)).collect();
        for (pa, (before, after)) in l1_before.iter().zip(&l1_after).enumerate() {
            let slot_entry = SLOT as usize + 4 * L2Index::from(VirtualAddress::new(WINDOW)).as_usize();
            if (slot_entry..slot_entry + 4).contains(&pa) {
                continue;
            }
            assert_eq!(before, after, "byte {pa:#x} changed");
        }

        let l1 = unsafe { space.get_l1_desc(VirtualAddress::new(WINDOW)) };
        assert_eq!(l1.kind(), L1Type::NoMap);
        let slot: &L2Table = unsafe { get_l2_table(&phys, PhysicalAddress::new(SLOT)) };
        assert_eq!(slot.get(L2Index::from(VirtualAddress::new(WINDOW))), L2Descriptor::EMPTY);

        // Installed once, torn down once.
        assert_eq!(phys.invalidations.get(), 2);
    }

    #[test]
    fn window_is_torn_down_when_the_writer_panics() {
        let phys = TestPhys::with_bytes(64 * 1024);
        let space = AddressSpace::from_root(&phys, PhysicalAddress::new(L1), window());
        phys.root.set(Some(PhysicalAddress::new(L1)));

        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut w = space.map_temporary(PageNumber::new(0xD)).unwrap();
            w.bytes_mut()[0] = 1;
            panic!("writer failed");
        }));
        assert!(res.is_err());

        let l1 = unsafe { space.get_l1_desc(VirtualAddress::new(WINDOW)) };
        assert_eq!(*l1, L1Descriptor::EMPTY);
        assert_eq!(phys.read_u8(0xD000), 1);

        // The lock was released: the window can be installed again.
        drop(space.map_temporary(PageNumber::new(0xE)).unwrap());
    }

    #[test]
    fn out_of_range_page_is_rejected() {
        let phys = TestPhys::with_bytes(64 * 1024);
        let space = AddressSpace::from_root(&phys, PhysicalAddress::new(L1), window());
        let page = PageNumber::new(0x10_0000);
        assert_eq!(
            space.fill_page_with_data(page, &[0], TranslationRegime::Disabled),
            Err(MmuError::OutOfRange(page))
        );
    }
}
