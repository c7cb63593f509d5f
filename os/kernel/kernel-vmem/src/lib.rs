//! # Virtual Memory Support
//!
//! Two-level ARMv6 paging for a bare-metal kernel.
//!
//! ## What you get
//! - Bit-exact [`L1Descriptor`] / [`L2Descriptor`] codecs and the
//!   [`L1Table`] / [`L2Table`] arrays they live in.
//! - An [`AddressSpace`] that creates, removes and resolves 4 KiB mappings
//!   below one L1 table.
//! - A [bootstrap window](bootstrap) that writes to physical pages which have
//!   no virtual mapping yet, through a single self-removing mapping.
//! - The seams the core needs from its environment: [`FrameAlloc`],
//!   [`PhysMapper`] and [`VirtMapper`].
//!
//! ## ARM Virtual Address → Physical Address Walk
//!
//! Each 32-bit virtual address is divided into three fields:
//!
//! ```text
//! | 31‒20 | 19‒12 | 11‒0   |
//! |  L1   |  L2   | Offset |
//! ```
//!
//! ```text
//!  TTBR0 → L1 table (4096 × 4 B, 16 KiB) → coarse L2 table (256 × 4 B, 1 KiB) → 4 KiB page
//!            │                               │
//!            └─► one entry per 1 MiB         └─► one entry per 4 KiB
//! ```
//!
//! | Level | Table | Entries | Covers per entry | Base in descriptor |
//! |:------|:------|:--------|:-----------------|:-------------------|
//! | 1 | L1 | 4096 | 1 MiB | L2 table address >> 10 |
//! | 2 | coarse L2 | 256 | 4 KiB | page number (address >> 12) |
//!
//! ### L2 pages and 4 MiB regions
//!
//! A coarse L2 table is 1 KiB, so one physical page holds four of them.
//! Whenever a mapping needs a new L2 table, a whole page is allocated and
//! its four quarters are linked into four consecutive L1 entries. A page of
//! L2 tables therefore always backs a 4 MiB aligned region.
//!
//! ### Translation off
//!
//! With SCTLR.M clear every address is physical. The core keeps working in
//! that state: table walks go straight through [`PhysMapper`] and the
//! bootstrap window is not needed.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code, clippy::inline_always)]

pub mod address_space;
pub mod bootstrap;
mod error;
pub mod page_table;

pub use crate::address_space::AddressSpace;
pub use crate::bootstrap::{BootstrapWindow, TemporaryMapping};
pub use crate::error::MmuError;
pub use crate::page_table::{
    AccessPermission, L1Descriptor, L1Index, L1Table, L1Type, L2Descriptor, L2Index, L2Table,
    L2Type, split_indices,
};

/// Re-export constants as info module.
pub use kernel_info::memory as info;

use kernel_memory_addresses::{PageNumber, PhysicalAddress, VirtualAddress};

/// Whether address translation is currently on.
///
/// Decides how the core reaches memory that is not a page table: directly
/// by physical address while translation is off, through the bootstrap
/// window once it is on.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TranslationRegime {
    /// SCTLR.M clear; virtual equals physical.
    Disabled,
    /// SCTLR.M set; accesses go through the current L1 table.
    Enabled,
}

impl TranslationRegime {
    #[inline]
    #[must_use]
    pub const fn from_enabled(enabled: bool) -> Self {
        if enabled { Self::Enabled } else { Self::Disabled }
    }
}

/// Minimal physical page allocator used to obtain pages for L2 tables.
///
/// Returns `None` on out-of-memory.
pub trait FrameAlloc {
    /// Allocate one 4 KiB *physical* page.
    fn alloc_page(&mut self) -> Option<PageNumber>;
}

/// Gives the paging core access to page-table memory by physical address.
///
/// The kernel identity-maps the low region holding its tables, so the
/// hardware implementation is a plain cast. Tests back it with a heap buffer.
///
/// # Safety
/// - `pa` must be reachable and writable through the returned reference
///   under the current translation regime.
/// - Lifetime `'a` is purely borrow-checked; the memory must remain valid
///   for `'a`.
/// - Type `T` must match the bytes at `pa` (no aliasing UB).
pub trait PhysMapper {
    /// Convert a *physical* address to a usable mutable reference.
    ///
    /// # Safety
    /// See the trait documentation.
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T;
}

/// Gives the paging core access to memory by *virtual* address.
///
/// Used for writes through the bootstrap window while translation is on.
pub trait VirtMapper {
    /// Convert a *virtual* address to a usable mutable reference.
    ///
    /// # Safety
    /// - `va` must be mapped writable in the current L1 table.
    /// - Type `T` must match the bytes at `va` (no aliasing UB).
    unsafe fn virt_to_mut<'a, T>(&self, va: VirtualAddress) -> &'a mut T;

    /// Drop any translation of `va` cached by this core.
    fn invalidate(&self, va: VirtualAddress);

    /// Drop every translation cached by this core.
    fn invalidate_all(&self);
}

/// Borrow the L1 table at `pa`.
///
/// # Safety
/// - `pa` must hold an L1 table and be 16 KiB aligned.
/// - No other reference to the table may be alive.
#[inline]
unsafe fn get_l1_table<'a, M: PhysMapper>(m: &M, pa: PhysicalAddress) -> &'a mut L1Table {
    unsafe { m.phys_to_mut::<L1Table>(pa) }
}

/// Borrow the coarse L2 table at `pa`.
///
/// # Safety
/// - `pa` must hold an L2 table and be 1 KiB aligned.
/// - No other reference to the table may be alive.
#[inline]
unsafe fn get_l2_table<'a, M: PhysMapper>(m: &M, pa: PhysicalAddress) -> &'a mut L2Table {
    unsafe { m.phys_to_mut::<L2Table>(pa) }
}

/// Align `x` down to the nearest multiple of `a`.
///
/// `a` must be a non-zero power of two.
///
/// ```rust
/// # use kernel_vmem::align_down;
/// assert_eq!(align_down(0x3EC0_1234, 0x1000), 0x3EC0_1000);
/// assert_eq!(align_down(0x4000, 0x4000), 0x4000);
/// ```
#[inline(always)]
#[must_use]
pub const fn align_down(x: u32, a: u32) -> u32 {
    x & !(a - 1)
}

/// Align `x` up to the nearest multiple of `a`, `None` on overflow.
///
/// `a` must be a non-zero power of two.
///
/// ```rust
/// # use kernel_vmem::align_up;
/// assert_eq!(align_up(1, 4096), Some(4096));
/// assert_eq!(align_up(4096, 4096), Some(4096));
/// assert_eq!(align_up(0xFFFF_F001, 4096), None);
/// ```
#[inline(always)]
#[must_use]
pub const fn align_up(x: u32, a: u32) -> Option<u32> {
    match x.checked_add(a - 1) {
        Some(v) => Some(v & !(a - 1)),
        None => None,
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Simulated physical memory for unit tests.

    use super::*;
    use crate::page_table::split_indices;
    use core::cell::Cell;
    use std::vec::Vec;

    /// A 16 KiB-aligned chunk, so an L1 table can live at physical 0.
    #[repr(C, align(16384))]
    pub struct Aligned16K([u8; 16384]);

    /// Heap-backed "physical RAM". Physical addresses are byte offsets
    /// from the start of the buffer.
    ///
    /// When `root` is set, virtual accesses walk the tables below it the
    /// way the hardware would and panic on a translation fault.
    pub struct TestPhys {
        frames: Vec<Aligned16K>,
        base: *mut u8,
        pub root: Cell<Option<PhysicalAddress>>,
        pub invalidations: Cell<usize>,
    }

    impl TestPhys {
        pub fn with_bytes(bytes: usize) -> Self {
            let chunks = bytes.div_ceil(16384);
            let mut frames: Vec<Aligned16K> =
                (0..chunks).map(|_| Aligned16K([0u8; 16384])).collect();
            let base = frames.as_mut_ptr().cast::<u8>();
            Self {
                frames,
                base,
                root: Cell::new(None),
                invalidations: Cell::new(0),
            }
        }

        pub fn len(&self) -> usize {
            self.frames.len() * 16384
        }

        pub fn read_u8(&self, pa: u32) -> u8 {
            assert!((pa as usize) < self.len());
            unsafe { self.base.add(pa as usize).read() }
        }

        fn read_u32(&self, pa: u32) -> u32 {
            assert!((pa as usize) + 4 <= self.len());
            unsafe { self.base.add(pa as usize).cast::<u32>().read() }
        }

        /// Hardware-style walk; panics on a translation fault.
        pub fn translate(&self, va: VirtualAddress) -> PhysicalAddress {
            let root = self.root.get().expect("translation enabled without a root");
            let (i1, i2) = split_indices(va);
            let l1 = L1Descriptor::from_bits(self.read_u32(root.as_u32() + 4 * i1.as_usize() as u32));
            assert_eq!(l1.kind(), L1Type::Coarse, "L1 translation fault at {va}");
            let l2 = L2Descriptor::from_bits(
                self.read_u32(l1.l2_table().as_u32() + 4 * i2.as_usize() as u32),
            );
            assert_eq!(l2.kind(), L2Type::Small, "L2 translation fault at {va}");
            l2.phys_page().join(va.offset())
        }
    }

    impl PhysMapper for TestPhys {
        unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
            let off = pa.as_u32() as usize;
            assert!(off + size_of::<T>() <= self.len(), "{pa} outside simulated RAM");
            unsafe { &mut *self.base.add(off).cast::<T>() }
        }
    }

    impl VirtMapper for TestPhys {
        unsafe fn virt_to_mut<'a, T>(&self, va: VirtualAddress) -> &'a mut T {
            let pa = self.translate(va);
            unsafe { self.phys_to_mut(pa) }
        }

        fn invalidate(&self, _va: VirtualAddress) {
            self.invalidations.set(self.invalidations.get() + 1);
        }

        fn invalidate_all(&self) {
            self.invalidations.set(self.invalidations.get() + 1);
        }
    }

    /// Hands out pages upwards from `next`.
    pub struct BumpAlloc {
        pub next: u32,
        pub end: u32,
    }

    impl FrameAlloc for BumpAlloc {
        fn alloc_page(&mut self) -> Option<PageNumber> {
            if self.next >= self.end {
                return None;
            }
            let page = PageNumber::new(self.next);
            self.next += 1;
            Some(page)
        }
    }
}
