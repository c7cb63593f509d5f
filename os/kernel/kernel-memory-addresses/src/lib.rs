//! # Virtual and Physical Memory Address Types (32-bit ARM)
//!
//! Strongly typed wrappers for raw memory addresses, page bases and page
//! numbers used by the two-level ARM paging code.
//!
//! ## Overview
//!
//! The ARMv6 short-descriptor translation scheme works on a flat 32-bit
//! address space. The types in this crate keep virtual and physical addresses
//! apart at compile time while remaining zero-cost wrappers around `u32`.
//!
//! | Concept | Generic | Description |
//! |----------|----------|-------------|
//! | [`MemoryAddress`] | – | A raw 32-bit address, either physical or virtual. |
//! | [`MemoryPage<S>`] | [`S: PageSize`](PageSize) | A base address aligned to `S`. |
//! | [`MemoryAddressOffset<S>`] | [`S: PageSize`](PageSize) | An offset within a block of size `S`. |
//! | [`PageNumber`] | – | Index of a 4 KiB physical page (`address >> 12`). |
//!
//! These are wrapped to distinguish the two address spaces:
//!
//! | Wrapper | Meaning |
//! |----------|----------|
//! | [`VirtualAddress`] / [`VirtualPage<S>`] | Refer to translated memory. |
//! | [`PhysicalAddress`] / [`PhysicalPage<S>`] | Refer to physical memory or MMIO regions. |
//!
//! ## Granularities
//!
//! - [`Size1K`] — one second-level (L2) table; four of them share a page
//! - [`Size4K`] — a small page, the finest mapping granularity
//! - [`Size1M`] — the span covered by one first-level (L1) descriptor
//! - [`Size4M`] — the span covered by one page worth of L2 tables
//!
//! ## Typical Usage
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let va = VirtualAddress::new(0x4012_3456);
//!
//! let (page, off) = va.split::<Size4K>();
//! assert_eq!(page.base().as_u32(), 0x4012_3000);
//! assert_eq!(off.as_u32(), 0x456);
//! assert_eq!(page.join(off), va);
//!
//! let region = va.page::<Size4M>();
//! assert_eq!(region.base().as_u32(), 0x4000_0000);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(clippy::inline_always)]

mod memory_address;
mod memory_address_offset;
mod memory_page;
mod page_number;
mod page_size;
mod physical_address;
mod physical_page;
mod virtual_address;
mod virtual_page;

pub use memory_address::MemoryAddress;
pub use memory_address_offset::MemoryAddressOffset;
pub use memory_page::MemoryPage;
pub use page_number::PageNumber;
pub use page_size::{PageSize, Size1K, Size1M, Size4K, Size4M};
pub use physical_address::PhysicalAddress;
pub use physical_page::PhysicalPage;
pub use virtual_address::VirtualAddress;
pub use virtual_page::VirtualPage;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_and_join_4k() {
        let pa = PhysicalAddress::new(0x0123_4567);
        let (pp, off) = pa.split::<Size4K>();
        assert_eq!(pp.base().as_u32(), 0x0123_4000);
        assert_eq!(off.as_u32(), 0x567);
        assert_eq!(pp.join(off), pa);
    }

    #[test]
    fn region_alignment() {
        let va = VirtualAddress::new(0x3EFF_FFFF);
        assert_eq!(va.page::<Size1M>().base().as_u32(), 0x3EF0_0000);
        assert_eq!(va.page::<Size4M>().base().as_u32(), 0x3EC0_0000);
        assert_eq!(va.offset::<Size1K>().as_u32(), 0x3FF);
    }

    #[test]
    fn page_number_conversions() {
        let page = PageNumber::containing(PhysicalAddress::new(0x0000_A123));
        assert_eq!(page.as_u32(), 0xA);
        assert_eq!(page.base(), Some(PhysicalAddress::new(0xA000)));
        assert_eq!(PageNumber::new(0x10_0000).base(), None);
        assert_eq!((page + 3).as_u32(), 0xD);
    }

    #[test]
    fn display_formats() {
        assert_eq!(format!("{}", VirtualAddress::new(0x3EC0_0000)), "0x3EC00000");
        assert_eq!(format!("{:?}", PhysicalAddress::new(0x9000)), "PA(0x00009000)");
        assert_eq!(format!("{}", PageNumber::new(42)), "#42");
        assert_eq!(
            format!("{}", PhysicalAddress::new(0x4400).page::<Size1K>()),
            "0x00004400/1K"
        );
    }
}
