//! # Kernel Page Allocation and MMU Control
//!
//! The run-time half of the paging core. Where `kernel-vmem` knows how
//! descriptors and tables look, this crate owns the state: which physical
//! pages are free, where the current L1 table is, and whether translation
//! is on.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  Mmu context                        │
//! │    • create_map / remove_map / get_phys_addr        │
//! │    • enable / disable / is_enabled (SCTLR)          │
//! │    • current L1 table (TTBR0), domain setup (DACR)  │
//! └──────────┬───────────────────────────┬──────────────┘
//!            │                           │
//! ┌──────────▼──────────────┐ ┌──────────▼──────────────┐
//! │  Page allocation table  │ │  Identity phys mapper   │
//! │  • 1 bit per 4 KiB page │ │  • PA used as pointer   │
//! │  • first-fit, aligned   │ │  • local TLB upkeep     │
//! └─────────────────────────┘ └─────────────────────────┘
//! ```
//!
//! ## Components
//!
//! - [`frame_alloc`]: the [`PageAllocationTable`], a bitmap allocator that
//!   lives at a fixed physical address and doubles as the
//!   [`FrameAlloc`](kernel_vmem::FrameAlloc) for new L2 tables.
//! - [`phys_mapper`]: [`IdentityPhysMapper`], which reaches table memory
//!   through the kernel's identity map.
//! - [`mmu`]: the [`Mmu`] context tying both to the control registers.
//!
//! ## Usage
//!
//! ```ignore
//! use kernel_alloc::{IdentityPhysMapper, Mmu};
//! use kernel_info::memory::MemoryLayout;
//! use kernel_registers::Cp15;
//! use kernel_vmem::AccessPermission;
//! use kernel_memory_addresses::VirtualAddress;
//! # fn boot() -> Result<(), kernel_vmem::MmuError> {
//!
//! static MAPPER: IdentityPhysMapper = IdentityPhysMapper;
//! let mut mmu = unsafe { Mmu::init(&MAPPER, Cp15::new(), MemoryLayout::DEFAULT) };
//! mmu.map_boot_regions()?;
//! unsafe { mmu.enable() };
//!
//! let page = mmu.alloc_page()?;
//! let pa = mmu.page_number_to_address(page)?;
//! mmu.create_map(pa, VirtualAddress::new(0x4000_0000), AccessPermission::UserReadWrite)?;
//! # Ok(()) }
//! ```
//!
//! ## Sharing
//!
//! The context is not internally synchronised. A kernel that reaches it
//! from more than one execution context keeps it in a [`SharedMmu`] and
//! takes it with [`SpinLock::lock_irq`], which masks IRQs for as long as
//! the guard lives.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod frame_alloc;
pub mod mmu;
pub mod phys_mapper;

pub use frame_alloc::PageAllocationTable;
pub use mmu::{L1_TABLE_PAGES, Mmu};
pub use phys_mapper::IdentityPhysMapper;

use kernel_sync::SpinLock;

/// An [`Mmu`] shared between execution contexts.
pub type SharedMmu<'m, M, R> = SpinLock<Mmu<'m, M, R>>;
