//! # Kernel Memory Configuration
//!
//! Compile-time layout constants for the ARM two-level paging core, and the
//! [`MemoryLayout`](memory::MemoryLayout) record that hands them to it.
//!
//! ## Physical Layout
//!
//! The low 64 KiB of RAM hold the translation control structures. They are
//! marked allocated before the page allocator hands out anything.
//!
//! ```text
//! 0x0000_0000 ┌─────────────────────────────────┐
//!             │   Kernel L1 table (16 KiB)      │
//! 0x0000_4000 ├─────────────────────────────────┤
//!             │   Spare                         │
//! 0x0000_9000 ├─────────────────────────────────┤
//!             │   Page allocation table (PAT)   │
//! 0x0000_A000 ├─────────────────────────────────┤
//!             │   Temporary L2 slot (1 KiB)     │
//!             ├─────────────────────────────────┤
//!             │   Spare                         │
//! 0x0001_0000 ├─────────────────────────────────┤
//!             │   Kernel image and free RAM     │
//! 0x0800_0000 └─────────────────────────────────┘
//! ```
//!
//! ## Virtual Layout
//!
//! The kernel identity-maps the first 16 MiB. Peripherals at physical
//! `0x2000_0000` appear at virtual `0x3F00_0000`. The 4 MiB right below the
//! peripheral window belongs to the bootstrap window and is never handed to
//! regular mappings.
//!
//! ```rust
//! use kernel_info::memory::{MemoryLayout, PAGE_SIZE};
//!
//! let layout = MemoryLayout::DEFAULT;
//! assert_eq!(layout.total_pages(), 32 * 1024);
//! assert_eq!(layout.reserved_low_pages() * PAGE_SIZE, 0x1_0000);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod memory;
