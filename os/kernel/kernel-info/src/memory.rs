//! # Memory Layout

use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};

/// log2 of the small page size.
pub const PAGE_SHIFT: u32 = 12;

/// Size of a small page in bytes.
pub const PAGE_SIZE: u32 = 1 << PAGE_SHIFT;

/// Physical memory managed by the page allocator.
pub const TOTAL_MEMORY: u32 = 128 * 1024 * 1024;

/// Physical address of the kernel's L1 translation table.
pub const KERNEL_L1_TABLE: u32 = 0x0000;

/// Physical address of the page allocation table.
pub const PAT_ADDRESS: u32 = 0x9000;

/// Physical address of the 1 KiB L2 table backing the bootstrap window.
pub const MMU_TEMP_L2_ADDR: u32 = 0xA000;

/// Virtual address of the bootstrap window.
///
/// Aligned to 4 MiB so that no regular mapping shares its L1 entries.
pub const MMU_TEMP_MAP: u32 = 0x3EC0_0000;

/// Bytes at the start of RAM reserved for the control structures above.
pub const RESERVED_LOW_BYTES: u32 = 0x1_0000;

/// Bytes of RAM the kernel identity-maps at boot.
pub const KERNEL_IDENTITY_BYTES: u32 = 16 * 1024 * 1024;

/// Physical base of the peripheral block.
pub const IO_PHYS_BASE: u32 = 0x2000_0000;

/// Virtual base the peripheral block is mapped to.
pub const IO_VIRT_BASE: u32 = 0x3F00_0000;

/// Bytes of peripheral space mapped at boot.
pub const IO_BYTES: u32 = 16 * 1024 * 1024;

/// Physical base of the PL011 UART.
pub const UART0_BASE: u32 = 0x2020_1000;

/// Addresses the paging core needs to find its control structures.
///
/// [`MemoryLayout::DEFAULT`] is the board layout. Tests build smaller ones
/// over simulated RAM.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct MemoryLayout {
    /// Bytes of physical memory covered by the allocation table.
    pub total_memory: u32,
    /// Physical address of the initial L1 table (16 KiB aligned).
    pub l1_table: PhysicalAddress,
    /// Physical address of the page allocation table.
    pub pat: PhysicalAddress,
    /// Physical address of the bootstrap L2 slot (1 KiB aligned).
    pub temp_l2_slot: PhysicalAddress,
    /// Virtual address of the bootstrap window (4 MiB aligned).
    pub temp_window: VirtualAddress,
    /// Bytes at the bottom of RAM that are never handed out.
    pub reserved_low_bytes: u32,
}

impl MemoryLayout {
    pub const DEFAULT: Self = Self {
        total_memory: TOTAL_MEMORY,
        l1_table: PhysicalAddress::new(KERNEL_L1_TABLE),
        pat: PhysicalAddress::new(PAT_ADDRESS),
        temp_l2_slot: PhysicalAddress::new(MMU_TEMP_L2_ADDR),
        temp_window: VirtualAddress::new(MMU_TEMP_MAP),
        reserved_low_bytes: RESERVED_LOW_BYTES,
    };

    /// Number of small pages in physical memory.
    #[must_use]
    pub const fn total_pages(&self) -> u32 {
        self.total_memory >> PAGE_SHIFT
    }

    /// Number of 32-bit words the allocation table occupies.
    #[must_use]
    pub const fn pat_words(&self) -> usize {
        self.total_pages().div_ceil(u32::BITS) as usize
    }

    /// Number of pages the allocation table spans, rounded up.
    #[must_use]
    pub const fn pat_pages(&self) -> u32 {
        self.total_pages()
            .div_ceil(u32::BITS)
            .saturating_mul(u32::BITS / 8)
            .div_ceil(PAGE_SIZE)
    }

    /// Number of pages covered by the low reservation, rounded up.
    #[must_use]
    pub const fn reserved_low_pages(&self) -> u32 {
        self.reserved_low_bytes.div_ceil(PAGE_SIZE)
    }
}

impl Default for MemoryLayout {
    fn default() -> Self {
        Self::DEFAULT
    }
}

const _: () = {
    assert!(KERNEL_L1_TABLE.is_multiple_of(16 * 1024));
    assert!(PAT_ADDRESS.is_multiple_of(PAGE_SIZE));
    assert!(MMU_TEMP_L2_ADDR.is_multiple_of(1024));
    assert!(MMU_TEMP_MAP.is_multiple_of(4 * 1024 * 1024));
    assert!(MMU_TEMP_L2_ADDR + 1024 <= RESERVED_LOW_BYTES);
    assert!(MMU_TEMP_MAP + 4 * 1024 * 1024 <= IO_VIRT_BASE);
    assert!(MMU_TEMP_MAP >= KERNEL_IDENTITY_BYTES);
    assert!(TOTAL_MEMORY.is_multiple_of(PAGE_SIZE));
    // The allocation table has to fit in its page.
    assert!(TOTAL_MEMORY / PAGE_SIZE / 8 <= PAGE_SIZE);
};
