use kernel_memory_addresses::{PageNumber, VirtualAddress};

/// Failure kinds of the paging core.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum MmuError {
    /// No free run of `count` pages aligned to `align` pages.
    #[error("out of memory: no free run of {count} page(s) aligned to {align}")]
    OutOfMemory { count: u32, align: u32 },

    /// The L1 or L2 descriptor for the address is unmapped.
    #[error("virtual address {0} is not mapped")]
    NotMapped(VirtualAddress),

    /// The page number lies beyond physical memory.
    #[error("page {0} is beyond physical memory")]
    OutOfRange(PageNumber),

    /// The address lies in the region reserved for the bootstrap window.
    #[error("virtual address {0} is reserved for the bootstrap window")]
    ReservedWindow(VirtualAddress),
}
