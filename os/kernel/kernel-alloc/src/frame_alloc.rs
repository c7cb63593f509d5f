//! # Physical Page Allocator
//!
//! A bitmap over every 4 KiB page of physical memory, one bit per page,
//! `1` meaning allocated. Page `n` lives in word `n >> 5` under mask
//! `1 << (n & 31)`.
//!
//! Allocation is first fit: candidates are tried from page 0 upwards in
//! steps of the requested alignment, and the first run of free pages wins.
//! A fresh table therefore hands out pages `0, 1, 2, ...` in order.

use kernel_info::memory::PAGE_SHIFT;
use kernel_memory_addresses::{PageNumber, PhysicalAddress};
use kernel_vmem::{FrameAlloc, MmuError};
use log::{trace, warn};

/// The page allocation table (PAT).
///
/// Borrows its backing words, so the bitmap can sit at a fixed physical
/// address on hardware and in a plain array in tests.
pub struct PageAllocationTable<'a> {
    words: &'a mut [u32],
    total_pages: u32,
}

#[inline]
#[allow(clippy::cast_possible_truncation)]
const fn locate(page: PageNumber) -> (usize, u32) {
    let n = page.as_u32();
    ((n >> 5) as usize, 1 << (n & 31))
}

/// Pages `first..first + count`, cut short at the last page number.
#[inline]
fn run(first: PageNumber, count: u32) -> impl Iterator<Item = PageNumber> {
    (0..count).map_while(move |n| first.checked_add(n))
}

impl<'a> PageAllocationTable<'a> {
    /// Wrap `words` as the bitmap for `total_pages` pages.
    ///
    /// The contents of `words` are taken as they are; call
    /// [`clear`](Self::clear) for a fresh table. `total_pages` is capped at
    /// what `words` can describe.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(words: &'a mut [u32], total_pages: u32) -> Self {
        let capacity = (words.len() as u32).saturating_mul(u32::BITS);
        debug_assert!(total_pages <= capacity, "bitmap too small for {total_pages} pages");
        Self {
            words,
            total_pages: total_pages.min(capacity),
        }
    }

    /// Mark every page free.
    pub fn clear(&mut self) {
        self.words.fill(0);
    }

    #[inline]
    #[must_use]
    pub const fn total_pages(&self) -> u32 {
        self.total_pages
    }

    #[inline]
    const fn in_range(&self, page: PageNumber) -> bool {
        page.as_u32() < self.total_pages
    }

    /// Mark `page` allocated. Pages beyond physical memory are ignored.
    #[inline]
    pub fn set_page_alloc(&mut self, page: PageNumber) {
        if self.in_range(page) {
            let (word, mask) = locate(page);
            self.words[word] |= mask;
        }
    }

    /// Mark `page` free. Pages beyond physical memory are ignored.
    #[inline]
    pub fn unset_page_alloc(&mut self, page: PageNumber) {
        if self.in_range(page) {
            let (word, mask) = locate(page);
            self.words[word] &= !mask;
        }
    }

    /// Returns `true` if `page` is allocated.
    ///
    /// Pages beyond physical memory count as allocated: they can never be
    /// handed out.
    #[inline]
    #[must_use]
    pub fn is_allocated(&self, page: PageNumber) -> bool {
        if !self.in_range(page) {
            return true;
        }
        let (word, mask) = locate(page);
        self.words[word] & mask != 0
    }

    /// Number of free pages.
    #[must_use]
    pub fn free_pages(&self) -> u32 {
        (0..self.total_pages)
            .filter(|&n| !self.is_allocated(PageNumber::new(n)))
            .fold(0, |acc, _| acc + 1)
    }

    /// Mark `count` pages starting at `first` allocated without scanning.
    ///
    /// Used for boot-time reservations; reserving an already reserved page
    /// is harmless.
    pub fn reserve(&mut self, first: PageNumber, count: u32) {
        for page in run(first, count) {
            self.set_page_alloc(page);
        }
        trace!("PAT: reserved {count} page(s) from {first}");
    }

    /// Allocate a single page. Same as `alloc_pages_align(1, 1)`.
    ///
    /// # Errors
    /// - [`MmuError::OutOfMemory`] if every page is taken.
    #[inline]
    pub fn alloc_page(&mut self) -> Result<PageNumber, MmuError> {
        self.alloc_pages_align(1, 1)
    }

    /// Allocate `count` contiguous pages whose first page number is a
    /// multiple of `align`.
    ///
    /// A `count` or `align` of zero is treated as one.
    ///
    /// # Errors
    /// - [`MmuError::OutOfMemory`] if no free run fits below the end of
    ///   physical memory.
    pub fn alloc_pages_align(&mut self, count: u32, align: u32) -> Result<PageNumber, MmuError> {
        let count = count.max(1);
        let align = align.max(1);

        let mut candidate = 0u32;
        while let Some(end) = candidate.checked_add(count) {
            if end > self.total_pages {
                break;
            }

            match (candidate..end).find(|&n| self.is_allocated(PageNumber::new(n))) {
                None => {
                    let first = PageNumber::new(candidate);
                    self.reserve_run(first, count);
                    trace!("PAT: allocated {count} page(s) at {first} (align {align})");
                    return Ok(first);
                }
                Some(taken) => {
                    // Skip to the first aligned candidate past the busy page.
                    let Some(next) = (taken / align).checked_add(1).and_then(|k| k.checked_mul(align))
                    else {
                        break;
                    };
                    candidate = next;
                }
            }
        }

        warn!("PAT: out of memory for {count} page(s) aligned to {align}");
        Err(MmuError::OutOfMemory { count, align })
    }

    #[inline]
    fn reserve_run(&mut self, first: PageNumber, count: u32) {
        for page in run(first, count) {
            self.set_page_alloc(page);
        }
    }

    /// Free `page`.
    ///
    /// A page beyond physical memory is logged and otherwise ignored.
    pub fn dealloc_page(&mut self, page: PageNumber) {
        match self.page_number_to_address(page) {
            Ok(_) => {
                self.unset_page_alloc(page);
                trace!("PAT: freed page {page}");
            }
            Err(e) => warn!("PAT: ignoring free of {page}: {e}"),
        }
    }

    /// Free `count` pages starting at `first`.
    ///
    /// Pages beyond physical memory are skipped like in
    /// [`dealloc_page`](Self::dealloc_page); the run never wraps around.
    pub fn dealloc_pages(&mut self, first: PageNumber, count: u32) {
        for page in run(first, count) {
            self.dealloc_page(page);
        }
    }

    /// Physical base address of `page`.
    ///
    /// # Errors
    /// - [`MmuError::OutOfRange`] if the page lies at or beyond the end of
    ///   physical memory.
    pub const fn page_number_to_address(&self, page: PageNumber) -> Result<PhysicalAddress, MmuError> {
        if !self.in_range(page) {
            return Err(MmuError::OutOfRange(page));
        }
        Ok(PhysicalAddress::new(page.as_u32() << PAGE_SHIFT))
    }
}

impl FrameAlloc for PageAllocationTable<'_> {
    #[inline]
    fn alloc_page(&mut self) -> Option<PageNumber> {
        Self::alloc_pages_align(self, 1, 1).ok()
    }
}

impl core::fmt::Debug for PageAllocationTable<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PageAllocationTable")
            .field("total_pages", &self.total_pages)
            .field("free_pages", &self.free_pages())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pat(words: &mut [u32], pages: u32) -> PageAllocationTable<'_> {
        let mut pat = PageAllocationTable::new(words, pages);
        pat.clear();
        pat
    }

    #[test]
    fn fresh_table_hands_out_pages_in_order() {
        let mut words = [0xFFFF_FFFFu32; 1];
        let mut pat = pat(&mut words, 32);
        for expected in 0..4 {
            assert_eq!(pat.alloc_page(), Ok(PageNumber::new(expected)));
        }
        assert_eq!(pat.free_pages(), 28);
    }

    #[test]
    fn bit_addressing_uses_word_and_mask() {
        let mut words = [0u32; 2];
        {
            let mut pat = pat(&mut words, 64);
            pat.set_page_alloc(PageNumber::new(33));
            pat.set_page_alloc(PageNumber::new(0));
        }
        assert_eq!(words, [0b1, 0b10]);
    }

    #[test]
    fn aligned_runs_start_on_multiples_and_never_overlap() {
        let mut words = [0u32; 2];
        let mut pat = pat(&mut words, 64);

        assert_eq!(pat.alloc_page(), Ok(PageNumber::new(0)));
        let run = pat.alloc_pages_align(4, 4).unwrap();
        assert_eq!(run, PageNumber::new(4));
        let run2 = pat.alloc_pages_align(3, 8).unwrap();
        assert_eq!(run2, PageNumber::new(8));
        assert!(run.is_aligned_to(4) && run2.is_aligned_to(8));

        // The gap at 1..4 is still available for single pages.
        assert_eq!(pat.alloc_page(), Ok(PageNumber::new(1)));
        for n in 4..11 {
            assert!(pat.is_allocated(PageNumber::new(n)));
        }
        assert!(!pat.is_allocated(PageNumber::new(11)));
    }

    #[test]
    fn zero_count_and_align_behave_like_one() {
        let mut words = [0u32; 1];
        let mut pat = pat(&mut words, 32);
        assert_eq!(pat.alloc_pages_align(0, 0), Ok(PageNumber::new(0)));
        assert_eq!(pat.alloc_pages_align(0, 0), Ok(PageNumber::new(1)));
    }

    #[test]
    fn run_must_fit_below_the_last_page() {
        let mut words = [0u32; 1];
        let mut pat = pat(&mut words, 8);
        pat.reserve(PageNumber::new(0), 5);

        assert_eq!(
            pat.alloc_pages_align(4, 1),
            Err(MmuError::OutOfMemory { count: 4, align: 1 })
        );
        assert_eq!(pat.alloc_pages_align(3, 1), Ok(PageNumber::new(5)));
        assert_eq!(pat.alloc_page(), Err(MmuError::OutOfMemory { count: 1, align: 1 }));
        assert_eq!(FrameAlloc::alloc_page(&mut pat), None);
    }

    #[test]
    fn dealloc_frees_and_tolerates_out_of_range() {
        let mut words = [0u32; 1];
        let mut pat = pat(&mut words, 16);
        let run = pat.alloc_pages_align(4, 1).unwrap();

        pat.dealloc_page(PageNumber::new(1));
        assert_eq!(pat.alloc_page(), Ok(PageNumber::new(1)));

        pat.dealloc_pages(run, 4);
        assert_eq!(pat.free_pages(), 16);

        pat.dealloc_page(PageNumber::new(16));
        pat.dealloc_page(PageNumber::new(0x10_0000));
        assert_eq!(pat.free_pages(), 16);
    }

    #[test]
    fn runs_near_the_last_page_number_do_not_wrap() {
        let mut words = [0u32; 1];
        let mut pat = pat(&mut words, 32);
        pat.reserve(PageNumber::new(0), 4);

        pat.dealloc_pages(PageNumber::new(u32::MAX), 2);
        pat.dealloc_pages(PageNumber::new(u32::MAX - 1), 8);
        assert!((0..4).all(|n| pat.is_allocated(PageNumber::new(n))));

        pat.reserve(PageNumber::new(u32::MAX), 3);
        assert_eq!(pat.free_pages(), 28);
    }

    #[test]
    fn page_number_to_address_checks_the_range() {
        let mut words = [0u32; 1];
        let pat = pat(&mut words, 32);
        assert_eq!(
            pat.page_number_to_address(PageNumber::new(31)),
            Ok(PhysicalAddress::new(0x1F000))
        );
        assert_eq!(
            pat.page_number_to_address(PageNumber::new(32)),
            Err(MmuError::OutOfRange(PageNumber::new(32)))
        );
    }

    #[test]
    fn out_of_range_pages_count_as_taken() {
        let mut words = [0u32; 1];
        let mut pat = pat(&mut words, 10);
        pat.set_page_alloc(PageNumber::new(20));
        assert_eq!(pat.free_pages(), 10);
        assert!(pat.is_allocated(PageNumber::new(10)));
    }
}
