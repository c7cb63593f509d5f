use crate::{PageSize, PhysicalAddress, Size4K};
use core::fmt;
use core::ops::Add;

/// Number of a 4 KiB physical page frame (`address >> 12`).
///
/// This is the unit the page allocator hands out. Converting back to an
/// address is checked: a page number at or above `2^20` has no 32-bit base.
///
/// ### Examples
/// ```rust
/// # use kernel_memory_addresses::*;
/// let page = PageNumber::new(9);
/// assert_eq!(page.base(), Some(PhysicalAddress::new(0x9000)));
/// assert_eq!(PageNumber::containing(PhysicalAddress::new(0x9FFF)), page);
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PageNumber(u32);

impl PageNumber {
    #[inline]
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// The page that contains `addr`.
    #[inline]
    #[must_use]
    pub const fn containing(addr: PhysicalAddress) -> Self {
        Self(addr.as_u32() >> Size4K::SHIFT)
    }

    /// Physical base address of the page, `None` if it does not fit 32 bits.
    #[inline]
    #[must_use]
    pub const fn base(self) -> Option<PhysicalAddress> {
        if self.0 >> (u32::BITS - Size4K::SHIFT) != 0 {
            return None;
        }
        Some(PhysicalAddress::new(self.0 << Size4K::SHIFT))
    }

    /// `self + n`, or `None` past the last page number.
    #[inline]
    #[must_use]
    pub const fn checked_add(self, n: u32) -> Option<Self> {
        match self.0.checked_add(n) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Returns `true` if the page number is a multiple of `align` pages.
    #[inline]
    #[must_use]
    pub const fn is_aligned_to(self, align: u32) -> bool {
        align != 0 && self.0.is_multiple_of(align)
    }
}

impl fmt::Debug for PageNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PageNumber({})", self.0)
    }
}

impl fmt::Display for PageNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl Add<u32> for PageNumber {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u32) -> Self::Output {
        Self(self.0 + rhs)
    }
}
