//! Physical addresses, page handles and VMA descriptors.
//!
//! These are opaque value types. The OSK layer does not allocate pages or
//! manage page tables; it only gives the rest of the driver a common way to
//! name them.

use crate::config::{PAGE_MASK, PAGE_SHIFT, PAGE_SIZE};
use crate::error::{OskError, Result};
use bitfield_struct::bitfield;
use core::fmt;
use core::ops::Range;

/// Physical memory address, sized to the widest host physical address.
///
/// Carries intent only: no arithmetic beyond page/offset splitting.
///
/// ```rust
/// # use kernel_osk::PhysAddr;
/// let pa = PhysAddr::new(0x8000_1042);
/// assert_eq!(pa.page_base().as_u64(), 0x8000_1000);
/// assert_eq!(pa.page_offset(), 0x42);
/// assert_eq!(pa.pfn(), 0x80001);
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysAddr(u64);

impl PhysAddr {
    #[inline]
    #[must_use]
    pub const fn new(v: u64) -> Self {
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn page_base(self) -> Self {
        Self(self.0 & PAGE_MASK)
    }

    #[inline]
    #[must_use]
    pub const fn page_offset(self) -> u64 {
        self.0 & !PAGE_MASK
    }

    #[inline]
    #[must_use]
    pub const fn is_page_aligned(self) -> bool {
        self.page_offset() == 0
    }

    /// Page frame number.
    #[inline]
    #[must_use]
    pub const fn pfn(self) -> u64 {
        self.0 >> PAGE_SHIFT
    }

    #[inline]
    #[must_use]
    pub const fn from_pfn(pfn: u64) -> Self {
        Self(pfn << PAGE_SHIFT)
    }
}

impl fmt::Debug for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PA(0x{:016X})", self.0)
    }
}

impl fmt::Display for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.0)
    }
}

impl From<u64> for PhysAddr {
    #[inline]
    fn from(v: u64) -> Self {
        Self::new(v)
    }
}

/// Handle to one physical page frame.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Page {
    pfn: u64,
}

impl Page {
    #[must_use]
    pub const fn from_pfn(pfn: u64) -> Self {
        Self { pfn }
    }

    /// # Errors
    ///
    /// [`OskError::Unaligned`] if `pa` is not the base of a page.
    pub fn containing_base(pa: PhysAddr) -> Result<Self> {
        if pa.is_page_aligned() {
            Ok(Self { pfn: pa.pfn() })
        } else {
            Err(OskError::Unaligned(pa.as_u64()))
        }
    }

    #[must_use]
    pub const fn pfn(self) -> u64 {
        self.pfn
    }

    #[must_use]
    pub const fn phys(self) -> PhysAddr {
        PhysAddr::from_pfn(self.pfn)
    }
}

/// Access permissions of a virtual memory area.
#[bitfield(u8)]
#[derive(PartialEq, Eq)]
pub struct VmaFlags {
    pub read: bool,
    pub write: bool,
    pub exec: bool,
    pub shared: bool,
    #[bits(4)]
    __: u8,
}

/// A virtual memory area handed to the driver by the host's `mmap` path.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Vma {
    start: u64,
    end: u64,
    flags: VmaFlags,
}

impl Vma {
    /// Describes `[start, end)`.
    ///
    /// # Errors
    ///
    /// - [`OskError::Unaligned`] if either bound is not page aligned.
    /// - [`OskError::InvalidRange`] if `end < start`.
    pub fn new(start: u64, end: u64, flags: VmaFlags) -> Result<Self> {
        if start & !PAGE_MASK != 0 {
            return Err(OskError::Unaligned(start));
        }
        if end & !PAGE_MASK != 0 {
            return Err(OskError::Unaligned(end));
        }
        if end < start {
            return Err(OskError::InvalidRange { start, end });
        }
        Ok(Self { start, end, flags })
    }

    #[must_use]
    pub const fn start(&self) -> u64 {
        self.start
    }

    #[must_use]
    pub const fn end(&self) -> u64 {
        self.end
    }

    #[must_use]
    pub const fn flags(&self) -> VmaFlags {
        self.flags
    }

    #[must_use]
    pub const fn len(&self) -> u64 {
        self.end - self.start
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }

    #[must_use]
    pub const fn pages(&self) -> u64 {
        self.len() / PAGE_SIZE
    }

    #[must_use]
    pub const fn range(&self) -> Range<u64> {
        self.start..self.end
    }

    #[must_use]
    pub const fn contains(&self, va: u64) -> bool {
        va >= self.start && va < self.end
    }
}
