//! Backing memory for the region-based allocators.
//!
//! A [`Region`] is the half-open byte range `[base, base + len)` an allocator carves
//! allocations from. The allocator controls what happens *inside* the range but
//! never frees it: the caller provides the storage and releases it after the
//! allocator is gone, which the `'a` borrow enforces.

use crate::alloc::allocator::AllocError;
use crate::alloc::page::{align_up, page_size};
use crate::alloc::syscall::{allocate_region, free_region};
use core::fmt;
use core::marker::PhantomData;
use core::mem::MaybeUninit;
use core::ptr::NonNull;

/// A mutably borrowed byte range handed to an allocator.
pub struct Region<'a> {
    base: NonNull<u8>,
    len: usize,
    _marker: PhantomData<&'a mut [u8]>,
}

// Safety: a Region is a `&mut [u8]` in disguise.
unsafe impl Send for Region<'_> {}
unsafe impl Sync for Region<'_> {}

impl<'a> Region<'a> {
    /// Lends `bytes` to an allocator.
    pub fn new(bytes: &'a mut [u8]) -> Self {
        let len = bytes.len();
        Self {
            base: NonNull::from(bytes).cast::<u8>(),
            len,
            _marker: PhantomData,
        }
    }

    /// Lends uninitialised `bytes` to an allocator.
    pub fn from_uninit(bytes: &'a mut [MaybeUninit<u8>]) -> Self {
        let len = bytes.len();
        Self {
            base: NonNull::from(bytes).cast::<u8>(),
            len,
            _marker: PhantomData,
        }
    }

    /// Builds a region from a start pointer and a length.
    ///
    /// # Safety
    /// `[base, base + len)` must be valid for reads and writes, must not be accessed
    /// through any other path for `'a`, and `base + len` must not overflow.
    pub unsafe fn from_raw_parts(base: NonNull<u8>, len: usize) -> Self {
        Self {
            base,
            len,
            _marker: PhantomData,
        }
    }

    /// Builds a region from an inclusive start and an exclusive end pointer.
    ///
    /// # Safety
    /// Same as [`Region::from_raw_parts`], and `end` must not precede `start`.
    pub unsafe fn from_bounds(start: NonNull<u8>, end: *mut u8) -> Self {
        debug_assert!(end as usize >= start.as_ptr() as usize);
        Self::from_raw_parts(start, end as usize - start.as_ptr() as usize)
    }

    /// First byte of the region.
    #[inline]
    pub fn base(&self) -> NonNull<u8> {
        self.base
    }

    /// Address of the first byte.
    #[inline]
    pub fn base_addr(&self) -> usize {
        self.base.as_ptr() as usize
    }

    /// Address one past the last byte.
    #[inline]
    pub fn end_addr(&self) -> usize {
        self.base_addr() + self.len
    }

    /// Length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` for a zero-length region.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns `true` if `ptr` points inside `[base, end)`.
    #[inline]
    pub fn contains(&self, ptr: *const u8) -> bool {
        let addr = ptr as usize;
        addr >= self.base_addr() && addr < self.end_addr()
    }

    /// Pointer `offset` bytes into the region; `offset == len` yields the end pointer.
    #[inline]
    pub(crate) fn at(&self, offset: usize) -> NonNull<u8> {
        debug_assert!(offset <= self.len, "offset {offset} past region of {} bytes", self.len);
        // Safety: offset <= len keeps the pointer within (or one past) the region.
        unsafe { NonNull::new_unchecked(self.base.as_ptr().add(offset)) }
    }
}

impl fmt::Debug for Region<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Region")
            .field("base", &self.base)
            .field("len", &self.len)
            .finish()
    }
}

/// Page-aligned memory mapped straight from the operating system.
///
/// Convenient backing storage for the allocators: the start is aligned to the page
/// size, which satisfies every pool alignment up to a page. Unmapped on drop.
pub struct OwnedRegion {
    base: NonNull<u8>,
    len: usize,
    mapped: usize,
}

// Safety: OwnedRegion uniquely owns its mapping.
unsafe impl Send for OwnedRegion {}
unsafe impl Sync for OwnedRegion {}

impl OwnedRegion {
    /// Maps at least `len` bytes of zeroed memory.
    ///
    /// # Errors
    /// Returns `AllocError` if the operating system refuses the mapping.
    pub fn new(len: usize) -> Result<Self, AllocError> {
        let mapped = align_up(len.max(1), page_size());
        let base = unsafe { allocate_region(mapped) }.ok_or(AllocError)?;
        log_debug!(len, mapped, "mapped owned region");
        Ok(Self { base, len, mapped })
    }

    /// Requested length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the requested length was zero.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// First byte of the mapping.
    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.base.as_ptr()
    }

    /// Lends the whole mapping to an allocator.
    pub fn region(&mut self) -> Region<'_> {
        // Safety: the mapping is valid for `len` bytes and `&mut self` makes the loan exclusive.
        unsafe { Region::from_raw_parts(self.base, self.len) }
    }
}

impl Drop for OwnedRegion {
    fn drop(&mut self) {
        unsafe { free_region(self.base, self.mapped) };
    }
}

impl fmt::Debug for OwnedRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnedRegion")
            .field("base", &self.base)
            .field("len", &self.len)
            .field("mapped", &self.mapped)
            .finish()
    }
}
