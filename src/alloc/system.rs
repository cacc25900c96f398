//! `SystemAllocator`: passthrough to the platform allocator.
//!
//! Supports any size and alignment and is always thread-safe by delegation.
//! Tracks nothing, so its status reports every field as unavailable.

use crate::alloc::allocator::{assert_align, AllocError, AllocStatus, RawAllocator};
use core::ptr::NonNull;

/// Alignment the platform `malloc` guarantees for every request.
pub const MIN_ALIGN: usize = 2 * core::mem::size_of::<usize>();

/// Forwards every call to the platform's native allocator.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SystemAllocator;

impl SystemAllocator {
    /// Creates the passthrough allocator.
    pub const fn new() -> Self {
        Self
    }
}

impl RawAllocator for SystemAllocator {
    #[inline]
    fn allocate(&self, size: usize, align: usize) -> Result<NonNull<u8>, AllocError> {
        assert_align(align);
        // Zero-byte requests still get a unique pointer.
        let ptr = unsafe { platform_alloc(size.max(1), align) };
        NonNull::new(ptr).ok_or(AllocError)
    }

    #[inline]
    unsafe fn free(&self, ptr: *mut u8) {
        if !ptr.is_null() {
            platform_free(ptr);
        }
    }

    fn status(&self) -> AllocStatus {
        AllocStatus {
            features: 0,
            ..AllocStatus::unavailable()
        }
    }
}

#[cfg(unix)]
#[inline]
unsafe fn platform_alloc(size: usize, align: usize) -> *mut u8 {
    if align <= MIN_ALIGN {
        libc::malloc(size).cast::<u8>()
    } else {
        let mut out = core::ptr::null_mut();
        if libc::posix_memalign(&mut out, align, size) == 0 {
            out.cast::<u8>()
        } else {
            core::ptr::null_mut()
        }
    }
}

#[cfg(unix)]
#[inline]
unsafe fn platform_free(ptr: *mut u8) {
    libc::free(ptr.cast::<libc::c_void>());
}

// `_aligned_malloc` memory must be released with `_aligned_free`, so every request
// goes through the aligned entry point and `free` never has to guess.
#[cfg(windows)]
#[inline]
unsafe fn platform_alloc(size: usize, align: usize) -> *mut u8 {
    libc::aligned_malloc(size, align.max(MIN_ALIGN)).cast::<u8>()
}

#[cfg(windows)]
#[inline]
unsafe fn platform_free(ptr: *mut u8) {
    libc::aligned_free(ptr.cast::<libc::c_void>());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_free_roundtrip() {
        let system = SystemAllocator::new();
        for align in [1usize, 2, 8, 16, 64, 256, 4096] {
            let ptr = system.allocate(100, align).unwrap();
            assert_eq!(ptr.as_ptr() as usize % align, 0);
            unsafe {
                ptr.as_ptr().write_bytes(0x5A, 100);
                assert_eq!(*ptr.as_ptr().add(99), 0x5A);
                system.free(ptr.as_ptr());
            }
        }
    }

    #[test]
    fn test_zero_size_gets_distinct_pointers() {
        let system = SystemAllocator;
        let a = system.allocate(0, 1).unwrap();
        let b = system.allocate(0, 1).unwrap();
        assert_ne!(a, b);
        unsafe {
            system.free(a.as_ptr());
            system.free(b.as_ptr());
        }
    }

    #[test]
    fn test_free_null_is_noop() {
        unsafe { SystemAllocator.free(core::ptr::null_mut()) };
    }

    #[test]
    fn test_status_untracked() {
        let status = SystemAllocator.status();
        assert_eq!(status.total_memory, AllocStatus::UNAVAILABLE);
        assert_eq!(status.memory_available, AllocStatus::UNAVAILABLE);
        assert_eq!(status.active_allocation_count, AllocStatus::UNAVAILABLE_COUNT);
        assert_eq!(status.features, 0);
    }
}
