use core::ptr::{self, NonNull};
use libc::{c_void, mmap, munmap, MAP_ANON, MAP_FAILED, MAP_PRIVATE, PROT_READ, PROT_WRITE};

/// Maps `size` bytes of zeroed, page-aligned, read-write memory.
///
/// # Safety
/// `size` must be a non-zero multiple of the page size.
pub(crate) unsafe fn allocate_region(size: usize) -> Option<NonNull<u8>> {
    let ptr = mmap(
        ptr::null_mut(),
        size,
        PROT_READ | PROT_WRITE,
        MAP_PRIVATE | MAP_ANON,
        -1,
        0,
    );
    if ptr == MAP_FAILED {
        None
    } else {
        NonNull::new(ptr.cast::<u8>())
    }
}

/// Unmaps a region returned by [`allocate_region`].
///
/// # Safety
/// `ptr` and `size` must come from one successful `allocate_region` call, and the
/// region must not be used afterwards.
pub(crate) unsafe fn free_region(ptr: NonNull<u8>, size: usize) {
    munmap(ptr.as_ptr().cast::<c_void>(), size);
}
