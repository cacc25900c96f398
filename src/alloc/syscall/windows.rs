use core::ptr::{self, NonNull};
use windows_sys::Win32::System::Memory::{
    VirtualAlloc, VirtualFree, MEM_COMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_READWRITE,
};

/// Commits `size` bytes of zeroed, page-aligned, read-write memory.
///
/// # Safety
/// `size` must be a non-zero multiple of the page size.
pub(crate) unsafe fn allocate_region(size: usize) -> Option<NonNull<u8>> {
    let ptr = VirtualAlloc(ptr::null(), size, MEM_COMMIT | MEM_RESERVE, PAGE_READWRITE);
    NonNull::new(ptr.cast::<u8>())
}

/// Releases a region returned by [`allocate_region`].
///
/// # Safety
/// `ptr` must come from one successful `allocate_region` call, and the region must
/// not be used afterwards.
pub(crate) unsafe fn free_region(ptr: NonNull<u8>, _size: usize) {
    // MEM_RELEASE frees the whole reservation; the size must be 0.
    VirtualFree(ptr.as_ptr().cast(), 0, MEM_RELEASE);
}
