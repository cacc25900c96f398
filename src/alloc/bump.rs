//! `BumpAllocator`: monotonic allocation from a single region.
//!
//! Allocation advances a cursor, `free` does nothing and `reset` rewinds the whole
//! region at once. Two algorithms share the type:
//!
//! - [`BumpMode::SingleThreaded`] computes the exact padding for each request.
//! - [`BumpMode::MultiThreaded`] reserves `size + align` with one `fetch_add` and
//!   places the allocation inside the reservation. Lock-free, at the cost of up to
//!   `align` wasted bytes per call.

use crate::alloc::allocator::{assert_align, padding_for, AllocError, AllocStatus, RawAllocator};
use crate::alloc::region::Region;
use crate::concurrency::atomic::{AtomicUsize, Ordering};
use core::ptr::NonNull;
use crossbeam_utils::CachePadded;

/// Which algorithm backs [`BumpAllocator::allocate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BumpMode {
    /// Exact padding; callers must not share the allocator across threads.
    SingleThreaded,
    /// Lock-free over-reserving `fetch_add`.
    MultiThreaded,
}

impl BumpMode {
    #[inline]
    fn from_flag(multithread: bool) -> Self {
        if multithread {
            Self::MultiThreaded
        } else {
            Self::SingleThreaded
        }
    }
}

/// Bump-pointer allocator over a borrowed [`Region`].
///
/// Each mode keeps its own cursor, an offset from the region base. Only the cursor
/// of the active mode moves; [`BumpAllocator::set_multithread`] carries it across.
pub struct BumpAllocator<'a> {
    region: Region<'a>,
    mode: BumpMode,
    // Only ever loaded and stored, never read-modify-written.
    local: AtomicUsize,
    // May run past `region.len()` once exhausted; never handed out beyond it.
    shared: CachePadded<AtomicUsize>,
}

impl<'a> BumpAllocator<'a> {
    /// Creates an allocator that hands out bytes from `region`.
    pub fn new(region: Region<'a>, multithread: bool) -> Self {
        let mode = BumpMode::from_flag(multithread);
        log_debug!(len = region.len(), ?mode, "bump allocator created");
        Self {
            region,
            mode,
            local: AtomicUsize::new(0),
            shared: CachePadded::new(AtomicUsize::new(0)),
        }
    }

    /// The active algorithm.
    #[inline]
    pub fn mode(&self) -> BumpMode {
        self.mode
    }

    /// Returns `true` if the lock-free algorithm is active.
    #[inline]
    pub fn is_multithread(&self) -> bool {
        self.mode == BumpMode::MultiThreaded
    }

    /// Switches algorithm. The cursor carries over, so bytes already handed out are
    /// never handed out again.
    pub fn set_multithread(&mut self, multithread: bool) {
        let mode = BumpMode::from_flag(multithread);
        if mode == self.mode {
            return;
        }
        let cursor = self.used();
        match mode {
            BumpMode::SingleThreaded => self.local.store(cursor, Ordering::Relaxed),
            BumpMode::MultiThreaded => self.shared.store(cursor, Ordering::Relaxed),
        }
        self.mode = mode;
        log_debug!(?mode, cursor, "bump allocator mode switched");
    }

    /// Rewinds the cursor to the start of the region.
    ///
    /// Every pointer handed out so far becomes dangling in the logical sense: the
    /// memory will be handed out again. Callers must have dropped all of them.
    pub fn reset(&mut self) {
        self.local.store(0, Ordering::Relaxed);
        self.shared.store(0, Ordering::Relaxed);
        log_debug!(len = self.region.len(), "bump allocator reset");
    }

    /// Bytes consumed so far, including alignment padding.
    #[inline]
    pub fn used(&self) -> usize {
        let cursor = match self.mode {
            BumpMode::SingleThreaded => self.local.load(Ordering::Relaxed),
            BumpMode::MultiThreaded => self.shared.load(Ordering::Relaxed),
        };
        cursor.min(self.region.len())
    }

    /// Size of the backing region in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.region.len()
    }

    /// Allocates `size` bytes aligned to `align` using the active algorithm.
    ///
    /// # Panics
    /// Panics if `align` is not a power of two.
    #[inline]
    pub fn allocate(&self, size: usize, align: usize) -> Result<NonNull<u8>, AllocError> {
        assert_align(align);
        match self.mode {
            BumpMode::SingleThreaded => self.allocate_local(size, align),
            BumpMode::MultiThreaded => self.allocate_shared(size, align),
        }
    }

    #[inline]
    fn allocate_local(&self, size: usize, align: usize) -> Result<NonNull<u8>, AllocError> {
        let cursor = self.local.load(Ordering::Relaxed);
        let padding = padding_for(self.region.base_addr() + cursor, align);
        let total = size.checked_add(padding).ok_or(AllocError)?;
        if total > self.region.len() - cursor {
            return Err(AllocError);
        }
        self.local.store(cursor + total, Ordering::Relaxed);
        Ok(self.region.at(cursor + padding))
    }

    #[inline]
    fn allocate_shared(&self, size: usize, align: usize) -> Result<NonNull<u8>, AllocError> {
        let len = self.region.len();
        let needed = size.checked_add(align).ok_or(AllocError)?;
        if needed > len {
            return Err(AllocError);
        }

        // Once the cursor is past the end, stop pushing it further. The check races
        // other callers; the bound below is what keeps results inside the region.
        let exhausted = self.shared.load(Ordering::Relaxed) >= len;
        let reserve = needed & usize::from(!exhausted).wrapping_neg();
        let before = self.shared.fetch_add(reserve, Ordering::Relaxed);

        if before > len - needed {
            return Err(AllocError);
        }
        let addr = self.region.base_addr() + before;
        Ok(self.region.at(before + (align - (addr & (align - 1)))))
    }
}

impl RawAllocator for BumpAllocator<'_> {
    #[inline]
    fn allocate(&self, size: usize, align: usize) -> Result<NonNull<u8>, AllocError> {
        BumpAllocator::allocate(self, size, align)
    }

    #[inline]
    unsafe fn free(&self, _ptr: *mut u8) {}

    fn status(&self) -> AllocStatus {
        let len = self.region.len();
        AllocStatus {
            total_memory: len as u64,
            memory_available: (len - self.used()) as u64,
            active_allocation_count: AllocStatus::UNAVAILABLE_COUNT,
            features: 0,
        }
    }
}

impl core::fmt::Debug for BumpAllocator<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BumpAllocator")
            .field("region", &self.region)
            .field("mode", &self.mode)
            .field("used", &self.used())
            .finish()
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;

    #[repr(align(64))]
    struct Arena([u8; 256]);

    fn offset(bump: &BumpAllocator<'_>, ptr: NonNull<u8>) -> usize {
        ptr.as_ptr() as usize - bump.region.base_addr()
    }

    #[test]
    fn test_single_threaded_exact_padding() {
        let mut arena = Arena([0; 256]);
        let bump = BumpAllocator::new(Region::new(&mut arena.0), false);

        let a = bump.allocate(3, 1).unwrap();
        assert_eq!(offset(&bump, a), 0);
        let b = bump.allocate(8, 8).unwrap();
        assert_eq!(offset(&bump, b), 8);
        assert_eq!(bump.used(), 16);

        let c = bump.allocate(1, 32).unwrap();
        assert_eq!(offset(&bump, c), 32);
        assert_eq!(bump.used(), 33);
    }

    #[test]
    fn test_exhaustion_leaves_cursor() {
        let mut arena = Arena([0; 256]);
        let bump = BumpAllocator::new(Region::new(&mut arena.0), false);

        bump.allocate(250, 1).unwrap();
        assert_eq!(bump.allocate(8, 8), Err(AllocError));
        assert_eq!(bump.used(), 250);
        assert!(bump.allocate(6, 1).is_ok());
        assert_eq!(bump.allocate(1, 1), Err(AllocError));
    }

    #[test]
    fn test_zero_size_returns_cursor() {
        let mut arena = Arena([0; 256]);
        let bump = BumpAllocator::new(Region::new(&mut arena.0), false);
        bump.allocate(256, 1).unwrap();
        let end = bump.allocate(0, 1).unwrap();
        assert_eq!(offset(&bump, end), 256);
    }

    #[test]
    fn test_multithreaded_overreserves() {
        let mut arena = Arena([0; 256]);
        let bump = BumpAllocator::new(Region::new(&mut arena.0), true);

        // An aligned cursor still skips a full `align`.
        let a = bump.allocate(8, 8).unwrap();
        assert_eq!(offset(&bump, a), 8);
        assert_eq!(bump.used(), 16);
        let b = bump.allocate(4, 16).unwrap();
        assert_eq!(offset(&bump, b), 32);
        assert_eq!(bump.used(), 36);
    }

    #[test]
    fn test_multithreaded_exhaustion_never_escapes_region() {
        let mut arena = Arena([0; 256]);
        let bump = BumpAllocator::new(Region::new(&mut arena.0), true);

        let mut handed = 0;
        while let Ok(ptr) = bump.allocate(24, 8) {
            assert!(offset(&bump, ptr) + 24 <= 256);
            handed += 1;
        }
        assert_eq!(handed, 8);
        for _ in 0..4 {
            assert_eq!(bump.allocate(1, 1), Err(AllocError));
        }
        assert_eq!(bump.status().memory_available, 0);
    }

    #[test]
    fn test_request_larger_than_region() {
        let mut arena = Arena([0; 256]);
        let bump = BumpAllocator::new(Region::new(&mut arena.0), true);
        assert_eq!(bump.allocate(usize::MAX, 8), Err(AllocError));
        assert_eq!(bump.allocate(250, 8), Err(AllocError));
        assert_eq!(bump.used(), 0);
    }

    #[test]
    fn test_mode_switch_carries_cursor() {
        let mut arena = Arena([0; 256]);
        let mut bump = BumpAllocator::new(Region::new(&mut arena.0), false);
        bump.allocate(40, 1).unwrap();

        bump.set_multithread(true);
        assert_eq!(bump.mode(), BumpMode::MultiThreaded);
        let p = bump.allocate(8, 8).unwrap();
        assert!(offset(&bump, p) >= 40);

        let used = bump.used();
        bump.set_multithread(false);
        let q = bump.allocate(1, 1).unwrap();
        assert_eq!(offset(&bump, q), used);
    }

    #[test]
    fn test_reset_rewinds() {
        let mut arena = Arena([0; 256]);
        let mut bump = BumpAllocator::new(Region::new(&mut arena.0), false);
        let first = bump.allocate(100, 4).unwrap();
        bump.reset();
        assert_eq!(bump.used(), 0);
        assert_eq!(bump.allocate(100, 4).unwrap(), first);
    }

    #[test]
    fn test_status() {
        let mut arena = Arena([0; 256]);
        let bump = BumpAllocator::new(Region::new(&mut arena.0), false);
        bump.allocate(56, 1).unwrap();

        let status = RawAllocator::status(&bump);
        assert_eq!(status.total_memory, 256);
        assert_eq!(status.memory_available, 200);
        assert_eq!(status.active_allocation_count, AllocStatus::UNAVAILABLE_COUNT);
        unsafe { RawAllocator::free(&bump, core::ptr::null_mut()) };
    }

    #[test]
    #[should_panic(expected = "power of two")]
    fn test_rejects_bad_alignment() {
        let mut arena = Arena([0; 256]);
        let bump = BumpAllocator::new(Region::new(&mut arena.0), false);
        let _ = bump.allocate(8, 3);
    }
}
