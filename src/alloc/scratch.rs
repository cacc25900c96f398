//! `ScratchRing`: bump allocation over a circular region.
//!
//! When a request no longer fits before the end of the region the cursor wraps to
//! the start and old allocations are overwritten. A start point can be set to mark
//! the oldest allocation that must survive: once the cursor has wrapped past the
//! end it may advance up to that point and no further.
//!
//! ```text
//!   base        guard            cursor        end
//!    |  lapped    |   protected     |   free    |
//!    [============|#################|...........]
//! ```

use crate::alloc::allocator::{assert_align, padding_for, AllocError, AllocStatus, RawAllocator};
use crate::alloc::region::Region;
use crate::concurrency::atomic::{AtomicBool, AtomicUsize, Ordering};
use crate::concurrency::{LockGuard, PlatformLock};
use core::ptr::NonNull;

const NO_GUARD: usize = usize::MAX;

/// Wraparound scratch allocator over a borrowed [`Region`].
///
/// `free` is a no-op; memory is reclaimed by overwriting. In multithreaded mode the
/// short cursor update is serialised by a [`PlatformLock`].
pub struct ScratchRing<'a> {
    region: Region<'a>,
    cursor: AtomicUsize,
    guard: AtomicUsize,
    // Set when the cursor wrapped while a guard was active; cleared with the guard.
    lapped: AtomicBool,
    lock: Option<PlatformLock>,
}

impl<'a> ScratchRing<'a> {
    /// Creates a ring over `region`.
    pub fn new(region: Region<'a>, multithread: bool) -> Self {
        log_debug!(len = region.len(), multithread, "scratch ring created");
        Self {
            region,
            cursor: AtomicUsize::new(0),
            guard: AtomicUsize::new(NO_GUARD),
            lapped: AtomicBool::new(false),
            lock: multithread.then(PlatformLock::new),
        }
    }

    /// Returns `true` if calls are serialised by a lock.
    #[inline]
    pub fn is_multithread(&self) -> bool {
        self.lock.is_some()
    }

    /// Enables or disables locking.
    pub fn set_multithread(&mut self, multithread: bool) {
        if multithread != self.is_multithread() {
            self.lock = multithread.then(PlatformLock::new);
            log_debug!(multithread, "scratch ring mode switched");
        }
    }

    /// Size of the backing region in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.region.len()
    }

    /// Offset of the next allocation from the region base.
    #[inline]
    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::Relaxed)
    }

    /// Marks the current cursor as the oldest allocation that must not be overwritten.
    ///
    /// Allocation still runs to the end of the region, then wraps and may advance up
    /// to the start point. Requests that would cross it fail instead of overwriting.
    pub fn set_start_point(&self) {
        let _guard = self.serialise();
        self.guard.store(self.cursor.load(Ordering::Relaxed), Ordering::Relaxed);
        self.lapped.store(false, Ordering::Relaxed);
    }

    /// Removes the start point; wrapping overwrites freely again.
    pub fn clear_start_point(&self) {
        let _guard = self.serialise();
        self.guard.store(NO_GUARD, Ordering::Relaxed);
        self.lapped.store(false, Ordering::Relaxed);
    }

    /// The start point as an offset from the region base, if one is set.
    pub fn start_point(&self) -> Option<usize> {
        let guard = self.guard.load(Ordering::Relaxed);
        (guard != NO_GUARD).then_some(guard)
    }

    /// Rewinds to the start of the region and clears the start point.
    pub fn reset(&mut self) {
        self.cursor.store(0, Ordering::Relaxed);
        self.guard.store(NO_GUARD, Ordering::Relaxed);
        self.lapped.store(false, Ordering::Relaxed);
        log_debug!(len = self.region.len(), "scratch ring reset");
    }

    /// Allocates `size` bytes aligned to `align`, wrapping to the start of the region
    /// when the tail is too short.
    ///
    /// # Panics
    /// Panics if `align` is not a power of two.
    pub fn allocate(&self, size: usize, align: usize) -> Result<NonNull<u8>, AllocError> {
        assert_align(align);
        let _guard = self.serialise();

        let cursor = self.cursor.load(Ordering::Relaxed);
        let guard = self.guard.load(Ordering::Relaxed);
        let lapped = self.lapped.load(Ordering::Relaxed);

        let limit = if lapped { guard } else { self.region.len() };
        if let Some((start, end)) = self.fit(cursor, size, align, limit) {
            self.cursor.store(end, Ordering::Relaxed);
            return Ok(self.region.at(start));
        }
        if lapped {
            return Err(AllocError);
        }

        let limit = if guard == NO_GUARD { self.region.len() } else { guard };
        let (start, end) = self.fit(0, size, align, limit).ok_or(AllocError)?;
        self.cursor.store(end, Ordering::Relaxed);
        if guard != NO_GUARD {
            self.lapped.store(true, Ordering::Relaxed);
        }
        Ok(self.region.at(start))
    }

    #[inline]
    fn fit(&self, from: usize, size: usize, align: usize, limit: usize) -> Option<(usize, usize)> {
        let start = from.checked_add(padding_for(self.region.base_addr() + from, align))?;
        let end = start.checked_add(size)?;
        (end <= limit).then_some((start, end))
    }

    #[inline]
    fn serialise(&self) -> Option<LockGuard<'_>> {
        self.lock.as_ref().map(PlatformLock::lock)
    }
}

impl RawAllocator for ScratchRing<'_> {
    #[inline]
    fn allocate(&self, size: usize, align: usize) -> Result<NonNull<u8>, AllocError> {
        ScratchRing::allocate(self, size, align)
    }

    #[inline]
    unsafe fn free(&self, _ptr: *mut u8) {}

    fn status(&self) -> AllocStatus {
        let _guard = self.serialise();
        let cursor = self.cursor.load(Ordering::Relaxed);
        let limit = if self.lapped.load(Ordering::Relaxed) {
            self.guard.load(Ordering::Relaxed)
        } else {
            self.region.len()
        };
        AllocStatus {
            total_memory: self.region.len() as u64,
            memory_available: limit.saturating_sub(cursor) as u64,
            active_allocation_count: AllocStatus::UNAVAILABLE_COUNT,
            features: 0,
        }
    }
}

impl core::fmt::Debug for ScratchRing<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ScratchRing")
            .field("region", &self.region)
            .field("cursor", &self.cursor())
            .field("start_point", &self.start_point())
            .field("multithread", &self.is_multithread())
            .finish()
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;

    #[repr(align(16))]
    struct Buf([u8; 128]);

    fn offset(ring: &ScratchRing<'_>, ptr: NonNull<u8>) -> usize {
        ptr.as_ptr() as usize - ring.region.base_addr()
    }

    #[test]
    fn test_bumps_like_stack() {
        let mut buf = Buf([0; 128]);
        let ring = ScratchRing::new(Region::new(&mut buf.0), false);
        let a = ring.allocate(5, 1).unwrap();
        let b = ring.allocate(8, 8).unwrap();
        assert_eq!(offset(&ring, a), 0);
        assert_eq!(offset(&ring, b), 8);
        assert_eq!(ring.cursor(), 16);
    }

    #[test]
    fn test_wraps_to_start() {
        let mut buf = Buf([0; 128]);
        let ring = ScratchRing::new(Region::new(&mut buf.0), false);
        ring.allocate(100, 1).unwrap();
        let wrapped = ring.allocate(40, 8).unwrap();
        assert_eq!(offset(&ring, wrapped), 0);
        assert_eq!(ring.cursor(), 40);
    }

    #[test]
    fn test_oversized_request_fails() {
        let mut buf = Buf([0; 128]);
        let ring = ScratchRing::new(Region::new(&mut buf.0), false);
        ring.allocate(10, 1).unwrap();
        assert_eq!(ring.allocate(129, 1), Err(AllocError));
        assert_eq!(ring.cursor(), 10);
    }

    #[test]
    fn test_start_point_stops_overwrite() {
        let mut buf = Buf([0; 128]);
        let ring = ScratchRing::new(Region::new(&mut buf.0), false);
        ring.allocate(32, 1).unwrap();
        ring.set_start_point();
        assert_eq!(ring.start_point(), Some(32));

        ring.allocate(80, 1).unwrap();
        // Tail holds 16 bytes; wrapping may use [0, 32).
        let wrapped = ring.allocate(24, 1).unwrap();
        assert_eq!(offset(&ring, wrapped), 0);
        assert!(ring.allocate(8, 1).is_ok());
        assert_eq!(ring.allocate(1, 1), Err(AllocError));
        assert_eq!(RawAllocator::status(&ring).memory_available, 0);

        ring.clear_start_point();
        assert_eq!(ring.start_point(), None);
        assert!(ring.allocate(64, 1).is_ok());
    }

    #[test]
    fn test_wrap_refused_when_start_point_too_close() {
        let mut buf = Buf([0; 128]);
        let ring = ScratchRing::new(Region::new(&mut buf.0), false);
        ring.allocate(8, 1).unwrap();
        ring.set_start_point();
        ring.allocate(100, 1).unwrap();
        assert_eq!(ring.allocate(32, 1), Err(AllocError));
        assert_eq!(ring.cursor(), 108);
    }

    #[test]
    fn test_reset_clears_start_point() {
        let mut buf = Buf([0; 128]);
        let mut ring = ScratchRing::new(Region::new(&mut buf.0), false);
        ring.allocate(50, 1).unwrap();
        ring.set_start_point();
        ring.reset();
        assert_eq!(ring.cursor(), 0);
        assert_eq!(ring.start_point(), None);
    }

    #[test]
    fn test_multithread_lock_toggle() {
        let mut buf = Buf([0; 128]);
        let mut ring = ScratchRing::new(Region::new(&mut buf.0), true);
        assert!(ring.is_multithread());
        ring.allocate(16, 16).unwrap();
        ring.set_multithread(false);
        assert!(!ring.is_multithread());
        assert_eq!(ring.cursor(), 16);
    }
}
