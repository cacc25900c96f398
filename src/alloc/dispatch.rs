//! `AnyAllocator`: one value that can hold any allocator in the crate.
//!
//! The variant is fixed when the value is built; `allocate` and `free` match on it
//! once per call instead of going through a vtable. The default value is
//! [`AnyAllocator::Unconfigured`], which refuses every allocation.

use crate::alloc::allocator::{AllocError, AllocStatus, RawAllocator};
use crate::alloc::bump::BumpAllocator;
use crate::alloc::pool::PoolAllocator;
use crate::alloc::scratch::ScratchRing;
use crate::alloc::system::SystemAllocator;
use core::ptr::NonNull;

/// Tagged union over every allocator in the crate.
#[derive(Debug, Default)]
pub enum AnyAllocator<'a> {
    /// No allocator bound: `allocate` fails, `free` does nothing.
    #[default]
    Unconfigured,
    /// Platform passthrough.
    System(SystemAllocator),
    /// Monotonic bump allocation.
    Bump(BumpAllocator<'a>),
    /// Wraparound scratch allocation.
    Scratch(ScratchRing<'a>),
    /// Fixed-size slots.
    Pool(PoolAllocator<'a>),
}

/// Discriminant of an [`AnyAllocator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AllocatorKind {
    /// [`AnyAllocator::Unconfigured`].
    Unconfigured,
    /// [`AnyAllocator::System`].
    System,
    /// [`AnyAllocator::Bump`].
    Bump,
    /// [`AnyAllocator::Scratch`].
    Scratch,
    /// [`AnyAllocator::Pool`].
    Pool,
}

impl AnyAllocator<'_> {
    /// Which allocator is bound.
    pub fn kind(&self) -> AllocatorKind {
        match self {
            Self::Unconfigured => AllocatorKind::Unconfigured,
            Self::System(_) => AllocatorKind::System,
            Self::Bump(_) => AllocatorKind::Bump,
            Self::Scratch(_) => AllocatorKind::Scratch,
            Self::Pool(_) => AllocatorKind::Pool,
        }
    }

    /// Returns `false` for [`AnyAllocator::Unconfigured`].
    #[inline]
    pub fn is_configured(&self) -> bool {
        !matches!(self, Self::Unconfigured)
    }
}

impl RawAllocator for AnyAllocator<'_> {
    #[inline]
    fn allocate(&self, size: usize, align: usize) -> Result<NonNull<u8>, AllocError> {
        match self {
            Self::Unconfigured => Err(AllocError),
            Self::System(a) => a.allocate(size, align),
            Self::Bump(a) => a.allocate(size, align),
            Self::Scratch(a) => a.allocate(size, align),
            Self::Pool(a) => RawAllocator::allocate(a, size, align),
        }
    }

    #[inline]
    unsafe fn free(&self, ptr: *mut u8) {
        match self {
            Self::Unconfigured => {}
            Self::System(a) => a.free(ptr),
            Self::Bump(a) => RawAllocator::free(a, ptr),
            Self::Scratch(a) => RawAllocator::free(a, ptr),
            Self::Pool(a) => a.free(ptr),
        }
    }

    fn status(&self) -> AllocStatus {
        match self {
            Self::Unconfigured => AllocStatus::unavailable(),
            Self::System(a) => a.status(),
            Self::Bump(a) => a.status(),
            Self::Scratch(a) => a.status(),
            Self::Pool(a) => a.status(),
        }
    }
}

impl From<SystemAllocator> for AnyAllocator<'_> {
    fn from(allocator: SystemAllocator) -> Self {
        Self::System(allocator)
    }
}

impl<'a> From<BumpAllocator<'a>> for AnyAllocator<'a> {
    fn from(allocator: BumpAllocator<'a>) -> Self {
        Self::Bump(allocator)
    }
}

impl<'a> From<ScratchRing<'a>> for AnyAllocator<'a> {
    fn from(allocator: ScratchRing<'a>) -> Self {
        Self::Scratch(allocator)
    }
}

impl<'a> From<PoolAllocator<'a>> for AnyAllocator<'a> {
    fn from(allocator: PoolAllocator<'a>) -> Self {
        Self::Pool(allocator)
    }
}
