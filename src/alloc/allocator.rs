use core::fmt;
use core::ptr::NonNull;
use serde::Serialize;

/// Alignment used by [`RawAllocator::allocate_default`]: the size of a pointer.
pub const DEFAULT_ALIGN: usize = core::mem::size_of::<*const u8>();

/// The call interface shared by every allocator in this crate.
///
/// Each implementation resolves which algorithm backs `allocate`/`free` once, at
/// construction or at an explicit mode switch, and never re-decides it per call.
pub trait RawAllocator {
    /// Allocates `size` bytes aligned to `align`.
    ///
    /// `Err(AllocError)` is the null result: the allocator is out of capacity (or
    /// the platform refused). It is never a fault and leaves the allocator unchanged.
    ///
    /// # Panics
    /// Panics if `align` is not a power of two. A bad alignment is a programmer
    /// error, not a condition to recover from.
    fn allocate(&self, size: usize, align: usize) -> Result<NonNull<u8>, AllocError>;

    /// Allocates `size` bytes with [`DEFAULT_ALIGN`].
    #[inline]
    fn allocate_default(&self, size: usize) -> Result<NonNull<u8>, AllocError> {
        self.allocate(size, DEFAULT_ALIGN)
    }

    /// Returns memory to the allocator. A null `ptr` is a no-op.
    ///
    /// # Safety
    /// `ptr` must be null or have been returned by `allocate` on this same allocator
    /// and not freed since. Neither condition is checked.
    unsafe fn free(&self, ptr: *mut u8);

    /// Returns a snapshot of the allocator's bookkeeping.
    fn status(&self) -> AllocStatus;
}

/// Read-only snapshot returned by [`RawAllocator::status`].
///
/// Fields an allocator does not track hold [`AllocStatus::UNAVAILABLE`]
/// (or [`AllocStatus::UNAVAILABLE_COUNT`] for the 32-bit fields).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AllocStatus {
    /// Bytes managed by the allocator.
    pub total_memory: u64,
    /// Bytes that can still be handed out.
    pub memory_available: u64,
    /// Allocations currently outstanding.
    pub active_allocation_count: u32,
    /// Feature bits, see [`AllocStatus::SUPPORT_GC`].
    pub features: u32,
}

impl AllocStatus {
    /// Sentinel for byte counts that are not tracked.
    pub const UNAVAILABLE: u64 = 0xFFFF_FFFF;
    /// Sentinel for 32-bit fields that are not tracked.
    pub const UNAVAILABLE_COUNT: u32 = 0xFFFF_FFFF;
    /// Feature bit: the allocator collects garbage. No allocator here sets it.
    pub const SUPPORT_GC: u32 = 1;

    /// A status where nothing is tracked.
    pub const fn unavailable() -> Self {
        Self {
            total_memory: Self::UNAVAILABLE,
            memory_available: Self::UNAVAILABLE,
            active_allocation_count: Self::UNAVAILABLE_COUNT,
            features: Self::UNAVAILABLE_COUNT,
        }
    }

    /// Returns `Some(value)` unless `value` is the unavailable sentinel.
    #[inline]
    pub const fn tracked(value: u64) -> Option<u64> {
        if value == Self::UNAVAILABLE {
            None
        } else {
            Some(value)
        }
    }
}

/// The error type for allocation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocError;

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("memory allocation failed")
    }
}

impl std::error::Error for AllocError {}

/// A rejected allocator configuration.
///
/// Distinct from [`AllocError`]: these are caller mistakes detected when an
/// allocator is built, never capacity conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    /// The alignment is zero or not a power of two.
    InvalidAlignment {
        /// The rejected alignment.
        align: usize,
    },
    /// Pool elements must be at least one byte.
    ZeroElementSize,
    /// A pool must hold at least one element.
    ZeroElementCount,
    /// The element count does not fit the pool's 32-bit counters.
    TooManyElements {
        /// The rejected count.
        count: u32,
        /// The largest accepted count.
        max: u32,
    },
    /// A multithreaded pool needs a contention margin of at least one.
    ZeroContentionMargin,
    /// The region start is not aligned to the required alignment.
    MisalignedRegion {
        /// The alignment the region start must satisfy.
        align: usize,
    },
    /// The region cannot hold the requested layout.
    RegionTooSmall {
        /// Bytes the layout needs.
        required: usize,
        /// Bytes the region has.
        provided: usize,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::InvalidAlignment { align } => {
                write!(f, "alignment {align} is not a non-zero power of two")
            }
            Self::ZeroElementSize => f.write_str("pool element size must be non-zero"),
            Self::ZeroElementCount => f.write_str("pool element count must be non-zero"),
            Self::TooManyElements { count, max } => {
                write!(f, "pool element count {count} exceeds the maximum of {max}")
            }
            Self::ZeroContentionMargin => {
                f.write_str("multithreaded pool contention margin must be non-zero")
            }
            Self::MisalignedRegion { align } => {
                write!(f, "region start is not aligned to {align} bytes")
            }
            Self::RegionTooSmall { required, provided } => write!(
                f,
                "region of {provided} bytes is too small, {required} bytes required"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Bytes needed to move `addr` forward to the next multiple of `align`.
///
/// Branchless: `align - miss` is masked to zero when `addr` is already aligned.
/// `align` must be a power of two.
#[inline]
pub(crate) const fn padding_for(addr: usize, align: usize) -> usize {
    let miss = addr & (align - 1);
    (align - miss) & ((miss != 0) as usize).wrapping_neg()
}

#[inline]
#[track_caller]
pub(crate) fn assert_align(align: usize) {
    assert!(
        align.is_power_of_two(),
        "alignment must be a non-zero power of two, got {align}"
    );
}
