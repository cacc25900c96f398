//! # `fixalloc` - Fixed-Purpose Allocators
//!
//! A family of narrow allocators for latency-sensitive code that cannot afford a
//! general-purpose heap on its hot paths. Each allocator trades generality for one
//! well-understood allocation pattern, and all of them share one call interface.
//!
//! ## Allocators
//!
//! | Type | Pattern | `free` | Threads |
//! |------|---------|--------|---------|
//! | [`SystemAllocator`] | anything, via the platform heap | releases | always safe |
//! | [`BumpAllocator`] | monotonic, reset all at once | no-op | lock-free mode |
//! | [`ScratchRing`] | monotonic, wraps and overwrites | no-op | locked mode |
//! | [`PoolAllocator`] | fixed-size slots, any free order | recycles | lock-free + fallback |
//!
//! [`AnyAllocator`] holds any of them behind a single enum, and defaults to an
//! unconfigured allocator that refuses every request.
//!
//! ## Design
//!
//! - **Caller-owned memory**: region-based allocators borrow a [`Region`] for their
//!   lifetime. They control what happens inside it and never free it.
//! - **Resolved once**: the algorithm behind `allocate`/`free` is picked at
//!   construction or at an explicit mode switch, then matched as an enum tag.
//! - **Null is a value**: exhaustion returns `Err(AllocError)` and leaves the
//!   allocator untouched. Misconfiguration is a separate [`ConfigError`], and a
//!   non-power-of-two alignment is a panic.
//!
//! ## Example
//!
//! ```rust
//! use fixalloc::{BumpAllocator, PoolAllocator, PoolConfig, RawAllocator, Region, OwnedRegion};
//!
//! let mut bytes = [0u8; 1024];
//! let bump = BumpAllocator::new(Region::new(&mut bytes), false);
//! let header = bump.allocate(24, 8).unwrap();
//! assert_eq!(header.as_ptr() as usize % 8, 0);
//!
//! let config = PoolConfig::new(64, 32).multithread(true);
//! let mut backing = OwnedRegion::new(config.memory_amount()).unwrap();
//! let pool = PoolAllocator::new(backing.region(), &config).unwrap();
//! let slot = pool.allocate().unwrap();
//! unsafe { pool.free(slot.as_ptr()) };
//! assert_eq!(pool.status().active_allocation_count, 0);
//! ```

#![warn(missing_docs, clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_possible_truncation)]

#[macro_use]
mod macros;

pub mod alloc;
pub mod concurrency;

pub use alloc::{
    AllocError,
    AllocStatus,
    AllocatorKind,
    AnyAllocator,
    BumpAllocator,
    BumpMode,
    ConfigError,
    OwnedRegion,
    PoolAlgorithm,
    PoolAllocator,
    PoolConfig,
    RawAllocator,
    Region,
    ScratchRing,
    SlotIndexer,
    SystemAllocator,
    DEFAULT_ALIGN,
};
pub use concurrency::{LockGuard, PlatformLock};

// Compile-time assertions for layout assumptions
#[cfg(not(loom))]
const _: () = {
    // Slot table entries are plain pointers.
    assert!(core::mem::size_of::<alloc::pool::SlotEntry>() == core::mem::size_of::<*mut u8>());
};

const _: () = {
    use core::mem;

    // Pool alignment is raised to this, and it must be a valid alignment.
    assert!(DEFAULT_ALIGN.is_power_of_two());

    assert!(mem::size_of::<SystemAllocator>() == 0);
};
