//! Atomic types shared by the multithreaded allocator paths.
//!
//! Built with `--cfg loom`, these resolve to loom's model-checked atomics so the
//! lock-free algorithms can be explored exhaustively in `tests/loom_models.rs`.

#[cfg(loom)]
pub(crate) use loom::sync::atomic::{AtomicBool, AtomicPtr, AtomicU32, AtomicUsize};

#[cfg(not(loom))]
pub(crate) use core::sync::atomic::{AtomicBool, AtomicPtr, AtomicU32, AtomicUsize};

pub(crate) use core::sync::atomic::Ordering;

/// Gives up the current time slice while waiting on another thread.
#[inline]
pub(crate) fn yield_now() {
    #[cfg(loom)]
    loom::thread::yield_now();
    #[cfg(not(loom))]
    std::thread::yield_now();
}
