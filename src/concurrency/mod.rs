//! Platform concurrency primitives used by the multithreaded allocator variants.

pub(crate) mod atomic;
mod futex;
pub mod lock;

pub use lock::{LockGuard, PlatformLock};
