//! `PlatformLock`: the short-hold mutual exclusion used by the allocators' slow paths.
//!
//! A three-state futex lock:
//! - 0: unlocked
//! - 1: locked, no waiters
//! - 2: locked, waiters may be parked
//!
//! Creation and destruction are plain construction and drop; acquisition returns a
//! [`LockGuard`] that releases on drop. The lock guards nothing by itself: callers
//! use it to serialise updates to counters and cursors that live next to it.

use super::atomic::{AtomicU32, Ordering};
use super::futex;
use core::fmt;

const UNLOCKED: u32 = 0;
const LOCKED: u32 = 1;
const CONTENDED: u32 = 2;

/// A mutual-exclusion lock with no payload.
pub struct PlatformLock {
    state: AtomicU32,
}

impl PlatformLock {
    /// Creates an unlocked lock.
    pub fn new() -> Self {
        Self {
            state: AtomicU32::new(UNLOCKED),
        }
    }

    /// Acquires the lock, blocking until it is available.
    #[inline]
    pub fn lock(&self) -> LockGuard<'_> {
        if self
            .state
            .compare_exchange(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            self.lock_contended();
        }
        LockGuard { lock: self }
    }

    /// Acquires the lock if it is free, without blocking.
    #[inline]
    pub fn try_lock(&self) -> Option<LockGuard<'_>> {
        self.state
            .compare_exchange(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| LockGuard { lock: self })
    }

    /// Returns `true` if some thread currently holds the lock.
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.state.load(Ordering::Relaxed) != UNLOCKED
    }

    #[cold]
    fn lock_contended(&self) {
        // Holders only keep the lock for a handful of instructions, so spin first.
        #[cfg(not(loom))]
        {
            let backoff = crossbeam_utils::Backoff::new();
            while !backoff.is_completed() {
                if self.state.load(Ordering::Relaxed) == UNLOCKED
                    && self
                        .state
                        .compare_exchange(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
                        .is_ok()
                {
                    return;
                }
                backoff.snooze();
            }
        }

        // Park. Taking the lock in CONTENDED state is conservative: the unlock that
        // follows may issue one unnecessary wake.
        while self.state.swap(CONTENDED, Ordering::Acquire) != UNLOCKED {
            futex::wait(&self.state, CONTENDED);
        }
    }

    #[inline]
    fn unlock(&self) {
        if self.state.swap(UNLOCKED, Ordering::Release) == CONTENDED {
            futex::wake_one(&self.state);
        }
    }
}

impl Default for PlatformLock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PlatformLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformLock")
            .field("locked", &self.is_locked())
            .finish()
    }
}

/// Releases the owning [`PlatformLock`] when dropped.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard<'a> {
    lock: &'a PlatformLock,
}

impl Drop for LockGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        self.lock.unlock();
    }
}

impl fmt::Debug for LockGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LockGuard")
    }
}
