//! Address-based parking for contended [`PlatformLock`](super::PlatformLock)s.
//!
//! Linux uses the private futex syscall, Windows uses `WaitOnAddress`. Everything
//! else (and loom models) falls back to yielding, which is correct but spins.

use super::atomic::AtomicU32;

#[cfg(all(target_os = "linux", not(loom)))]
#[inline]
pub(crate) fn wait(addr: &AtomicU32, expected: u32) {
    unsafe {
        libc::syscall(
            libc::SYS_futex,
            addr as *const AtomicU32 as *const u32,
            libc::FUTEX_WAIT | libc::FUTEX_PRIVATE_FLAG,
            expected,
            core::ptr::null::<libc::timespec>(),
        );
    }
}

#[cfg(all(target_os = "linux", not(loom)))]
#[inline]
pub(crate) fn wake_one(addr: &AtomicU32) {
    unsafe {
        libc::syscall(
            libc::SYS_futex,
            addr as *const AtomicU32 as *const u32,
            libc::FUTEX_WAKE | libc::FUTEX_PRIVATE_FLAG,
            1,
        );
    }
}

#[cfg(all(windows, not(loom)))]
#[inline]
pub(crate) fn wait(addr: &AtomicU32, expected: u32) {
    use windows_sys::Win32::System::Threading::WaitOnAddress;
    unsafe {
        WaitOnAddress(
            addr as *const AtomicU32 as *const _,
            &expected as *const u32 as *const _,
            core::mem::size_of::<u32>(),
            u32::MAX,
        );
    }
}

#[cfg(all(windows, not(loom)))]
#[inline]
pub(crate) fn wake_one(addr: &AtomicU32) {
    use windows_sys::Win32::System::Threading::WakeByAddressSingle;
    unsafe {
        WakeByAddressSingle(addr as *const AtomicU32 as *const _);
    }
}

#[cfg(any(loom, not(any(target_os = "linux", windows))))]
#[inline]
pub(crate) fn wait(addr: &AtomicU32, expected: u32) {
    use super::atomic::Ordering;
    if addr.load(Ordering::Relaxed) == expected {
        super::atomic::yield_now();
    }
}

#[cfg(any(loom, not(any(target_os = "linux", windows))))]
#[inline]
pub(crate) fn wake_one(_addr: &AtomicU32) {}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use std::sync::{Arc, Barrier};
    use std::thread;

    #[test]
    fn test_wait_returns_when_value_differs() {
        let word = AtomicU32::new(1);
        // Must not block: the value is not the expected one.
        wait(&word, 0);
        assert_eq!(word.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_wake_one_releases_waiter() {
        let word = Arc::new(AtomicU32::new(0));
        let barrier = Arc::new(Barrier::new(2));
        let waiter_word = Arc::clone(&word);
        let waiter_barrier = Arc::clone(&barrier);

        let handle = thread::spawn(move || {
            waiter_barrier.wait();
            while waiter_word.load(Ordering::SeqCst) == 0 {
                wait(&waiter_word, 0);
            }
            waiter_word.load(Ordering::SeqCst)
        });

        barrier.wait();
        word.store(7, Ordering::SeqCst);
        wake_one(&word);

        assert_eq!(handle.join().unwrap(), 7);
    }
}
