use fixalloc::{AllocError, BumpAllocator, OwnedRegion, RawAllocator};
use proptest::prelude::*;
use std::collections::HashSet;
use std::thread;

fn request() -> impl Strategy<Value = (usize, usize)> {
    (0usize..200, 0u32..8).prop_map(|(size, shift)| (size, 1usize << shift))
}

proptest! {
    #[test]
    fn test_allocations_aligned_disjoint_in_bounds(
        requests in proptest::collection::vec(request(), 1..64),
        multithread in any::<bool>(),
    ) {
        let mut backing = OwnedRegion::new(4096).unwrap();
        let region = backing.region();
        let (start, end) = (region.base_addr(), region.end_addr());
        let bump = BumpAllocator::new(region, multithread);

        let mut spans: Vec<(usize, usize)> = Vec::new();
        for (size, align) in requests {
            let before = bump.used();
            match bump.allocate(size, align) {
                Ok(ptr) => {
                    let addr = ptr.as_ptr() as usize;
                    prop_assert_eq!(addr % align, 0);
                    prop_assert!(addr >= start && addr + size <= end);
                    if size > 0 {
                        spans.push((addr, addr + size));
                    }
                }
                Err(AllocError) => {
                    // A failed single-threaded request never moves the cursor.
                    if !multithread {
                        prop_assert_eq!(bump.used(), before);
                    }
                }
            }
        }

        spans.sort_unstable();
        for pair in spans.windows(2) {
            prop_assert!(pair[0].1 <= pair[1].0, "overlap: {:?}", pair);
        }
    }

    #[test]
    fn test_exhaustion_is_sticky(size in 1usize..64, align_shift in 0u32..6) {
        let align = 1usize << align_shift;
        let mut backing = OwnedRegion::new(256).unwrap();
        let bump = BumpAllocator::new(backing.region(), false);

        while bump.allocate(size, align).is_ok() {}
        let used = bump.used();
        prop_assert_eq!(bump.allocate(size, align), Err(AllocError));
        prop_assert_eq!(bump.used(), used);
        prop_assert!(256 - used < size + align);
    }
}

#[test]
fn test_reset_reuses_region() {
    let mut backing = OwnedRegion::new(512).unwrap();
    let mut bump = BumpAllocator::new(backing.region(), true);

    let first: Vec<_> = (0..4).map(|_| bump.allocate(32, 16).unwrap()).collect();
    bump.reset();
    assert_eq!(bump.status().memory_available, 512);
    let second: Vec<_> = (0..4).map(|_| bump.allocate(32, 16).unwrap()).collect();
    assert_eq!(first, second);
}

#[test]
fn test_reset_then_whole_region() {
    let mut backing = OwnedRegion::new(256).unwrap();
    let region = backing.region();
    let base = region.base();
    let mut bump = BumpAllocator::new(region, false);

    bump.allocate(100, 4).unwrap();
    assert_eq!(bump.allocate(256, 1), Err(AllocError));
    bump.reset();
    assert_eq!(bump.allocate(256, 1), Ok(base));
    assert_eq!(bump.status().memory_available, 0);
}

#[test]
fn test_free_is_noop() {
    let mut backing = OwnedRegion::new(128).unwrap();
    let bump = BumpAllocator::new(backing.region(), false);
    let ptr = bump.allocate(64, 8).unwrap();
    unsafe { bump.free(ptr.as_ptr()) };
    assert_eq!(bump.used(), 64);
}

#[test]
fn test_concurrent_bump_disjoint() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 500;
    const SIZE: usize = 24;

    let mut backing = OwnedRegion::new(THREADS * PER_THREAD * (SIZE + 8) / 2).unwrap();
    let region = backing.region();
    let (start, end) = (region.base_addr(), region.end_addr());
    let bump = BumpAllocator::new(region, true);

    let results: Vec<Vec<usize>> = thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let bump = &bump;
                s.spawn(move || {
                    let mut got = Vec::new();
                    for _ in 0..PER_THREAD {
                        if let Ok(ptr) = bump.allocate(SIZE, 8) {
                            unsafe { ptr.as_ptr().write_bytes(t as u8, SIZE) };
                            got.push(ptr.as_ptr() as usize);
                        }
                    }
                    got
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let all: Vec<usize> = results.iter().flatten().copied().collect();
    let distinct: HashSet<_> = all.iter().collect();
    assert_eq!(distinct.len(), all.len());
    // Half the requests fit; every one of them was served.
    assert_eq!(all.len(), THREADS * PER_THREAD / 2);
    for addr in &all {
        assert_eq!(addr % 8, 0);
        assert!(*addr >= start && addr + SIZE <= end);
    }
    for (t, addrs) in results.iter().enumerate() {
        for &addr in addrs {
            let bytes = unsafe { std::slice::from_raw_parts(addr as *const u8, SIZE) };
            assert!(bytes.iter().all(|&b| b == t as u8));
        }
    }
}
