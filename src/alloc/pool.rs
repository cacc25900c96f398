//! `PoolAllocator`: fixed-size slot recycling.
//!
//! The region is cut into `element_count + 1` equal slots followed by a table of
//! slot pointers that works as a circular free list. Allocation pops from the alloc
//! end of the table, `free` pushes at the free end. The extra slot keeps the free
//! end one entry ahead, so "empty" (both ends equal) is never confused with "full".
//!
//! ```text
//! region: [ slot 0 | slot 1 | ... | slot N ][ table[0] | table[1] | ... | table[N] ]
//! ```
//!
//! # Algorithms
//!
//! - [`PoolAlgorithm::SingleThreaded`]: two table indices that wrap at the table end.
//! - [`PoolAlgorithm::Modulo`]: two wrapping 32-bit counters, `counter % table_size`.
//!   Counters are rebased under the lock before they can wrap.
//! - [`PoolAlgorithm::Mask`]: as `Modulo` with `counter & (table_size - 1)`. Chosen
//!   when the table size is a power of two; needs no rebase.
//!
//! The multithreaded variants take a single `fetch_add` while more than
//! `contention_margin` slots are free and fall back to [`PlatformLock`] otherwise.
//! The margin is a bound on concurrency, not a proof: more than `contention_margin`
//! threads racing the fast path on an almost empty pool is unsupported.

use crate::alloc::allocator::{
    assert_align, AllocError, AllocStatus, ConfigError, RawAllocator, DEFAULT_ALIGN,
};
use crate::alloc::region::Region;
use crate::concurrency::atomic::{AtomicBool, AtomicPtr, AtomicU32, Ordering};
use crate::concurrency::PlatformLock;
use core::mem::size_of;
use core::ptr::{self, NonNull};
use crossbeam_utils::{Backoff, CachePadded};
use serde::{Deserialize, Serialize};

/// One entry of the slot table.
pub type SlotEntry = AtomicPtr<u8>;

/// Largest accepted `element_count`; keeps the table size within `2^31`.
pub const MAX_ELEMENT_COUNT: u32 = 0x7FFF_FFFF;

/// Free slots below which the multithreaded pools take the lock.
pub const DEFAULT_CONTENTION_MARGIN: u32 = 16;

const HIGH_BIT: u32 = 0x8000_0000;

/// Layout and mode of a [`PoolAllocator`].
///
/// Deserialisable so pool layouts can live in configuration files:
///
/// ```
/// # use fixalloc::PoolConfig;
/// let config: PoolConfig =
///     serde_json::from_str(r#"{ "element_size": 48, "element_count": 1024 }"#).unwrap();
/// assert_eq!(config.alignment, core::mem::size_of::<usize>());
/// assert!(!config.multithread);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Bytes per element.
    pub element_size: usize,
    /// Elements the pool can hand out at once.
    pub element_count: u32,
    /// Slot alignment. Raised to at least [`DEFAULT_ALIGN`].
    #[serde(default = "default_alignment")]
    pub alignment: usize,
    /// Selects a multithreaded algorithm.
    #[serde(default)]
    pub multithread: bool,
    /// Free slots below which multithreaded calls take the lock.
    ///
    /// Must exceed the number of threads that can race the lock-free path at once.
    /// A ticket claimed past the last free slot is not refused: its caller waits in
    /// the table until another thread frees a slot. Zero is rejected in
    /// multithreaded mode.
    #[serde(default = "default_contention_margin")]
    pub contention_margin: u32,
}

fn default_alignment() -> usize {
    DEFAULT_ALIGN
}

fn default_contention_margin() -> u32 {
    DEFAULT_CONTENTION_MARGIN
}

impl PoolConfig {
    /// A single-threaded layout with pointer alignment.
    pub const fn new(element_size: usize, element_count: u32) -> Self {
        Self {
            element_size,
            element_count,
            alignment: DEFAULT_ALIGN,
            multithread: false,
            contention_margin: DEFAULT_CONTENTION_MARGIN,
        }
    }

    /// Sets the slot alignment.
    #[must_use]
    pub const fn with_alignment(mut self, alignment: usize) -> Self {
        self.alignment = alignment;
        self
    }

    /// Selects single- or multithreaded operation.
    #[must_use]
    pub const fn multithread(mut self, multithread: bool) -> Self {
        self.multithread = multithread;
        self
    }

    /// Sets the lock threshold of the multithreaded algorithms. See
    /// [`PoolConfig::contention_margin`] for the concurrency bound it implies.
    #[must_use]
    pub const fn with_contention_margin(mut self, margin: u32) -> Self {
        self.contention_margin = margin;
        self
    }

    /// Alignment actually applied to slots.
    #[inline]
    pub fn effective_alignment(&self) -> usize {
        self.alignment.max(DEFAULT_ALIGN)
    }

    /// Bytes per slot: `element_size` rounded up to the effective alignment.
    #[inline]
    pub fn slot_size(&self) -> usize {
        slot_size(self.element_size, self.effective_alignment())
    }

    /// Bytes of region this layout needs. See [`PoolAllocator::memory_amount`].
    #[inline]
    pub fn memory_amount(&self) -> usize {
        PoolAllocator::memory_amount(self.element_size, self.element_count, self.alignment)
    }

    /// Checks the layout without building a pool.
    ///
    /// # Errors
    /// Returns the first [`ConfigError`] that applies.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.alignment.is_power_of_two() {
            return Err(ConfigError::InvalidAlignment {
                align: self.alignment,
            });
        }
        if self.element_size == 0 {
            return Err(ConfigError::ZeroElementSize);
        }
        if self.element_count == 0 {
            return Err(ConfigError::ZeroElementCount);
        }
        if self.element_count > MAX_ELEMENT_COUNT {
            return Err(ConfigError::TooManyElements {
                count: self.element_count,
                max: MAX_ELEMENT_COUNT,
            });
        }
        if self.multithread && self.contention_margin == 0 {
            return Err(ConfigError::ZeroContentionMargin);
        }
        Ok(())
    }
}

#[inline]
fn slot_size(element_size: usize, align: usize) -> usize {
    element_size.div_ceil(align).saturating_mul(align)
}

/// Which algorithm backs a [`PoolAllocator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolAlgorithm {
    /// Two plain table indices.
    SingleThreaded,
    /// Atomic counters indexed modulo the table size.
    Modulo,
    /// Atomic counters indexed with a power-of-two mask.
    Mask,
}

/// Maps a wrapping 32-bit counter to a slot-table index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotIndexer {
    /// `counter % size`, for any table size.
    Modulo {
        /// Table size.
        size: u32,
    },
    /// `counter & mask`, for power-of-two table sizes.
    Mask {
        /// Table size minus one.
        mask: u32,
    },
}

impl SlotIndexer {
    /// Picks the mask form when `table_size` is a power of two.
    ///
    /// # Panics
    /// Panics if `table_size` is zero.
    pub fn for_table(table_size: u32) -> Self {
        assert!(table_size != 0, "slot table cannot be empty");
        if table_size.is_power_of_two() {
            Self::Mask {
                mask: table_size - 1,
            }
        } else {
            Self::Modulo { size: table_size }
        }
    }

    /// Table index for `counter`.
    #[inline]
    pub fn index(self, counter: u32) -> usize {
        match self {
            Self::Modulo { size } => (counter % size) as usize,
            Self::Mask { mask } => (counter & mask) as usize,
        }
    }

    /// Number of table entries.
    #[inline]
    pub fn table_size(self) -> u32 {
        match self {
            Self::Modulo { size } => size,
            Self::Mask { mask } => mask.wrapping_add(1),
        }
    }

    /// The amount both counters are lowered by on a rebase: the largest multiple of
    /// the table size not above `2^31`. `None` for masks, which survive the 32-bit
    /// wrap unchanged.
    #[inline]
    pub fn rebase_offset(self) -> Option<u32> {
        match self {
            Self::Modulo { size } => Some((HIGH_BIT / size) * size),
            Self::Mask { .. } => None,
        }
    }
}

struct LocalCursors {
    alloc: AtomicU32,
    free: AtomicU32,
}

struct SharedCounters {
    alloc: CachePadded<AtomicU32>,
    free: CachePadded<AtomicU32>,
    alloc_wrapping: AtomicBool,
    free_wrapping: AtomicBool,
    indexer: SlotIndexer,
    margin: u32,
    lock: PlatformLock,
}

enum PoolState {
    Local(LocalCursors),
    Shared(SharedCounters),
}

/// Fixed-size slot allocator over a borrowed [`Region`].
pub struct PoolAllocator<'a> {
    region: Region<'a>,
    table: &'a [SlotEntry],
    slot_size: usize,
    slot_align: usize,
    element_count: u32,
    state: PoolState,
}

impl<'a> PoolAllocator<'a> {
    /// Bytes of region needed for `element_count` elements of `element_size` bytes:
    /// `element_count + 1` slots plus as many table entries.
    ///
    /// `alignment` is raised to [`DEFAULT_ALIGN`] as in construction. Saturates
    /// instead of overflowing.
    pub fn memory_amount(element_size: usize, element_count: u32, alignment: usize) -> usize {
        let entries = element_count as usize + 1;
        slot_size(element_size, alignment.max(DEFAULT_ALIGN))
            .saturating_add(size_of::<SlotEntry>())
            .saturating_mul(entries)
    }

    /// Lays out a pool in `region`.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] if `config` is invalid, if the region start is not
    /// aligned to the slot alignment, or if the region is smaller than
    /// [`PoolConfig::memory_amount`].
    pub fn new(region: Region<'a>, config: &PoolConfig) -> Result<Self, ConfigError> {
        Self::build(region, config).map_err(|err| {
            log_warn!(error = %err, ?config, "pool construction rejected");
            err
        })
    }

    fn build(region: Region<'a>, config: &PoolConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let align = config.effective_alignment();
        if region.base_addr() & (align - 1) != 0 {
            return Err(ConfigError::MisalignedRegion { align });
        }
        let required = config.memory_amount();
        if region.len() < required {
            return Err(ConfigError::RegionTooSmall {
                required,
                provided: region.len(),
            });
        }

        let slot_size = config.slot_size();
        let entries = config.element_count as usize + 1;
        let table = unsafe { Self::write_table(&region, slot_size, entries, config.multithread) };

        let state = if config.multithread {
            let table_size = config.element_count + 1;
            PoolState::Shared(SharedCounters {
                alloc: CachePadded::new(AtomicU32::new(0)),
                free: CachePadded::new(AtomicU32::new(config.element_count)),
                alloc_wrapping: AtomicBool::new(false),
                free_wrapping: AtomicBool::new(false),
                indexer: SlotIndexer::for_table(table_size),
                margin: config.contention_margin,
                lock: PlatformLock::new(),
            })
        } else {
            PoolState::Local(LocalCursors {
                alloc: AtomicU32::new(0),
                free: AtomicU32::new(config.element_count),
            })
        };

        let pool = Self {
            region,
            table,
            slot_size,
            slot_align: align,
            element_count: config.element_count,
            state,
        };
        log_debug!(
            slot_size,
            element_count = config.element_count,
            algorithm = ?pool.algorithm(),
            "pool allocator created"
        );
        Ok(pool)
    }

    /// Writes the slot table after the last slot.
    ///
    /// The free end of the table starts on the last entry. Multithreaded pools hand
    /// pointers over through the entries, so that entry starts empty; the
    /// single-threaded pool overwrites it on the first `free` either way.
    ///
    /// # Safety
    /// `region` must hold `entries` slots of `slot_size` bytes followed by
    /// `entries` table entries, with the table offset aligned for `SlotEntry`.
    unsafe fn write_table(
        region: &Region<'a>,
        slot_size: usize,
        entries: usize,
        multithread: bool,
    ) -> &'a [SlotEntry] {
        let table = region.at(slot_size * entries).as_ptr().cast::<SlotEntry>();
        debug_assert_eq!(table as usize % core::mem::align_of::<SlotEntry>(), 0);
        for i in 0..entries {
            let slot = if multithread && i + 1 == entries {
                ptr::null_mut()
            } else {
                region.at(i * slot_size).as_ptr()
            };
            table.add(i).write(SlotEntry::new(slot));
        }
        core::slice::from_raw_parts(table, entries)
    }

    /// The algorithm chosen at construction.
    pub fn algorithm(&self) -> PoolAlgorithm {
        match &self.state {
            PoolState::Local(_) => PoolAlgorithm::SingleThreaded,
            PoolState::Shared(shared) => match shared.indexer {
                SlotIndexer::Modulo { .. } => PoolAlgorithm::Modulo,
                SlotIndexer::Mask { .. } => PoolAlgorithm::Mask,
            },
        }
    }

    /// Elements the pool can hand out at once.
    #[inline]
    pub fn element_count(&self) -> u32 {
        self.element_count
    }

    /// Bytes per slot.
    #[inline]
    pub fn slot_size(&self) -> usize {
        self.slot_size
    }

    /// Entries in the slot table, `element_count + 1`.
    #[inline]
    pub fn table_size(&self) -> usize {
        self.table.len()
    }

    /// Slots currently free. A snapshot in multithreaded mode.
    pub fn available(&self) -> u32 {
        match &self.state {
            PoolState::Local(cursors) => {
                let size = self.table.len() as u32;
                let alloc = cursors.alloc.load(Ordering::Relaxed);
                let free = cursors.free.load(Ordering::Relaxed);
                (free + size - alloc) % size
            }
            PoolState::Shared(shared) => {
                let free = shared.free.load(Ordering::Relaxed);
                free.wrapping_sub(shared.alloc.load(Ordering::Relaxed))
                    .min(self.element_count)
            }
        }
    }

    /// Returns `true` if `ptr` is the start of one of this pool's slots.
    pub fn owns(&self, ptr: *const u8) -> bool {
        if !self.region.contains(ptr) {
            return false;
        }
        let offset = ptr as usize - self.region.base_addr();
        offset < self.slot_size * self.table.len() && offset % self.slot_size == 0
    }

    /// Takes a free slot.
    ///
    /// Returns `Err(AllocError)` when every slot is in use.
    #[inline]
    pub fn allocate(&self) -> Result<NonNull<u8>, AllocError> {
        match &self.state {
            PoolState::Local(cursors) => self.allocate_local(cursors),
            PoolState::Shared(shared) => self.allocate_shared(shared),
        }
    }

    /// Returns a slot to the pool. Null is ignored.
    ///
    /// # Safety
    /// `ptr` must be null or a slot handed out by this pool and not freed since.
    /// Foreign pointers and double frees are not detected and corrupt the pool.
    #[inline]
    pub unsafe fn free(&self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }
        debug_assert!(self.owns(ptr), "pointer {ptr:p} does not belong to this pool");
        match &self.state {
            PoolState::Local(cursors) => self.free_local(cursors, ptr),
            PoolState::Shared(shared) => self.free_shared(shared, ptr),
        }
    }

    #[inline]
    fn next_index(&self, index: u32) -> u32 {
        let next = index + 1;
        if next as usize == self.table.len() {
            0
        } else {
            next
        }
    }

    #[inline]
    fn allocate_local(&self, cursors: &LocalCursors) -> Result<NonNull<u8>, AllocError> {
        let alloc = cursors.alloc.load(Ordering::Relaxed);
        if alloc == cursors.free.load(Ordering::Relaxed) {
            return Err(AllocError);
        }
        let slot = self.table[alloc as usize].load(Ordering::Relaxed);
        cursors.alloc.store(self.next_index(alloc), Ordering::Relaxed);
        NonNull::new(slot).ok_or(AllocError)
    }

    #[inline]
    fn free_local(&self, cursors: &LocalCursors, ptr: *mut u8) {
        let free = cursors.free.load(Ordering::Relaxed);
        self.table[free as usize].store(ptr, Ordering::Relaxed);
        cursors.free.store(self.next_index(free), Ordering::Relaxed);
    }

    fn allocate_shared(&self, shared: &SharedCounters) -> Result<NonNull<u8>, AllocError> {
        shared.rebase_if_wrapping();

        let ticket = if shared.has_headroom() {
            shared.alloc.fetch_add(1, Ordering::Relaxed)
        } else {
            let _guard = shared.lock.lock();
            shared.claim_locked()?
        };
        shared.raise_if_wrapping(ticket, &shared.alloc_wrapping);
        Ok(self.take(shared.indexer.index(ticket)))
    }

    fn free_shared(&self, shared: &SharedCounters, ptr: *mut u8) {
        shared.rebase_if_wrapping();

        let ticket = if shared.has_headroom() {
            let ticket = shared.free.fetch_add(1, Ordering::Relaxed);
            self.put(shared.indexer.index(ticket), ptr);
            ticket
        } else {
            let _guard = shared.lock.lock();
            let ticket = shared.free.fetch_add(1, Ordering::Relaxed);
            self.put(shared.indexer.index(ticket), ptr);
            ticket
        };
        shared.raise_if_wrapping(ticket, &shared.free_wrapping);
    }

    // A ticket only says which entry to use. The pointer itself is handed over
    // through the entry: `put` fills an empty entry, `take` empties a full one, so a
    // reader that races the matching writer waits for it instead of reading a stale
    // or recycled pointer.

    #[inline]
    fn take(&self, index: usize) -> NonNull<u8> {
        let entry = &self.table[index];
        let backoff = Backoff::new();
        loop {
            if let Some(slot) = NonNull::new(entry.swap(ptr::null_mut(), Ordering::Acquire)) {
                return slot;
            }
            snooze(&backoff);
        }
    }

    #[inline]
    fn put(&self, index: usize, ptr: *mut u8) {
        let entry = &self.table[index];
        let backoff = Backoff::new();
        while entry
            .compare_exchange_weak(ptr::null_mut(), ptr, Ordering::Release, Ordering::Relaxed)
            .is_err()
        {
            snooze(&backoff);
        }
    }

    /// Lays the free list out as if `alloc` slots had been taken and returned.
    #[cfg(test)]
    pub(crate) fn seed_counters(&mut self, alloc: u32) {
        let PoolState::Shared(shared) = &self.state else {
            panic!("seed_counters needs a multithreaded pool");
        };
        let count = self.element_count;
        for k in 0..=count {
            let slot = if k == count {
                ptr::null_mut()
            } else {
                self.region.at(k as usize * self.slot_size).as_ptr()
            };
            let index = shared.indexer.index(alloc.wrapping_add(k));
            self.table[index].store(slot, Ordering::Relaxed);
        }
        shared.alloc.store(alloc, Ordering::Relaxed);
        shared.free.store(alloc.wrapping_add(count), Ordering::Relaxed);
    }

    #[cfg(test)]
    pub(crate) fn counters(&self) -> (u32, u32) {
        match &self.state {
            PoolState::Local(c) => (c.alloc.load(Ordering::Relaxed), c.free.load(Ordering::Relaxed)),
            PoolState::Shared(s) => (s.alloc.load(Ordering::Relaxed), s.free.load(Ordering::Relaxed)),
        }
    }
}

impl SharedCounters {
    #[inline]
    fn has_headroom(&self) -> bool {
        // Free first: a later alloc read can only shrink the estimate.
        let free = self.free.load(Ordering::Relaxed);
        let available = free.wrapping_sub(self.alloc.load(Ordering::Relaxed));
        self.margin < available && available < self.indexer.table_size()
    }

    /// Advances the alloc counter unless the pool is empty. Caller holds the lock;
    /// fast-path callers may still move the counter, hence the CAS.
    fn claim_locked(&self) -> Result<u32, AllocError> {
        loop {
            let alloc = self.alloc.load(Ordering::Relaxed);
            if alloc == self.free.load(Ordering::Relaxed) {
                return Err(AllocError);
            }
            if self
                .alloc
                .compare_exchange_weak(alloc, alloc.wrapping_add(1), Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                return Ok(alloc);
            }
        }
    }

    #[inline]
    fn raise_if_wrapping(&self, ticket: u32, flag: &AtomicBool) {
        if ticket & HIGH_BIT != 0
            && self.indexer.rebase_offset().is_some()
            && !flag.load(Ordering::Relaxed)
        {
            flag.store(true, Ordering::Relaxed);
        }
    }

    #[inline]
    fn rebase_if_wrapping(&self) {
        let Some(offset) = self.indexer.rebase_offset() else {
            return;
        };
        if self.alloc_wrapping.load(Ordering::Relaxed) && self.free_wrapping.load(Ordering::Relaxed) {
            self.rebase(offset);
        }
    }

    #[cold]
    fn rebase(&self, offset: u32) {
        let _guard = self.lock.lock();
        if !(self.alloc_wrapping.load(Ordering::Relaxed) && self.free_wrapping.load(Ordering::Relaxed)) {
            return;
        }
        let alloc = self.alloc.load(Ordering::Relaxed);
        let free = self.free.load(Ordering::Relaxed);
        // A flag raised from a ticket taken before the last rebase is stale.
        if alloc & HIGH_BIT != 0 && free & HIGH_BIT != 0 {
            self.alloc.fetch_sub(offset, Ordering::Relaxed);
            self.free.fetch_sub(offset, Ordering::Relaxed);
            log_trace!(alloc, free, offset, "pool counters rebased");
        }
        self.alloc_wrapping.store(false, Ordering::Relaxed);
        self.free_wrapping.store(false, Ordering::Relaxed);
    }
}

#[inline]
fn snooze(backoff: &Backoff) {
    #[cfg(loom)]
    {
        let _ = backoff;
        crate::concurrency::atomic::yield_now();
    }
    #[cfg(not(loom))]
    backoff.snooze();
}

impl RawAllocator for PoolAllocator<'_> {
    /// Takes a slot. Requests larger than a slot or aligned beyond the slot
    /// alignment are refused.
    #[inline]
    fn allocate(&self, size: usize, align: usize) -> Result<NonNull<u8>, AllocError> {
        assert_align(align);
        if size > self.slot_size || align > self.slot_align {
            return Err(AllocError);
        }
        PoolAllocator::allocate(self)
    }

    #[inline]
    unsafe fn free(&self, ptr: *mut u8) {
        PoolAllocator::free(self, ptr);
    }

    fn status(&self) -> AllocStatus {
        let free_slots = self.available();
        AllocStatus {
            total_memory: (self.slot_size * self.table.len()) as u64,
            memory_available: free_slots as u64 * self.slot_size as u64,
            active_allocation_count: self.element_count - free_slots,
            features: 0,
        }
    }
}

impl core::fmt::Debug for PoolAllocator<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PoolAllocator")
            .field("region", &self.region)
            .field("algorithm", &self.algorithm())
            .field("slot_size", &self.slot_size)
            .field("element_count", &self.element_count)
            .field("available", &self.available())
            .finish()
    }
}
