//! The allocators and the interface they share.
//!
//! Every allocator implements [`RawAllocator`]. The region-based ones borrow a
//! [`Region`] for their whole lifetime and never free it.

pub mod allocator;
pub mod bump;
pub mod dispatch;
pub mod page;
pub mod pool;
pub mod region;
pub mod scratch;
pub mod system;

mod syscall;

pub use allocator::{AllocError, AllocStatus, ConfigError, RawAllocator, DEFAULT_ALIGN};
pub use bump::{BumpAllocator, BumpMode};
pub use dispatch::{AllocatorKind, AnyAllocator};
pub use pool::{PoolAlgorithm, PoolAllocator, PoolConfig, SlotIndexer};
pub use region::{OwnedRegion, Region};
pub use scratch::ScratchRing;
pub use system::SystemAllocator;
