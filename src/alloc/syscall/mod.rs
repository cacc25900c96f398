//! Direct virtual-memory mapping used by [`OwnedRegion`](super::region::OwnedRegion).

#[cfg(unix)]
mod unix;

#[cfg(windows)]
mod windows;

#[cfg(unix)]
pub(crate) use unix::*;

#[cfg(windows)]
pub(crate) use windows::*;
