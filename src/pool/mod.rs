//! Hierarchical region pools and the slab allocator backing them.
//!
//! A [`Pool`] is a region allocator scope: memory handed out by a pool is
//! reclaimed wholesale when the pool is cleared or destroyed. Pools form a
//! tree — destroying a pool destroys its descendants first — and carry
//! cleanup callbacks plus a small keyed user-data table. An [`Allocator`]
//! owns the free-slab lists shared by every pool created from it.

mod allocator;
#[allow(clippy::module_inception)]
mod pool;
mod tagged;

pub use allocator::Allocator;
pub use pool::{active_pool_count, CleanupFn, Pool};
pub(crate) use pool::{PoolInner, PoolLease};
pub(crate) use tagged::{AllocFlag, TaggedPool};

use bitflags::bitflags;

/// Boundary exponent: slab sizes are multiples of `1 << BOUNDARY_INDEX`.
pub const BOUNDARY_INDEX: u32 = 12;

/// Base slab granularity (4 KiB).
pub const BOUNDARY_SIZE: usize = 1 << BOUNDARY_INDEX;

/// Minimum slab handed to a pool (two boundary sizes, 8 KiB).
pub const MIN_ALLOC: usize = 2 * BOUNDARY_SIZE;

/// Number of slab size classes kept on the allocator freelist.
pub const MAX_INDEX: u32 = 20;

/// `set_max` value meaning "retain freed slabs without bound".
pub const ALLOCATOR_MAX_FREE_UNLIMITED: usize = 0;

/// Address-space reservation used by mmap-backed allocators (64 GiB).
pub const ALLOCATOR_MMAP_RESERVED: usize = 64 << 30;

/// Allocations at or above this size are tracked for exact-size recycling.
pub const BLOCK_THRESHOLD: usize = 256;

/// Default allocation alignment, compatible with 128-bit SIMD loads.
pub const DEFAULT_ALIGNMENT: usize = 16;

/// Sentinel word at the start of every native pool header.
///
/// Foreign (interop) pool implementations begin with a different value;
/// API boundaries dispatch on this word via [`is_native_pool`].
pub const POOL_MAGIC: u64 = 0xDEAD7fffDEAD7fff;

bitflags! {
    /// Options for pool creation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PoolFlags: u32 {
        /// Force the native implementation over any interop backend.
        const CUSTOM = 1;
        /// Give the pool its own mutex-protected allocator so it can be
        /// used for allocation from multiple threads.
        const THREAD_SAFE = 2;
    }
}

/// Checks whether the pool header behind `ptr` belongs to the native
/// implementation by reading its leading magic word.
///
/// This is the deliberate aliasing contract at the interop boundary: any
/// pool implementation that participates must begin its header with a
/// 64-bit sentinel. It exists only for boundary dispatch and is never
/// relied upon internally.
///
/// # Safety
///
/// `ptr` must point to at least 8 readable bytes that are the start of
/// some pool implementation's header.
pub unsafe fn is_native_pool(ptr: *const u8) -> bool {
    (ptr as *const u64).read_unaligned() == POOL_MAGIC
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_are_consistent() {
        assert_eq!(BOUNDARY_SIZE, 4096);
        assert_eq!(MIN_ALLOC, 8192);
        assert_eq!(ALLOCATOR_MMAP_RESERVED, 64 * 1024 * 1024 * 1024);
        assert!(BLOCK_THRESHOLD < MIN_ALLOC);
    }

    #[test]
    fn magic_dispatch() {
        let pool = Pool::create(PoolFlags::CUSTOM);
        assert!(unsafe { is_native_pool(pool.as_raw()) });

        let foreign = [0u8; 16];
        assert!(!unsafe { is_native_pool(foreign.as_ptr()) });
        pool.destroy();
    }
}
