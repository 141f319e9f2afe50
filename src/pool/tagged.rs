//! Tagged pool handles: the low three bits of a pool handle's
//! representation are free for container use.
//!
//! Pool headers are at least 8-byte aligned, so a handle can pack three
//! flag bits into its pointer representation. All access goes through
//! accessors; the pointer is always masked before use. The SSO buffer uses
//! the first flag as its small/large discriminator.

use std::sync::Arc;

use super::pool::PoolInner;
use super::Pool;

/// Flag bits storable inside a [`TaggedPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub(crate) enum AllocFlag {
    First = 1,
    Second = 2,
    Third = 4,
}

const BIT_MASK: usize = 0b111;

/// A pool handle whose representation is a bit-packed integer: pointer
/// bits plus up to three flags.
///
/// Holds one strong reference to the pool for its whole lifetime.
pub(crate) struct TaggedPool {
    bits: usize,
}

impl TaggedPool {
    pub(crate) fn new(pool: &Pool) -> TaggedPool {
        let raw = Arc::into_raw(Arc::clone(pool.inner_arc()));
        let bits = raw as usize;
        debug_assert_eq!(bits & BIT_MASK, 0, "pool header must be 8-byte aligned");
        // Tagged handles are held by containers that keep pool memory out;
        // the lease makes clearing under them fatal instead of unsound.
        unsafe { (*raw).lease_inc() };
        TaggedPool { bits }
    }

    #[inline]
    fn raw(&self) -> *const PoolInner {
        (self.bits & !BIT_MASK) as *const PoolInner
    }

    /// Returns a plain handle to the underlying pool.
    pub(crate) fn pool(&self) -> Pool {
        // We own one strong count; mint another for the returned handle.
        unsafe {
            Arc::increment_strong_count(self.raw());
            Pool::from_arc(Arc::from_raw(self.raw()))
        }
    }

    #[inline]
    pub(crate) fn test(&self, flag: AllocFlag) -> bool {
        self.bits & flag as usize != 0
    }

    #[inline]
    pub(crate) fn set(&mut self, flag: AllocFlag) {
        self.bits |= flag as usize;
    }

    #[inline]
    pub(crate) fn reset(&mut self, flag: AllocFlag) {
        self.bits &= !(flag as usize);
    }

    #[inline]
    #[allow(dead_code)]
    pub(crate) fn flip(&mut self, flag: AllocFlag) {
        self.bits ^= flag as usize;
    }
}

impl Clone for TaggedPool {
    fn clone(&self) -> TaggedPool {
        unsafe {
            Arc::increment_strong_count(self.raw());
            (*self.raw()).lease_inc();
        }
        TaggedPool { bits: self.bits }
    }
}

impl Drop for TaggedPool {
    fn drop(&mut self) {
        unsafe {
            let arc = Arc::from_raw(self.raw());
            arc.lease_dec();
            drop(arc);
        }
    }
}

// The handle is an Arc<PoolInner> in disguise; PoolInner is Send + Sync.
unsafe impl Send for TaggedPool {}
unsafe impl Sync for TaggedPool {}
