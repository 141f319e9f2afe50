//! Batched node storage shared by the tree and list engines.
//!
//! Nodes are allocated from the pool either in contiguous batches (one
//! pool block per batch, identified by a bounded batch index) or, once the
//! index space is exhausted, one at a time. Freed nodes thread onto a
//! private freelist owned by the container; a batch's block is returned to
//! the pool only when every one of its nodes is idle.

use std::mem::{align_of, size_of};
use std::ptr::NonNull;

use crate::pool::{Pool, PoolLease};

/// Upper bound on live batches per arena. Past it, allocation falls back
/// to the per-node path, which does not participate in batch recycling.
pub(crate) const MAX_BATCHES: usize = 64;

/// Batch index marking a node allocated outside any batch.
pub(crate) const SINGLETON: u32 = u32::MAX;

/// Implemented by node types stored in a [`NodeArena`]. The free link may
/// reuse one of the node's own link fields.
pub(crate) trait ArenaNode: Sized {
    fn set_batch(&mut self, batch: u32);
    fn batch(&self) -> u32;
    fn set_free_next(&mut self, next: *mut Self);
    fn free_next(&self) -> *mut Self;
}

struct Batch<N> {
    ptr: NonNull<N>,
    cap: u32,
    /// Nodes of this batch currently handed out to the container.
    live: u32,
    /// Pool block size, for exact-size recycling.
    bytes: usize,
}

impl<N> Batch<N> {
    #[cfg(test)]
    #[inline]
    fn contains(&self, node: *mut N) -> bool {
        let base = self.ptr.as_ptr() as usize;
        let addr = node as usize;
        addr >= base && addr < base + self.cap as usize * size_of::<N>()
    }
}

pub(crate) struct NodeArena<N: ArenaNode> {
    lease: PoolLease,
    batches: Vec<Option<Batch<N>>>,
    free_head: *mut N,
    free_count: usize,
    persistent: bool,
}

impl<N: ArenaNode> NodeArena<N> {
    pub(crate) fn new(pool: &Pool) -> Self {
        NodeArena {
            lease: pool.acquire_lease(),
            batches: Vec::new(),
            free_head: std::ptr::null_mut(),
            free_count: 0,
            persistent: false,
        }
    }

    #[inline]
    pub(crate) fn pool(&self) -> &Pool {
        self.lease.pool()
    }

    /// Number of idle nodes available without touching the pool.
    #[inline]
    pub(crate) fn free_capacity(&self) -> usize {
        self.free_count
    }

    /// Keep freed nodes forever, even through [`shrink_to_fit`].
    ///
    /// [`shrink_to_fit`]: NodeArena::shrink_to_fit
    pub(crate) fn set_persistent(&mut self, persistent: bool) {
        self.persistent = persistent;
    }

    fn push_free(&mut self, node: NonNull<N>) {
        unsafe { (*node.as_ptr()).set_free_next(self.free_head) };
        self.free_head = node.as_ptr();
        self.free_count += 1;
    }

    /// Finds a free batch slot, or `None` when the index space is full.
    fn claim_batch_index(&mut self) -> Option<u32> {
        if let Some(idx) = self.batches.iter().position(|b| b.is_none()) {
            return Some(idx as u32);
        }
        if self.batches.len() < MAX_BATCHES {
            self.batches.push(None);
            return Some((self.batches.len() - 1) as u32);
        }
        None
    }

    /// Allocates one contiguous batch of `count` nodes and threads them
    /// onto the freelist. Returns false when the batch index space has
    /// overflowed (callers fall back to per-node allocation).
    pub(crate) fn alloc_batch(&mut self, count: usize) -> bool {
        debug_assert!(count > 0);
        let Some(index) = self.claim_batch_index() else {
            return false;
        };
        let count = count.min(u32::MAX as usize);
        let mut bytes = count * size_of::<N>();
        let ptr = match self
            .pool()
            .alloc_aligned(&mut bytes, align_of::<N>().max(8))
        {
            Ok(ptr) => ptr.cast::<N>(),
            Err(_) => return false,
        };
        self.batches[index as usize] = Some(Batch {
            ptr,
            cap: count as u32,
            live: 0,
            bytes,
        });
        for i in 0..count {
            let node = unsafe { NonNull::new_unchecked(ptr.as_ptr().add(i)) };
            unsafe { (*node.as_ptr()).set_batch(index) };
            self.push_free(node);
        }
        true
    }

    /// Ensures at least `count` idle nodes are available.
    pub(crate) fn reserve(&mut self, count: usize) {
        if count > self.free_count {
            self.alloc_batch(count - self.free_count);
        }
    }

    /// Hands out one node. The node's value storage is uninitialised; its
    /// batch header is valid.
    pub(crate) fn alloc_node(&mut self) -> NonNull<N> {
        if let Some(head) = NonNull::new(self.free_head) {
            self.free_head = unsafe { (*head.as_ptr()).free_next() };
            self.free_count -= 1;
            let batch = unsafe { (*head.as_ptr()).batch() };
            if batch != SINGLETON {
                if let Some(b) = self.batches[batch as usize].as_mut() {
                    b.live += 1;
                }
            }
            return head;
        }
        // Per-node fallback; also the path taken after index overflow.
        let node = self.pool().palloc(size_of::<N>()).cast::<N>();
        unsafe { (*node.as_ptr()).set_batch(SINGLETON) };
        node
    }

    /// Returns a node (value already dropped) to the freelist.
    pub(crate) fn free_node(&mut self, node: NonNull<N>) {
        let batch = unsafe { (*node.as_ptr()).batch() };
        if batch != SINGLETON {
            if let Some(b) = self.batches[batch as usize].as_mut() {
                debug_assert!(b.live > 0);
                b.live -= 1;
            }
        }
        self.push_free(node);
    }

    /// Releases batches whose every node is idle and frees idle singleton
    /// nodes. A no-op for persistent arenas.
    pub(crate) fn shrink_to_fit(&mut self) {
        if self.persistent {
            return;
        }
        let pool = self.lease.pool().clone();

        // Decide which batches go.
        let mut releasable = [false; MAX_BATCHES];
        for (i, batch) in self.batches.iter().enumerate() {
            if let Some(b) = batch {
                releasable[i] = b.live == 0;
            }
        }

        // Rebuild the freelist, dropping nodes that belong to a released
        // batch and returning singletons to the pool.
        let mut keep: *mut N = std::ptr::null_mut();
        let mut kept = 0usize;
        let mut cursor = self.free_head;
        while let Some(node) = NonNull::new(cursor) {
            cursor = unsafe { (*node.as_ptr()).free_next() };
            let batch = unsafe { (*node.as_ptr()).batch() };
            if batch == SINGLETON {
                pool.free(node.cast::<u8>(), size_of::<N>());
            } else if !releasable[batch as usize] {
                unsafe { (*node.as_ptr()).set_free_next(keep) };
                keep = node.as_ptr();
                kept += 1;
            }
        }
        self.free_head = keep;
        self.free_count = kept;

        for (i, slot) in self.batches.iter_mut().enumerate() {
            if releasable[i] {
                if let Some(batch) = slot.take() {
                    pool.free(batch.ptr.cast::<u8>(), batch.bytes);
                }
            }
        }
    }

    /// Verifies a freed pointer belongs to this arena (tests only).
    #[cfg(test)]
    pub(crate) fn owns(&self, node: *mut N) -> bool {
        self.batches
            .iter()
            .flatten()
            .any(|batch| batch.contains(node))
    }
}

impl<N: ArenaNode> Drop for NodeArena<N> {
    fn drop(&mut self) {
        // The engine has already freed every live node back to us.
        let pool = self.lease.pool().clone();
        let mut cursor = self.free_head;
        while let Some(node) = NonNull::new(cursor) {
            cursor = unsafe { (*node.as_ptr()).free_next() };
            if unsafe { (*node.as_ptr()).batch() } == SINGLETON {
                pool.free(node.cast::<u8>(), size_of::<N>());
            }
        }
        for slot in self.batches.iter_mut() {
            if let Some(batch) = slot.take() {
                debug_assert_eq!(batch.live, 0, "arena dropped with live batch nodes");
                pool.free(batch.ptr.cast::<u8>(), batch.bytes);
            }
        }
    }
}
