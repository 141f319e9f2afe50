//! Slab allocator shared by a family of pools.

use std::alloc::{alloc_zeroed, dealloc, handle_alloc_error, Layout};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use crate::config::AllocatorConfig;
use crate::sync::{lock, Mutex};
use crate::utils::{align_up, class_size, slab_class};

use super::pool::PoolInner;
use super::{
    Pool, ALLOCATOR_MAX_FREE_UNLIMITED, ALLOCATOR_MMAP_RESERVED, BOUNDARY_INDEX, BOUNDARY_SIZE,
    MAX_INDEX,
};

/// One raw slab of memory handed to a pool's bump arena.
pub(crate) struct Slab {
    ptr: NonNull<u8>,
    size: usize,
    /// Carved out of the mmap reservation; never returned to the OS.
    from_arena: bool,
}

// Slabs are plain memory; the allocator serialises all access to them
// while they sit on the freelist.
unsafe impl Send for Slab {}

impl Slab {
    #[inline]
    pub(crate) fn ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    #[inline]
    pub(crate) fn size(&self) -> usize {
        self.size
    }
}

/// Bump-carved anonymous reservation backing slab storage.
struct MmapArena {
    map: memmap2::MmapMut,
    offset: usize,
}

impl MmapArena {
    fn reserve() -> Option<MmapArena> {
        match memmap2::MmapOptions::new()
            .len(ALLOCATOR_MMAP_RESERVED)
            .map_anon()
        {
            Ok(map) => Some(MmapArena { map, offset: 0 }),
            Err(err) => {
                tracing::warn!(
                    target: "poolcore::pool",
                    "mmap reservation failed, falling back to heap slabs: {err}"
                );
                None
            }
        }
    }

    /// Carves `size` bytes (boundary-aligned) off the reservation, or
    /// reports exhaustion with `None`.
    fn carve(&mut self, size: usize) -> Option<NonNull<u8>> {
        let start = align_up(self.offset, BOUNDARY_SIZE);
        let end = start.checked_add(size)?;
        if end > self.map.len() {
            return None;
        }
        self.offset = end;
        // The anonymous map is valid for its whole length and `start` is in
        // bounds.
        Some(unsafe { NonNull::new_unchecked(self.map.as_mut_ptr().add(start)) })
    }
}

struct AllocatorState {
    /// Free slabs, one list per power-of-two size class.
    free: [Vec<Slab>; (MAX_INDEX + 1) as usize],
    /// Bytes currently retained across all free lists.
    retained: usize,
    arena: Option<MmapArena>,
}

pub(crate) struct AllocatorInner {
    state: Mutex<AllocatorState>,
    max_free: AtomicUsize,
    default_align: usize,
    owner: Mutex<Weak<PoolInner>>,
}

/// Owner of a free-slab freelist shared by all pools created from it.
///
/// The allocator keeps [`MAX_INDEX`](super::MAX_INDEX) power-of-two slab
/// classes: class `c` holds slabs of `1 << (BOUNDARY_INDEX + c)` bytes, the
/// smallest being [`MIN_ALLOC`](super::MIN_ALLOC). Freeing a slab returns it
/// to this allocator, never to a foreign one. All operations are
/// mutex-protected, so one allocator may serve pools on multiple threads.
///
/// # Examples
///
/// ```rust
/// use poolcore::{Allocator, Pool, PoolFlags};
///
/// let alloc = Allocator::new();
/// let pool = Pool::with_allocator(&alloc, PoolFlags::CUSTOM);
/// let ptr = pool.palloc(64);
/// assert!(!ptr.as_ptr().is_null());
/// pool.destroy();
/// ```
#[derive(Clone)]
pub struct Allocator {
    inner: Arc<AllocatorInner>,
}

impl Allocator {
    /// Creates a heap-backed allocator with unlimited slab retention.
    pub fn new() -> Self {
        Self::with_config(AllocatorConfig::default())
    }

    /// Creates an allocator from a validated configuration.
    pub fn with_config(config: AllocatorConfig) -> Self {
        let arena = if config.mmap_reservation() {
            MmapArena::reserve()
        } else {
            None
        };
        Allocator {
            inner: Arc::new(AllocatorInner {
                state: Mutex::new(AllocatorState {
                    free: std::array::from_fn(|_| Vec::new()),
                    retained: 0,
                    arena,
                }),
                max_free: AtomicUsize::new(config.max_free()),
                default_align: config.alignment(),
                owner: Mutex::new(Weak::new()),
            }),
        }
    }

    /// Default alignment pools over this allocator hand out.
    pub fn default_alignment(&self) -> usize {
        self.inner.default_align
    }

    /// Creates an allocator whose slabs are carved from a single anonymous
    /// reservation of 64 GiB of address space.
    ///
    /// Carved slabs recycle through the freelist for the allocator's whole
    /// lifetime and are never released to the OS. Falls back to heap slabs
    /// if the reservation cannot be made.
    pub fn with_mmap() -> Self {
        Self::with_config(AllocatorConfig::builder().mmap_reservation(true).build())
    }

    /// Bounds the bytes retained on the freelist; `0` means unlimited.
    ///
    /// Heap slabs freed beyond the bound are returned to the OS.
    pub fn set_max(&self, bytes: usize) {
        self.inner.max_free.store(bytes, Ordering::Relaxed);
    }

    /// Records the pool that owns this allocator's lifetime.
    pub fn set_owner(&self, pool: &Pool) {
        *lock(&self.inner.owner) = Arc::downgrade(pool.inner_arc());
    }

    /// Returns the owner pool, if one was set and is still alive.
    pub fn owner(&self) -> Option<Pool> {
        lock(&self.inner.owner).upgrade().map(Pool::from_arc)
    }

    /// Bytes currently sitting on the free-slab lists.
    pub fn retained_bytes(&self) -> usize {
        lock(&self.inner.state).retained
    }

    /// Hands out a slab of at least `min_size` bytes.
    ///
    /// The slab contents are unspecified; pools zero each block they hand
    /// out. Exhaustion of the system allocator is fatal.
    pub(crate) fn alloc_slab(&self, min_size: usize) -> Slab {
        if let Some(class) = slab_class(min_size, BOUNDARY_INDEX, MAX_INDEX) {
            let size = class_size(class, BOUNDARY_INDEX);
            let mut state = lock(&self.inner.state);
            if let Some(slab) = state.free[class as usize].pop() {
                state.retained -= slab.size;
                return slab;
            }
            if let Some(arena) = state.arena.as_mut() {
                if let Some(ptr) = arena.carve(size) {
                    return Slab {
                        ptr,
                        size,
                        from_arena: true,
                    };
                }
                // Reservation exhausted: 64 GiB of slabs are live. Treated
                // the same as heap exhaustion.
                handle_alloc_error(slab_layout(size));
            }
            drop(state);
            return heap_slab(size);
        }
        // Beyond the largest class: allocate exactly, bypass the freelist.
        heap_slab(align_up(min_size, BOUNDARY_SIZE))
    }

    /// Returns a slab to the freelist (or the OS, past the retention bound).
    pub(crate) fn free_slab(&self, slab: Slab) {
        let class = slab_class(slab.size, BOUNDARY_INDEX, MAX_INDEX)
            .filter(|c| class_size(*c, BOUNDARY_INDEX) == slab.size);
        let max = self.inner.max_free.load(Ordering::Relaxed);
        let mut state = lock(&self.inner.state);
        match class {
            // Arena slabs cannot be unmapped piecemeal, so they are always
            // retained regardless of the bound.
            Some(class)
                if slab.from_arena
                    || max == ALLOCATOR_MAX_FREE_UNLIMITED
                    || state.retained + slab.size <= max =>
            {
                state.retained += slab.size;
                state.free[class as usize].push(slab);
            }
            _ => {
                drop(state);
                release_slab(slab);
            }
        }
    }
}

impl Default for Allocator {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AllocatorState {
    fn drop(&mut self) {
        for list in &mut self.free {
            for slab in list.drain(..) {
                release_slab(slab);
            }
        }
    }
}

#[inline]
fn slab_layout(size: usize) -> Layout {
    // Slab bases are boundary-aligned so any sub-alignment a pool hands out
    // can be satisfied by offset arithmetic alone.
    Layout::from_size_align(size, BOUNDARY_SIZE).expect("slab layout")
}

fn heap_slab(size: usize) -> Slab {
    let layout = slab_layout(size);
    let ptr = unsafe { alloc_zeroed(layout) };
    let Some(ptr) = NonNull::new(ptr) else {
        handle_alloc_error(layout);
    };
    Slab {
        ptr,
        size,
        from_arena: false,
    }
}

fn release_slab(slab: Slab) {
    if !slab.from_arena {
        unsafe { dealloc(slab.ptr.as_ptr(), slab_layout(slab.size)) };
    }
    // Arena slabs are dropped on the floor; the reservation itself is
    // unmapped when the allocator goes away.
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::MIN_ALLOC;

    #[test]
    fn slabs_recycle_through_freelist() {
        let alloc = Allocator::new();
        let slab = alloc.alloc_slab(100);
        assert_eq!(slab.size(), MIN_ALLOC);
        let ptr = slab.ptr();

        alloc.free_slab(slab);
        assert_eq!(alloc.retained_bytes(), MIN_ALLOC);

        let again = alloc.alloc_slab(MIN_ALLOC);
        assert_eq!(again.ptr(), ptr);
        assert_eq!(alloc.retained_bytes(), 0);
        alloc.free_slab(again);
    }

    #[test]
    fn set_max_bounds_retention() {
        let alloc = Allocator::new();
        alloc.set_max(MIN_ALLOC);

        let a = alloc.alloc_slab(MIN_ALLOC);
        let b = alloc.alloc_slab(MIN_ALLOC);
        alloc.free_slab(a);
        alloc.free_slab(b);

        // The second slab went back to the OS.
        assert_eq!(alloc.retained_bytes(), MIN_ALLOC);
    }

    #[test]
    fn classes_round_up_to_power_of_two() {
        let alloc = Allocator::new();
        let slab = alloc.alloc_slab(MIN_ALLOC + 1);
        assert_eq!(slab.size(), 2 * MIN_ALLOC);
        alloc.free_slab(slab);
    }

    #[test]
    fn mmap_allocator_serves_slabs() {
        let alloc = Allocator::with_mmap();
        let slab = alloc.alloc_slab(MIN_ALLOC);
        // Works whether the reservation succeeded or fell back to the heap.
        assert!(slab.size() >= MIN_ALLOC);
        alloc.free_slab(slab);
        assert_eq!(alloc.retained_bytes(), MIN_ALLOC);
    }
}
