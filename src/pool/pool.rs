//! Region pools: bump arenas with hierarchical lifetime, cleanup hooks,
//! and keyed user-data.

use std::alloc::{alloc_zeroed, dealloc, handle_alloc_error, Layout};
use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use crate::error::{Result, Status};
use crate::sync::{lock, Mutex};
use crate::utils::align_up;

use super::allocator::{Allocator, Slab};
use super::{BLOCK_THRESHOLD, BOUNDARY_SIZE, DEFAULT_ALIGNMENT, MIN_ALLOC, POOL_MAGIC, PoolFlags};

/// Cleanup callback: invoked with the `data` pointer it was registered
/// with. Failures are logged and swallowed.
pub type CleanupFn = fn(*mut ()) -> Result<()>;

static ACTIVE_POOLS: AtomicUsize = AtomicUsize::new(0);

/// Number of pools created and not yet destroyed, process-wide.
pub fn active_pool_count() -> usize {
    ACTIVE_POOLS.load(Ordering::Relaxed)
}

enum CleanupRecord {
    Raw { data: *mut (), func: CleanupFn },
    Owned(Box<dyn FnOnce() + Send>),
}

impl CleanupRecord {
    fn run(self) {
        match self {
            CleanupRecord::Raw { data, func } => {
                if let Err(status) = func(data) {
                    tracing::error!(target: "poolcore::pool", "cleanup failed: {status}");
                }
            }
            CleanupRecord::Owned(f) => f(),
        }
    }
}

struct UserData {
    value: *mut (),
    cleanup: Option<CleanupFn>,
}

/// User-data key: a raw string slice that either borrows a `'static` key
/// (`userdata_setn`) or points at a pool copy made with `strdup`
/// (`userdata_set`). Either way there is nothing to drop — pool copies are
/// reclaimed with the arena, after the user-data table has been emptied.
struct UserKey {
    ptr: *const u8,
    len: usize,
}

impl UserKey {
    fn borrowed(key: &'static str) -> UserKey {
        UserKey {
            ptr: key.as_ptr(),
            len: key.len(),
        }
    }

    fn pooled(ptr: NonNull<u8>, len: usize) -> UserKey {
        UserKey {
            ptr: ptr.as_ptr(),
            len,
        }
    }

    #[inline]
    fn as_str(&self) -> &str {
        // Both backing stores outlive the table entry: 'static keys
        // trivially, pool copies because teardown drops the table before
        // releasing the arena.
        unsafe { std::str::from_utf8_unchecked(std::slice::from_raw_parts(self.ptr, self.len)) }
    }
}

impl PartialEq for UserKey {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for UserKey {}

impl Hash for UserKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_str().hash(state);
    }
}

impl Borrow<str> for UserKey {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

/// All mutable pool state, behind the pool mutex.
struct PoolState {
    /// Bump arena: slabs plus the offset into the last one.
    slabs: Vec<Slab>,
    offset: usize,
    /// Live large blocks, keyed by address.
    large_live: HashMap<usize, usize>,
    /// Recycled large blocks, keyed by exact (aligned) size.
    large_free: HashMap<usize, Vec<NonNull<u8>>>,
    pre_cleanups: Vec<CleanupRecord>,
    cleanups: Vec<CleanupRecord>,
    children: Vec<Pool>,
    userdata: HashMap<UserKey, UserData>,
    /// Opaque tag + pointer last set by the context stack.
    ctx_tag: u32,
    ctx_ptr: usize,
}

impl PoolState {
    fn new() -> Self {
        PoolState {
            slabs: Vec::new(),
            offset: 0,
            large_live: HashMap::new(),
            large_free: HashMap::new(),
            pre_cleanups: Vec::new(),
            cleanups: Vec::new(),
            children: Vec::new(),
            userdata: HashMap::new(),
            ctx_tag: 0,
            ctx_ptr: 0,
        }
    }
}

/// Pool header. The magic word must stay the first field: the interop
/// boundary reads it through [`is_native_pool`](super::is_native_pool).
#[repr(C)]
pub(crate) struct PoolInner {
    magic: u64,
    allocator: Allocator,
    parent: Weak<PoolInner>,
    dead: AtomicBool,
    leases: AtomicUsize,
    allocated: AtomicUsize,
    returned: AtomicUsize,
    name: Option<&'static str>,
    state: Mutex<PoolState>,
}

// Raw pointers inside the state (user-data values, cleanup data) are only
// touched under the pool mutex; responsibility for what they point at lies
// with whoever registered them.
unsafe impl Send for PoolInner {}
unsafe impl Sync for PoolInner {}

impl PoolInner {
    pub(crate) fn lease_inc(&self) {
        self.leases.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn lease_dec(&self) {
        self.leases.fetch_sub(1, Ordering::AcqRel);
    }
}

/// A hierarchical region pool.
///
/// Memory allocated from a pool stays valid until the pool is cleared or
/// destroyed; there is no per-object free below
/// [`BLOCK_THRESHOLD`](super::BLOCK_THRESHOLD). Destroying a pool destroys
/// its descendants (in reverse registration order) before running its own
/// cleanups.
///
/// Handles are cheap clones of a shared header. Every operation on a
/// destroyed pool panics.
///
/// # Examples
///
/// ```rust
/// use poolcore::{Pool, PoolFlags};
///
/// let pool = Pool::create(PoolFlags::CUSTOM);
/// let mut size = 200;
/// let ptr = pool.alloc(&mut size);
/// assert!(size >= 200);
/// assert!(!ptr.as_ptr().is_null());
/// pool.destroy();
/// ```
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

impl Pool {
    /// Creates an unmanaged root pool with its own allocator.
    pub fn create(flags: PoolFlags) -> Pool {
        Self::with_allocator(&Allocator::new(), flags)
    }

    /// Creates an unmanaged root pool with a debug tag.
    pub fn create_tagged(tag: &'static str, flags: PoolFlags) -> Pool {
        Self::new_pool(Allocator::new(), Weak::new(), Some(tag), flags)
    }

    /// Creates a root pool over an existing allocator.
    ///
    /// With [`PoolFlags::THREAD_SAFE`] the pool ignores `allocator` and
    /// takes a private one it can safely share across threads.
    pub fn with_allocator(allocator: &Allocator, flags: PoolFlags) -> Pool {
        Self::new_pool(allocator.clone(), Weak::new(), None, flags)
    }

    /// Creates a child pool linked into `parent`'s child list.
    ///
    /// The child shares the parent's allocator (unless
    /// [`PoolFlags::THREAD_SAFE`] asks for a private one) and is destroyed
    /// transitively when the parent is cleared or destroyed.
    pub fn child_of(parent: &Pool, flags: PoolFlags) -> Pool {
        parent.check_alive();
        let child = Self::new_pool(
            parent.inner.allocator.clone(),
            Arc::downgrade(&parent.inner),
            None,
            flags,
        );
        lock(&parent.inner.state).children.push(child.clone());
        child
    }

    /// Tagged variant of [`child_of`](Pool::child_of).
    pub fn child_of_tagged(parent: &Pool, tag: &'static str, flags: PoolFlags) -> Pool {
        parent.check_alive();
        let child = Self::new_pool(
            parent.inner.allocator.clone(),
            Arc::downgrade(&parent.inner),
            Some(tag),
            flags,
        );
        lock(&parent.inner.state).children.push(child.clone());
        child
    }

    fn new_pool(
        allocator: Allocator,
        parent: Weak<PoolInner>,
        name: Option<&'static str>,
        flags: PoolFlags,
    ) -> Pool {
        let allocator = if flags.contains(PoolFlags::THREAD_SAFE) {
            Allocator::new()
        } else {
            allocator
        };
        let pool = Pool {
            inner: Arc::new(PoolInner {
                magic: POOL_MAGIC,
                allocator,
                parent,
                dead: AtomicBool::new(false),
                leases: AtomicUsize::new(0),
                allocated: AtomicUsize::new(0),
                returned: AtomicUsize::new(0),
                name,
                state: Mutex::new(PoolState::new()),
            }),
        };
        ACTIVE_POOLS.fetch_add(1, Ordering::Relaxed);
        pool
    }

    pub(crate) fn from_arc(inner: Arc<PoolInner>) -> Pool {
        Pool { inner }
    }

    pub(crate) fn inner_arc(&self) -> &Arc<PoolInner> {
        &self.inner
    }

    /// Raw pointer to the pool header, for boundary dispatch on the magic
    /// word. The pointer is valid while this handle is.
    pub fn as_raw(&self) -> *const u8 {
        Arc::as_ptr(&self.inner) as *const u8
    }

    /// Returns the allocator backing this pool.
    pub fn allocator(&self) -> Allocator {
        self.inner.allocator.clone()
    }

    /// Debug tag attached at creation, if any.
    pub fn tag(&self) -> Option<&'static str> {
        self.inner.name
    }

    /// Two handles are the same pool if they share a header.
    #[inline]
    pub fn same(&self, other: &Pool) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    #[inline]
    fn check_alive(&self) {
        assert!(
            !self.inner.dead.load(Ordering::Acquire),
            "pool used after destroy"
        );
    }

    // ----- allocation -------------------------------------------------

    /// Allocates a zero-initialised block with the default alignment
    /// (16, unless the allocator was configured otherwise).
    ///
    /// `size` is updated to the actual allocated size. Blocks below
    /// [`BLOCK_THRESHOLD`](super::BLOCK_THRESHOLD) come from the bump arena
    /// and are reclaimed only by [`clear`](Pool::clear); blocks at or above
    /// it are tracked so [`free`](Pool::free) can recycle them by exact
    /// size.
    ///
    /// Allocation never fails; system-allocator exhaustion aborts.
    ///
    /// The returned block stays valid until the pool is cleared or
    /// destroyed; dereferencing it after that is undefined behaviour (the
    /// usual contract of raw allocation APIs).
    pub fn alloc(&self, size: &mut usize) -> NonNull<u8> {
        match self.alloc_aligned(size, self.inner.allocator.default_alignment()) {
            Ok(ptr) => ptr,
            // Configured alignment is validated at build time.
            Err(_) => unreachable!(),
        }
    }

    /// Allocates a zero-initialised block with the requested alignment.
    ///
    /// # Errors
    ///
    /// Alignment must be a power of two no larger than the slab boundary
    /// size (4 KiB).
    pub fn alloc_aligned(&self, size: &mut usize, align: usize) -> Result<NonNull<u8>> {
        self.check_alive();
        crate::utils::validate_alignment(align)?;
        if align > BOUNDARY_SIZE {
            return Err(Status::invalid_arg(
                "alignment may not exceed the slab boundary size",
            ));
        }
        let align = align.max(DEFAULT_ALIGNMENT);
        let actual = align_up((*size).max(1), align);
        let mut state = lock(&self.inner.state);
        let ptr = if actual < BLOCK_THRESHOLD {
            self.bump_alloc(&mut state, actual, align)
        } else {
            self.large_alloc(&mut state, actual)
        };
        drop(state);
        self.inner.allocated.fetch_add(actual, Ordering::Relaxed);
        *size = actual;
        unsafe { std::ptr::write_bytes(ptr.as_ptr(), 0, actual) };
        Ok(ptr)
    }

    fn bump_alloc(&self, state: &mut PoolState, size: usize, align: usize) -> NonNull<u8> {
        let aligned_offset = align_up(state.offset, align);
        let fits = state
            .slabs
            .last()
            .map(|slab| aligned_offset + size <= slab.size())
            .unwrap_or(false);
        if !fits {
            let slab = self.inner.allocator.alloc_slab(size.max(MIN_ALLOC));
            state.slabs.push(slab);
            state.offset = 0;
        }
        let base = state.slabs.last().expect("slab just ensured").ptr();
        let aligned_offset = align_up(state.offset, align);
        state.offset = aligned_offset + size;
        unsafe { NonNull::new_unchecked(base.as_ptr().add(aligned_offset)) }
    }

    fn large_alloc(&self, state: &mut PoolState, size: usize) -> NonNull<u8> {
        if let Some(list) = state.large_free.get_mut(&size) {
            if let Some(ptr) = list.pop() {
                state.large_live.insert(ptr.as_ptr() as usize, size);
                return ptr;
            }
        }
        let layout = large_layout(size);
        let raw = unsafe { alloc_zeroed(layout) };
        let Some(ptr) = NonNull::new(raw) else {
            handle_alloc_error(layout);
        };
        state.large_live.insert(ptr.as_ptr() as usize, size);
        ptr
    }

    /// Returns a large block to the pool's exact-size freelist.
    ///
    /// Only meaningful for blocks allocated at or above
    /// [`BLOCK_THRESHOLD`](super::BLOCK_THRESHOLD); smaller blocks are
    /// leaked until the pool is cleared. `size` must be the size passed to
    /// (or returned from) the allocation call. Pointers the pool does not
    /// recognise are ignored.
    pub fn free(&self, ptr: NonNull<u8>, size: usize) {
        self.check_alive();
        if align_up(size.max(1), DEFAULT_ALIGNMENT) < BLOCK_THRESHOLD {
            return;
        }
        let mut state = lock(&self.inner.state);
        match state.large_live.remove(&(ptr.as_ptr() as usize)) {
            // The live table knows the true allocated size; the passed
            // size only has to be consistent with it.
            Some(live_size) if size <= live_size => {
                state.large_free.entry(live_size).or_default().push(ptr);
                drop(state);
                self.inner.returned.fetch_add(live_size, Ordering::Relaxed);
            }
            Some(live_size) => {
                // Oversized free: keep the block live rather than corrupt
                // the freelist.
                state.large_live.insert(ptr.as_ptr() as usize, live_size);
                tracing::error!(
                    target: "poolcore::pool",
                    "free() with mismatched size {size} (allocated {live_size})"
                );
            }
            None => {
                tracing::error!(target: "poolcore::pool", "free() of unknown block");
            }
        }
    }

    /// Allocates `size` zeroed bytes with the default alignment.
    #[inline]
    pub fn palloc(&self, size: usize) -> NonNull<u8> {
        let mut size = size;
        self.alloc(&mut size)
    }

    /// Allocates a zeroed array of `count` elements of `eltsize` bytes.
    #[inline]
    pub fn calloc(&self, count: usize, eltsize: usize) -> NonNull<u8> {
        self.palloc(count.checked_mul(eltsize).expect("calloc size overflow"))
    }

    /// Copies `data` into the pool.
    pub fn memdup(&self, data: &[u8]) -> NonNull<u8> {
        let ptr = self.palloc(data.len().max(1));
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.as_ptr(), data.len());
        }
        ptr
    }

    /// Copies `s` into the pool with a trailing NUL byte.
    pub fn strdup(&self, s: &str) -> NonNull<u8> {
        let ptr = self.palloc(s.len() + 1);
        unsafe {
            std::ptr::copy_nonoverlapping(s.as_ptr(), ptr.as_ptr(), s.len());
            // palloc zeroed the block, so the terminator is already there.
        }
        ptr
    }

    // ----- cleanups ---------------------------------------------------

    /// Registers a `(data, fn)` cleanup. Cleanups run in LIFO order after
    /// child pools have been destroyed.
    pub fn cleanup_register(&self, data: *mut (), func: CleanupFn) {
        self.check_alive();
        lock(&self.inner.state)
            .cleanups
            .push(CleanupRecord::Raw { data, func });
    }

    /// Registers a closure cleanup (LIFO, after children are destroyed).
    pub fn cleanup_register_fn(&self, func: impl FnOnce() + Send + 'static) {
        self.check_alive();
        lock(&self.inner.state)
            .cleanups
            .push(CleanupRecord::Owned(Box::new(func)));
    }

    /// Registers a `(data, fn)` pre-cleanup. Pre-cleanups run in LIFO order
    /// *before* child pools are destroyed, so they may still touch
    /// descendants.
    pub fn pre_cleanup_register(&self, data: *mut (), func: CleanupFn) {
        self.check_alive();
        lock(&self.inner.state)
            .pre_cleanups
            .push(CleanupRecord::Raw { data, func });
    }

    /// Closure form of [`pre_cleanup_register`](Pool::pre_cleanup_register).
    pub fn pre_cleanup_register_fn(&self, func: impl FnOnce() + Send + 'static) {
        self.check_alive();
        lock(&self.inner.state)
            .pre_cleanups
            .push(CleanupRecord::Owned(Box::new(func)));
    }

    /// Removes a specific `(data, fn)` registration from both lists.
    pub fn cleanup_kill(&self, data: *mut (), func: CleanupFn) {
        self.check_alive();
        let matches = |record: &CleanupRecord| {
            matches!(record, CleanupRecord::Raw { data: d, func: f } if *d == data && *f == func)
        };
        let mut state = lock(&self.inner.state);
        state.cleanups.retain(|r| !matches(r));
        state.pre_cleanups.retain(|r| !matches(r));
    }

    // ----- user data --------------------------------------------------

    /// Attaches an opaque value under `key`, storing a pool-local copy of
    /// the key.
    ///
    /// The optional cleanup runs with the value when the pool is cleared.
    pub fn userdata_set(
        &self,
        key: &str,
        value: *mut (),
        cleanup: Option<CleanupFn>,
    ) -> Result<()> {
        self.check_alive();
        let copy = self.strdup(key);
        lock(&self.inner.state).userdata.insert(
            UserKey::pooled(copy, key.len()),
            UserData { value, cleanup },
        );
        Ok(())
    }

    /// Attaches an opaque value under a borrowed key, copying neither key
    /// nor value.
    pub fn userdata_setn(
        &self,
        key: &'static str,
        value: *mut (),
        cleanup: Option<CleanupFn>,
    ) -> Result<()> {
        self.check_alive();
        lock(&self.inner.state)
            .userdata
            .insert(UserKey::borrowed(key), UserData { value, cleanup });
        Ok(())
    }

    /// Looks up the value stored under `key`. A missing key is success with
    /// `None`.
    pub fn userdata_get(&self, key: &str) -> Result<Option<*mut ()>> {
        self.check_alive();
        Ok(lock(&self.inner.state).userdata.get(key).map(|u| u.value))
    }

    // ----- observability ----------------------------------------------

    /// Total bytes handed out since creation or the last clear.
    pub fn allocated_bytes(&self) -> usize {
        self.inner.allocated.load(Ordering::Relaxed)
    }

    /// Total bytes returned through the large-block freelist.
    pub fn return_bytes(&self) -> usize {
        self.inner.returned.load(Ordering::Relaxed)
    }

    /// Snapshot of the pool's accounting counters.
    pub fn stats(&self) -> crate::stats::PoolStats {
        crate::stats::PoolStats {
            allocated_bytes: self.allocated_bytes(),
            returned_bytes: self.return_bytes(),
            tag: self.inner.name,
            lease_count: self.inner.leases.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn set_context_info(&self, tag: u32, ptr: usize) {
        let mut state = lock(&self.inner.state);
        state.ctx_tag = tag;
        state.ctx_ptr = ptr;
    }

    /// Tag and payload last recorded for this pool by the context stack.
    pub fn context_info(&self) -> (u32, usize) {
        let state = lock(&self.inner.state);
        (state.ctx_tag, state.ctx_ptr)
    }

    // ----- lifetime ---------------------------------------------------

    /// Clears the pool: pre-cleanups (LIFO), children destroyed in reverse
    /// registration order, cleanups (LIFO), user-data dropped, all memory
    /// reclaimed. The pool itself remains valid.
    ///
    /// # Panics
    ///
    /// Panics if any container still leases memory from this pool.
    pub fn clear(&self) {
        self.check_alive();
        self.teardown_contents();
    }

    /// Destroys the pool: [`clear`](Pool::clear), then the handle becomes
    /// dead. Any further use of any handle to this pool panics.
    pub fn destroy(&self) {
        self.check_alive();
        // Unlink from the parent so the parent does not destroy us again.
        if let Some(parent) = self.inner.parent.upgrade() {
            lock(&parent.state)
                .children
                .retain(|c| !Arc::ptr_eq(&c.inner, &self.inner));
        }
        self.destroy_unlinked();
    }

    /// Destroy without touching the parent's child list (the parent has
    /// already detached us, or is mid-teardown itself).
    fn destroy_unlinked(&self) {
        destroy_inner(&self.inner);
    }

    /// Shared teardown sequence for clear/destroy/drop.
    fn teardown_contents(&self) {
        teardown_inner(&self.inner);
    }

    // ----- leases -----------------------------------------------------

    pub(crate) fn acquire_lease(&self) -> PoolLease {
        self.check_alive();
        self.inner.leases.fetch_add(1, Ordering::AcqRel);
        PoolLease { pool: self.clone() }
    }
}

fn destroy_inner(inner: &PoolInner) {
    if inner.dead.swap(true, Ordering::AcqRel) {
        return;
    }
    // The dead flag is set, but teardown still needs the state; the flag
    // only gates *external* entry points.
    teardown_inner(inner);
    ACTIVE_POOLS.fetch_sub(1, Ordering::Relaxed);
}

fn teardown_inner(inner: &PoolInner) {
    assert_eq!(
        inner.leases.load(Ordering::Acquire),
        0,
        "pool cleared or destroyed with outstanding container leases"
    );

    // Take everything out under the lock, run callbacks outside it so they
    // may allocate from this pool.
    let (pre, children) = {
        let mut state = lock(&inner.state);
        (
            std::mem::take(&mut state.pre_cleanups),
            std::mem::take(&mut state.children),
        )
    };
    for record in pre.into_iter().rev() {
        record.run();
    }
    for child in children.into_iter().rev() {
        child.destroy_unlinked();
    }
    let (cleanups, userdata) = {
        let mut state = lock(&inner.state);
        (
            std::mem::take(&mut state.cleanups),
            std::mem::take(&mut state.userdata),
        )
    };
    for record in cleanups.into_iter().rev() {
        record.run();
    }
    for (_, data) in userdata {
        if let Some(func) = data.cleanup {
            if let Err(status) = func(data.value) {
                tracing::error!(target: "poolcore::pool", "userdata cleanup failed: {status}");
            }
        }
    }

    // Finally release the memory itself.
    let mut state = lock(&inner.state);
    for slab in state.slabs.drain(..) {
        inner.allocator.free_slab(slab);
    }
    state.offset = 0;
    for (addr, size) in state.large_live.drain() {
        unsafe { dealloc(addr as *mut u8, large_layout(size)) };
    }
    let freed: Vec<(usize, Vec<NonNull<u8>>)> = state.large_free.drain().collect();
    for (size, list) in freed {
        for ptr in list {
            unsafe { dealloc(ptr.as_ptr(), large_layout(size)) };
        }
    }
    drop(state);
    inner.allocated.store(0, Ordering::Relaxed);
    inner.returned.store(0, Ordering::Relaxed);
}

impl Drop for PoolInner {
    fn drop(&mut self) {
        // Last handle gone without an explicit destroy: run the same
        // teardown so cleanups fire and slabs return to the allocator.
        destroy_inner(self);
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("tag", &self.inner.name)
            .field("allocated", &self.allocated_bytes())
            .field("returned", &self.return_bytes())
            .finish()
    }
}

/// RAII lease a container holds while it has memory out of a pool.
/// Clearing or destroying the pool with leases outstanding is fatal.
pub(crate) struct PoolLease {
    pool: Pool,
}

impl PoolLease {
    #[inline]
    pub(crate) fn pool(&self) -> &Pool {
        &self.pool
    }
}

impl Drop for PoolLease {
    fn drop(&mut self) {
        self.pool.inner.leases.fetch_sub(1, Ordering::AcqRel);
    }
}

#[inline]
fn large_layout(size: usize) -> Layout {
    // Uniform alignment keeps the exact-size freelist layout-compatible
    // for any allowed allocation alignment.
    Layout::from_size_align(size, BOUNDARY_SIZE).expect("large block layout")
}
