//! Real-time priority work queue over pool-allocated node storage.
//!
//! Designed for a relatively low number of pending items (around the
//! preallocated node count) with few distinct priorities. Nodes live in a
//! fixed inline array plus 64-node storage blocks allocated from the pool,
//! so the common enqueue path never calls the allocator under the queue
//! lock.
//!
//! Locking is pluggable: the queue list and the free list each carry an
//! independent `(lock_fn, unlock_fn, payload)` interface whose defaults
//! are no-ops. Single-threaded users pay nothing; concurrent users install
//! real locks with [`set_locking`](PriorityQueue::set_locking) before
//! sharing the queue.

use std::cell::UnsafeCell;
use std::mem::{align_of, size_of, MaybeUninit};
use std::ptr::NonNull;

use crate::context;
use crate::pool::{Pool, PoolLease};

/// Nodes stored inline in the queue itself.
pub const PREALLOCATED_NODES: usize = 8;

/// Nodes per dynamically-allocated storage block.
pub const STORAGE_NODES: usize = 64;

/// Lock hook: called with the opaque payload configured alongside it.
pub type LockFn = unsafe fn(*mut ());

unsafe fn lock_noop(_: *mut ()) {}

#[derive(Clone, Copy)]
struct LockIface {
    data: *mut (),
    lock: LockFn,
    unlock: LockFn,
}

impl LockIface {
    const NOOP: LockIface = LockIface {
        data: std::ptr::null_mut(),
        lock: lock_noop,
        unlock: lock_noop,
    };

    #[inline]
    unsafe fn lock(&self) {
        (self.lock)(self.data);
    }

    #[inline]
    unsafe fn unlock(&self) {
        (self.unlock)(self.data);
    }
}

impl PartialEq for LockIface {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
            && std::ptr::eq(self.lock as *const (), other.lock as *const ())
            && std::ptr::eq(self.unlock as *const (), other.unlock as *const ())
    }
}

/// Node layout: nodes are placed sequentially in blocks, so the value
/// storage leads to give it the block's alignment.
struct Node<T> {
    value: MaybeUninit<T>,
    next: *mut Node<T>,
    block: *mut StorageBlock<T>,
    priority: i32,
}

struct StorageBlock<T> {
    nodes: [Node<T>; STORAGE_NODES],
    /// Nodes of this block currently handed out.
    used: u32,
    /// Pool block size for exact-size recycling.
    bytes: usize,
}

struct NodeList<T> {
    first: *mut Node<T>,
    last: *mut Node<T>,
}

impl<T> NodeList<T> {
    const EMPTY: NodeList<T> = NodeList {
        first: std::ptr::null_mut(),
        last: std::ptr::null_mut(),
    };
}

/// Multi-producer / single-consumer priority queue.
///
/// Items pop in non-decreasing priority order; for equal priorities the
/// producer-supplied tie bit decides whether an item goes before or after
/// its existing peers.
///
/// # Examples
///
/// ```rust
/// use poolcore::{Pool, PoolFlags, PriorityQueue};
///
/// let pool = Pool::create(PoolFlags::CUSTOM);
/// {
///     let queue: PriorityQueue<&str> = PriorityQueue::new(&pool);
///     queue.push(10, false, "a");
///     queue.push(5, false, "b");
///     queue.push(10, true, "c");
///
///     let mut order = Vec::new();
///     while queue.pop_prefix(|_, value| order.push(value)) {}
///     assert_eq!(order, vec!["b", "c", "a"]);
/// }
/// pool.destroy();
/// ```
pub struct PriorityQueue<T> {
    lease: PoolLease,
    prealloc: UnsafeCell<MaybeUninit<[Node<T>; PREALLOCATED_NODES]>>,
    queue: UnsafeCell<NodeList<T>>,
    free: UnsafeCell<NodeList<T>>,
    queue_lock: UnsafeCell<LockIface>,
    free_lock: UnsafeCell<LockIface>,
    capacity: UnsafeCell<usize>,
}

// All interior mutation happens under the configured lock interfaces; with
// the default no-op locks the queue must be driven from one thread at a
// time, exactly as documented.
unsafe impl<T: Send> Send for PriorityQueue<T> {}
unsafe impl<T: Send> Sync for PriorityQueue<T> {}

impl<T> PriorityQueue<T> {
    /// Creates a queue whose storage blocks come from `pool`.
    pub fn new(pool: &Pool) -> Self {
        let queue = PriorityQueue {
            lease: pool.acquire_lease(),
            prealloc: UnsafeCell::new(MaybeUninit::uninit()),
            queue: UnsafeCell::new(NodeList::EMPTY),
            free: UnsafeCell::new(NodeList::EMPTY),
            queue_lock: UnsafeCell::new(LockIface::NOOP),
            free_lock: UnsafeCell::new(LockIface::NOOP),
            capacity: UnsafeCell::new(PREALLOCATED_NODES),
        };
        unsafe {
            let nodes = queue.prealloc.get() as *mut Node<T>;
            Self::init_nodes(nodes, PREALLOCATED_NODES, std::ptr::null_mut());
            let free = &mut *queue.free.get();
            free.first = nodes;
            free.last = nodes.add(PREALLOCATED_NODES - 1);
        }
        queue
    }

    /// Creates a queue over the thread's active pool.
    ///
    /// # Panics
    ///
    /// Panics when no pool context is active.
    pub fn new_in_context() -> Self {
        let pool = context::acquire().expect("no active pool context");
        Self::new(&pool)
    }

    /// Links a contiguous node range into a singly-linked chain.
    unsafe fn init_nodes(first: *mut Node<T>, count: usize, block: *mut StorageBlock<T>) {
        for i in 0..count {
            let node = first.add(i);
            (*node).next = if i + 1 < count {
                first.add(i + 1)
            } else {
                std::ptr::null_mut()
            };
            (*node).block = block;
            (*node).priority = 0;
        }
    }

    // ----- locking ----------------------------------------------------

    /// Installs the queue-list lock interface.
    ///
    /// # Safety
    ///
    /// `lock`/`unlock` must form a valid lock protocol over `data`, and
    /// `data` must stay valid for the queue's lifetime. Must not be called
    /// concurrently with queue operations.
    pub unsafe fn set_queue_locking(&self, lock: LockFn, unlock: LockFn, data: *mut ()) {
        *self.queue_lock.get() = LockIface { data, lock, unlock };
    }

    /// Installs the free-list lock interface.
    ///
    /// # Safety
    ///
    /// As [`set_queue_locking`](PriorityQueue::set_queue_locking).
    pub unsafe fn set_free_locking(&self, lock: LockFn, unlock: LockFn, data: *mut ()) {
        *self.free_lock.get() = LockIface { data, lock, unlock };
    }

    /// Installs one lock interface for both lists.
    ///
    /// # Safety
    ///
    /// As [`set_queue_locking`](PriorityQueue::set_queue_locking).
    pub unsafe fn set_locking(&self, lock: LockFn, unlock: LockFn, data: *mut ()) {
        self.set_queue_locking(lock, unlock, data);
        self.set_free_locking(lock, unlock, data);
    }

    /// Installs `parking_lot` raw mutexes on both lists.
    #[cfg(feature = "parking_lot")]
    pub fn set_locking_raw_mutex(
        &self,
        queue: &'static parking_lot::RawMutex,
        free: &'static parking_lot::RawMutex,
    ) {
        unsafe fn raw_lock(data: *mut ()) {
            use parking_lot::lock_api::RawMutex as _;
            (*(data as *const parking_lot::RawMutex)).lock();
        }
        unsafe fn raw_unlock(data: *mut ()) {
            use parking_lot::lock_api::RawMutex as _;
            (*(data as *const parking_lot::RawMutex)).unlock();
        }
        unsafe {
            self.set_queue_locking(
                raw_lock,
                raw_unlock,
                queue as *const parking_lot::RawMutex as *mut (),
            );
            self.set_free_locking(
                raw_lock,
                raw_unlock,
                free as *const parking_lot::RawMutex as *mut (),
            );
        }
    }

    // ----- producers ---------------------------------------------------

    /// Enqueues a value. Lower priorities pop first; `first_if_tie` puts
    /// the item before existing equal-priority peers.
    pub fn push(&self, priority: i32, first_if_tie: bool, value: T) {
        unsafe {
            let node = self.allocate_node();
            (*node).priority = priority;
            (*node).value = MaybeUninit::new(value);
            self.push_node(node, first_if_tie);
        }
    }

    // ----- consumers ---------------------------------------------------

    /// Pops the head item: the value is moved out of the node and the node
    /// is freed *before* the callback runs, so long callbacks do not hold
    /// node capacity.
    pub fn pop_prefix(&self, cb: impl FnOnce(i32, T)) -> bool {
        unsafe {
            let node = self.pop_node();
            if node.is_null() {
                return false;
            }
            let priority = (*node).priority;
            let value = (*node).value.assume_init_read();
            self.free_node(node);
            cb(priority, value);
            true
        }
    }

    /// Pops the head item, running the callback on the value in place; the
    /// node stays detached (invisible to other consumers) for the
    /// callback's duration. Cheaper for expensive moves, dearer for long
    /// callbacks.
    pub fn pop_direct(&self, cb: impl FnOnce(i32, &mut T)) -> bool {
        unsafe {
            let node = self.pop_node();
            if node.is_null() {
                return false;
            }
            cb((*node).priority, (*node).value.assume_init_mut());
            (*node).value.assume_init_drop();
            self.free_node(node);
            true
        }
    }

    /// Visits every queued item in order without dequeuing.
    pub fn foreach(&self, mut cb: impl FnMut(i32, &T)) {
        unsafe {
            let lock = *self.queue_lock.get();
            lock.lock();
            let mut node = (*self.queue.get()).first;
            while !node.is_null() {
                cb((*node).priority, (*node).value.assume_init_ref());
                node = (*node).next;
            }
            lock.unlock();
        }
    }

    /// True when no items are queued.
    pub fn empty(&self) -> bool {
        unsafe {
            let lock = *self.queue_lock.get();
            lock.lock();
            let empty = (*self.queue.get()).first.is_null();
            lock.unlock();
            empty
        }
    }

    /// Total node capacity (inline plus live blocks).
    pub fn capacity(&self) -> usize {
        unsafe { *self.capacity.get() }
    }

    /// Number of currently idle preallocated nodes (diagnostic).
    pub fn free_capacity(&self) -> usize {
        unsafe {
            let lock = *self.free_lock.get();
            lock.lock();
            let mut count = 0;
            let mut node = (*self.free.get()).first;
            while !node.is_null() {
                count += 1;
                node = (*node).next;
            }
            lock.unlock();
            count
        }
    }

    /// Drains the queue, destroying values.
    ///
    /// Callers must quiesce producers and consumers first: the lock
    /// interfaces are swapped out for no-ops while the queue drains.
    pub fn clear(&self) {
        unsafe {
            let tmp_free = *self.free_lock.get();
            let tmp_queue = *self.queue_lock.get();
            *self.free_lock.get() = LockIface::NOOP;
            *self.queue_lock.get() = LockIface::NOOP;

            if tmp_free != tmp_queue {
                tmp_free.lock();
            }
            tmp_queue.lock();

            loop {
                let node = self.pop_node();
                if node.is_null() {
                    break;
                }
                (*node).value.assume_init_drop();
                self.free_node(node);
            }

            if tmp_free != tmp_queue {
                tmp_free.unlock();
            }
            tmp_queue.unlock();

            *self.free_lock.get() = tmp_free;
            *self.queue_lock.get() = tmp_queue;
        }
    }

    // ----- node lifecycle ----------------------------------------------
    //
    // (producer)  allocate -> fill -> push
    // (consumer)  pop -> dispose -> free

    unsafe fn allocate_node(&self) -> *mut Node<T> {
        let lock = *self.free_lock.get();
        lock.lock();
        let free = &mut *self.free.get();
        let node = if !free.first.is_null() {
            let node = free.first;
            if free.first == free.last {
                free.first = std::ptr::null_mut();
                free.last = std::ptr::null_mut();
            } else {
                free.first = (*node).next;
            }
            node
        } else {
            let block = self.allocate_block();
            let nodes = (*block).nodes.as_mut_ptr();
            // Thread nodes [1..] onto the free list, hand out node 0.
            if free.last.is_null() {
                free.first = nodes.add(1);
            } else {
                (*free.last).next = nodes.add(1);
            }
            free.last = nodes.add(STORAGE_NODES - 1);
            nodes
        };
        (*node).next = std::ptr::null_mut();
        if !(*node).block.is_null() {
            (*(*node).block).used += 1;
        }
        lock.unlock();
        node
    }

    unsafe fn allocate_block(&self) -> *mut StorageBlock<T> {
        let mut bytes = size_of::<StorageBlock<T>>();
        let ptr = self
            .lease
            .pool()
            .alloc_aligned(&mut bytes, align_of::<StorageBlock<T>>().max(8))
            .expect("storage block alignment")
            .as_ptr() as *mut StorageBlock<T>;
        Self::init_nodes((*ptr).nodes.as_mut_ptr(), STORAGE_NODES, ptr);
        (*ptr).used = 0;
        (*ptr).bytes = bytes;
        *self.capacity.get() += STORAGE_NODES;
        ptr
    }

    unsafe fn pop_node(&self) -> *mut Node<T> {
        let lock = *self.queue_lock.get();
        lock.lock();
        let queue = &mut *self.queue.get();
        let node = queue.first;
        if !node.is_null() {
            if queue.first == queue.last {
                queue.first = std::ptr::null_mut();
                queue.last = std::ptr::null_mut();
            } else {
                queue.first = (*node).next;
            }
            (*node).next = std::ptr::null_mut();
        }
        lock.unlock();
        node
    }

    unsafe fn push_node(&self, node: *mut Node<T>, insert_first: bool) {
        let lock = *self.queue_lock.get();
        lock.lock();
        let queue = &mut *self.queue.get();
        (*node).next = std::ptr::null_mut();
        if queue.first.is_null() {
            queue.first = node;
            queue.last = node;
        } else if insert_first {
            if (*node).priority <= (*queue.first).priority {
                (*node).next = queue.first;
                queue.first = node;
            } else if (*queue.last).priority < (*node).priority {
                (*queue.last).next = node;
                queue.last = node;
            } else {
                let mut n = queue.first;
                while !(*n).next.is_null() && (*(*n).next).priority < (*node).priority {
                    n = (*n).next;
                }
                (*node).next = (*n).next;
                (*n).next = node;
            }
        } else if (*node).priority < (*queue.first).priority {
            (*node).next = queue.first;
            queue.first = node;
        } else if (*queue.last).priority <= (*node).priority {
            (*queue.last).next = node;
            queue.last = node;
        } else {
            let mut n = queue.first;
            while !(*n).next.is_null() && (*(*n).next).priority <= (*node).priority {
                n = (*n).next;
            }
            (*node).next = (*n).next;
            (*n).next = node;
        }
        lock.unlock();
    }

    unsafe fn free_node(&self, node: *mut Node<T>) {
        let lock = *self.free_lock.get();
        lock.lock();
        let free = &mut *self.free.get();
        let block = (*node).block;
        if !block.is_null() {
            (*block).used -= 1;
            if (*block).used == 0 {
                // Unlink every node of this block from the free list, then
                // return the whole block to the pool.
                let mut prev: *mut Node<T> = std::ptr::null_mut();
                let mut cursor = free.first;
                while !cursor.is_null() {
                    let next = (*cursor).next;
                    if (*cursor).block == block {
                        if prev.is_null() {
                            free.first = next;
                        } else {
                            (*prev).next = next;
                        }
                    } else {
                        prev = cursor;
                    }
                    cursor = next;
                }
                free.last = prev;
                *self.capacity.get() -= STORAGE_NODES;
                let bytes = (*block).bytes;
                lock.unlock();
                self.lease
                    .pool()
                    .free(NonNull::new_unchecked(block as *mut u8), bytes);
                return;
            }
            // Block nodes go to the tail so inline nodes are reused first
            // and idle blocks drain out.
            (*node).next = std::ptr::null_mut();
            if free.last.is_null() {
                free.first = node;
                free.last = node;
            } else {
                (*free.last).next = node;
                free.last = node;
            }
        } else {
            // Inline nodes go to the front.
            (*node).next = free.first;
            free.first = node;
            if free.last.is_null() {
                free.last = node;
            }
        }
        lock.unlock();
    }
}

impl<T> Drop for PriorityQueue<T> {
    fn drop(&mut self) {
        unsafe {
            *self.queue_lock.get() = LockIface::NOOP;
            *self.free_lock.get() = LockIface::NOOP;
            loop {
                let node = self.pop_node();
                if node.is_null() {
                    break;
                }
                (*node).value.assume_init_drop();
                self.free_node(node);
            }
        }
    }
}
