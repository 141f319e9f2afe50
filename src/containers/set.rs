//! Pool-aware ordered set.

use std::borrow::Borrow;
use std::marker::PhantomData;
use std::ptr::NonNull;

use crate::context;
use crate::pool::Pool;
use crate::storage::rbtree::{successor, InsertResult, RbNode, RbTree};

/// An ordered set whose nodes live in a pool.
///
/// Shares the red-black engine with [`OrderedMap`](crate::OrderedMap);
/// see it for the memory model.
///
/// # Examples
///
/// ```rust
/// use poolcore::{OrderedSet, Pool, PoolFlags};
///
/// let pool = Pool::create(PoolFlags::CUSTOM);
/// {
///     let mut set = OrderedSet::new(&pool);
///     set.insert(3);
///     set.insert(1);
///     assert!(set.contains(&1));
///     assert!(!set.insert(3));
/// }
/// pool.destroy();
/// ```
pub struct OrderedSet<K> {
    tree: RbTree<K, ()>,
}

impl<K: Ord> OrderedSet<K> {
    /// Creates an empty set allocating from `pool`.
    pub fn new(pool: &Pool) -> Self {
        OrderedSet {
            tree: RbTree::new(pool),
        }
    }

    /// Creates an empty set allocating from the thread's active pool.
    ///
    /// # Panics
    ///
    /// Panics when no pool context is active.
    pub fn new_in_context() -> Self {
        let pool = context::acquire().expect("no active pool context");
        Self::new(&pool)
    }

    /// Number of elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// True when the set holds no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tree.len() == 0
    }

    /// Inserts a value; returns false when it was already present.
    pub fn insert(&mut self, value: K) -> bool {
        matches!(
            self.tree.insert_unique(value, ()),
            InsertResult::Inserted(_)
        )
    }

    /// True when the value is present.
    pub fn contains<Q>(&self, value: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        !self.tree.find(value).is_null()
    }

    /// Number of entries equal to `value` (0 or 1).
    pub fn count<Q>(&self, value: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        usize::from(self.contains(value))
    }

    /// Removes a value; returns whether it was present.
    pub fn remove<Q>(&mut self, value: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        match NonNull::new(self.tree.find(value)) {
            Some(node) => {
                self.tree.erase_node(node);
                true
            }
            None => false,
        }
    }

    /// Removes and returns the stored value.
    pub fn take<Q>(&mut self, value: &Q) -> Option<K>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let node = NonNull::new(self.tree.find(value))?;
        Some(self.tree.erase_node(node).0)
    }

    /// Smallest element.
    pub fn first(&self) -> Option<&K> {
        let node = self.tree.first();
        if node.is_null() {
            None
        } else {
            Some(unsafe { (*node).key() })
        }
    }

    /// Largest element.
    pub fn last(&self) -> Option<&K> {
        let node = self.tree.last();
        if node.is_null() {
            None
        } else {
            Some(unsafe { (*node).key() })
        }
    }

    /// In-order iterator.
    pub fn iter(&self) -> Iter<'_, K> {
        Iter {
            node: self.tree.first(),
            _marker: PhantomData,
        }
    }

    /// Preallocates one contiguous batch of `additional` nodes.
    pub fn reserve(&mut self, additional: usize) {
        self.tree.reserve(additional);
    }

    /// Releases idle node batches back to the pool.
    pub fn shrink_to_fit(&mut self) {
        self.tree.shrink_to_fit();
    }

    /// Keeps freed nodes forever.
    pub fn set_memory_persistent(&mut self, persistent: bool) {
        self.tree.set_memory_persistent(persistent);
    }

    /// Drops all elements; preallocated nodes stay available.
    pub fn clear(&mut self) {
        self.tree.clear();
    }

    /// Asserts the tree invariants. Test support.
    #[doc(hidden)]
    pub fn validate(&self) {
        self.tree.validate();
    }
}

/// In-order iterator over set elements.
pub struct Iter<'a, K> {
    node: *mut RbNode<K, ()>,
    _marker: PhantomData<&'a K>,
}

impl<'a, K: Ord> Iterator for Iter<'a, K> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        if self.node.is_null() {
            return None;
        }
        unsafe {
            let item = (*self.node).key();
            self.node = successor(self.node);
            Some(item)
        }
    }
}

impl<'a, K: Ord> IntoIterator for &'a OrderedSet<K> {
    type Item = &'a K;
    type IntoIter = Iter<'a, K>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<K: Ord + std::fmt::Debug> std::fmt::Debug for OrderedSet<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

unsafe impl<K: Send> Send for OrderedSet<K> {}
