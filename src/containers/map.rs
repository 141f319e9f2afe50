//! Pool-aware ordered map.

use std::borrow::Borrow;
use std::marker::PhantomData;
use std::ptr::NonNull;

use crate::context;
use crate::pool::Pool;
use crate::storage::rbtree::{successor, InsertResult, RbNode, RbTree};

/// An ordered map whose nodes live in a pool.
///
/// Built on the red-black tree engine: nodes come from pool-backed batches,
/// erased nodes recycle through a private freelist, and
/// [`reserve`](OrderedMap::reserve) preallocates one contiguous batch.
/// Lookup accepts any borrowed form of the key
/// (`OrderedMap<String, _>::get(&str)`).
///
/// The map is single-threaded like any structure borrowing from an
/// unshared pool; move it between threads freely, but do not share it.
///
/// # Examples
///
/// ```rust
/// use poolcore::{OrderedMap, Pool, PoolFlags};
///
/// let pool = Pool::create(PoolFlags::CUSTOM);
/// {
///     let mut map = OrderedMap::new(&pool);
///     map.insert(3, "three");
///     map.insert(1, "one");
///     map.insert(2, "two");
///
///     let keys: Vec<i32> = map.iter().map(|(k, _)| *k).collect();
///     assert_eq!(keys, vec![1, 2, 3]);
/// }
/// pool.destroy();
/// ```
pub struct OrderedMap<K, V> {
    tree: RbTree<K, V>,
}

impl<K: Ord, V> OrderedMap<K, V> {
    /// Creates an empty map allocating from `pool`.
    pub fn new(pool: &Pool) -> Self {
        OrderedMap {
            tree: RbTree::new(pool),
        }
    }

    /// Creates an empty map allocating from the thread's active pool.
    ///
    /// # Panics
    ///
    /// Panics when no pool context is active.
    pub fn new_in_context() -> Self {
        let pool = context::acquire().expect("no active pool context");
        Self::new(&pool)
    }

    /// Number of entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// True when the map holds no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tree.len() == 0
    }

    /// The pool this map allocates from.
    pub fn pool(&self) -> Pool {
        self.tree.pool().clone()
    }

    /// Inserts a key-value pair, returning the previous value for the key.
    ///
    /// Equivalent to [`insert_or_assign`](OrderedMap::insert_or_assign).
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.insert_or_assign(key, value)
    }

    /// Inserts a new entry, or assigns `value` to an existing one.
    ///
    /// When the key is already present the *stored* key is kept and only
    /// the value is replaced; the previous value is returned.
    pub fn insert_or_assign(&mut self, key: K, value: V) -> Option<V> {
        match self.tree.insert_unique(key, value) {
            InsertResult::Inserted(_) => None,
            InsertResult::Exists(node, _key, value) => {
                let old = std::mem::replace(
                    unsafe { (*node.as_ptr()).val_mut() },
                    value,
                );
                Some(old)
            }
        }
    }

    /// Inserts only when the key is absent; hands the pair back otherwise.
    pub fn try_insert(&mut self, key: K, value: V) -> Result<(), (K, V)> {
        match self.tree.insert_unique(key, value) {
            InsertResult::Inserted(_) => Ok(()),
            InsertResult::Exists(_, key, value) => Err((key, value)),
        }
    }

    /// Looks up a value by any borrowed form of the key.
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let node = self.tree.find(key);
        if node.is_null() {
            None
        } else {
            Some(unsafe { (*node).val() })
        }
    }

    /// Mutable lookup.
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let node = self.tree.find(key);
        if node.is_null() {
            None
        } else {
            Some(unsafe { (*node).val_mut() })
        }
    }

    /// True when the key is present.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        !self.tree.find(key).is_null()
    }

    /// Number of entries with this key (0 or 1; keys are unique).
    pub fn count<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        usize::from(self.contains_key(key))
    }

    /// Removes an entry, returning its value.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let node = NonNull::new(self.tree.find(key))?;
        Some(self.tree.erase_node(node).1)
    }

    /// Removes an entry, returning the stored pair.
    pub fn remove_entry<Q>(&mut self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let node = NonNull::new(self.tree.find(key))?;
        Some(self.tree.erase_node(node))
    }

    /// First (smallest-key) entry.
    pub fn first_key_value(&self) -> Option<(&K, &V)> {
        let node = self.tree.first();
        if node.is_null() {
            None
        } else {
            Some(unsafe { ((*node).key(), (*node).val()) })
        }
    }

    /// Last (largest-key) entry.
    pub fn last_key_value(&self) -> Option<(&K, &V)> {
        let node = self.tree.last();
        if node.is_null() {
            None
        } else {
            Some(unsafe { ((*node).key(), (*node).val()) })
        }
    }

    /// In-order iterator over all entries.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            node: self.tree.first(),
            end: std::ptr::null_mut(),
            _marker: PhantomData,
        }
    }

    /// Iterates from the first entry whose key is not less than `key`.
    pub fn lower_bound<Q>(&self, key: &Q) -> Iter<'_, K, V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        Iter {
            node: self.tree.lower_bound(key),
            end: std::ptr::null_mut(),
            _marker: PhantomData,
        }
    }

    /// Iterates from the first entry whose key is greater than `key`.
    pub fn upper_bound<Q>(&self, key: &Q) -> Iter<'_, K, V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        Iter {
            node: self.tree.upper_bound(key),
            end: std::ptr::null_mut(),
            _marker: PhantomData,
        }
    }

    /// Iterates over the entries matching `key` (at most one).
    pub fn equal_range<Q>(&self, key: &Q) -> Iter<'_, K, V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        Iter {
            node: self.tree.lower_bound(key),
            end: self.tree.upper_bound(key),
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

    /// Keeps freed nodes forever, for pools reused across many
    /// generations of same-shaped data.
    pub fn set_memory_persistent(&mut self, persistent: bool) {
        self.tree.set_memory_persistent(persistent);
    }

    /// Idle preallocated nodes (diagnostic).
    pub fn free_capacity(&self) -> usize {
        self.tree.free_capacity()
    }

    /// Drops all entries; preallocated nodes stay available.
    pub fn clear(&mut self) {
        self.tree.clear();
    }

    /// Asserts the tree invariants. Test support.
    #[doc(hidden)]
    pub fn validate(&self) {
        self.tree.validate();
    }
}

/// In-order iterator over map entries.
pub struct Iter<'a, K, V> {
    node: *mut RbNode<K, V>,
    end: *mut RbNode<K, V>,
    _marker: PhantomData<&'a (K, V)>,
}

impl<'a, K: Ord, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.node.is_null() || self.node == self.end {
            return None;
        }
        unsafe {
            let item = ((*self.node).key(), (*self.node).val());
            self.node = successor(self.node);
            Some(item)
        }
    }
}

impl<'a, K: Ord, V> IntoIterator for &'a OrderedMap<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<K: Ord + std::fmt::Debug, V: std::fmt::Debug> std::fmt::Debug for OrderedMap<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

// The map owns its nodes; moving it to another thread moves them with it.
unsafe impl<K: Send, V: Send> Send for OrderedMap<K, V> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::PoolFlags;

    #[test]
    fn insert_iterate_erase() {
        let pool = Pool::create(PoolFlags::CUSTOM);
        {
            let mut map = OrderedMap::new(&pool);
            for key in [5, 3, 8, 1, 4, 7, 9] {
                map.insert(key, key * 100);
                map.validate();
            }

            assert_eq!(map.remove(&5), Some(500));
            map.validate();

            let keys: Vec<i32> = map.iter().map(|(k, _)| *k).collect();
            assert_eq!(keys, vec![1, 3, 4, 7, 8, 9]);
        }
        pool.destroy();
    }

    #[test]
    fn insert_replaces_and_returns_old() {
        let pool = Pool::create(PoolFlags::CUSTOM);
        {
            let mut map = OrderedMap::new(&pool);
            assert_eq!(map.insert(1, "a"), None);
            assert_eq!(map.insert(1, "b"), Some("a"));
            assert_eq!(map.get(&1), Some(&"b"));
            assert_eq!(map.len(), 1);
        }
        pool.destroy();
    }

    #[test]
    fn insert_or_assign_keeps_stored_key() {
        let pool = Pool::create(PoolFlags::CUSTOM);
        {
            let mut map: OrderedMap<String, i32> = OrderedMap::new(&pool);
            assert_eq!(map.insert_or_assign("key".to_owned(), 1), None);
            assert_eq!(map.insert_or_assign("key".to_owned(), 2), Some(1));
            assert_eq!(map.get("key"), Some(&2));
            assert_eq!(map.len(), 1);
            map.validate();
        }
        pool.destroy();
    }

    #[test]
    fn try_insert_rejects_duplicates() {
        let pool = Pool::create(PoolFlags::CUSTOM);
        {
            let mut map = OrderedMap::new(&pool);
            assert!(map.try_insert(1, "a").is_ok());
            assert_eq!(map.try_insert(1, "b"), Err((1, "b")));
            assert_eq!(map.get(&1), Some(&"a"));
        }
        pool.destroy();
    }

    #[test]
    fn heterogeneous_lookup() {
        let pool = Pool::create(PoolFlags::CUSTOM);
        {
            let mut map = OrderedMap::new(&pool);
            map.insert("alpha".to_owned(), 1);
            map.insert("beta".to_owned(), 2);

            assert_eq!(map.get("beta"), Some(&2));
            assert!(map.contains_key("alpha"));
            assert_eq!(map.count("gamma"), 0);
            assert_eq!(map.remove("alpha"), Some(1));
        }
        pool.destroy();
    }

    #[test]
    fn bounds_and_ranges() {
        let pool = Pool::create(PoolFlags::CUSTOM);
        {
            let mut map = OrderedMap::new(&pool);
            for key in [10, 20, 30] {
                map.insert(key, ());
            }

            let from_15: Vec<i32> = map.lower_bound(&15).map(|(k, _)| *k).collect();
            assert_eq!(from_15, vec![20, 30]);

            let after_20: Vec<i32> = map.upper_bound(&20).map(|(k, _)| *k).collect();
            assert_eq!(after_20, vec![30]);

            assert_eq!(map.equal_range(&20).count(), 1);
            assert_eq!(map.equal_range(&25).count(), 0);
        }
        pool.destroy();
    }

    #[test]
    fn reserve_and_shrink() {
        let pool = Pool::create(PoolFlags::CUSTOM);
        {
            let mut map = OrderedMap::new(&pool);
            map.reserve(8);
            assert_eq!(map.free_capacity(), 8);

            for key in 0..8 {
                map.insert(key, key);
            }
            assert_eq!(map.free_capacity(), 0);

            map.clear();
            assert_eq!(map.free_capacity(), 8);
            map.shrink_to_fit();
            assert_eq!(map.free_capacity(), 0);
        }
        pool.destroy();
    }

    #[test]
    fn persistent_memory_keeps_nodes() {
        let pool = Pool::create(PoolFlags::CUSTOM);
        {
            let mut map: OrderedMap<i32, i32> = OrderedMap::new(&pool);
            map.set_memory_persistent(true);
            map.reserve(4);
            map.clear();
            map.shrink_to_fit();
            assert_eq!(map.free_capacity(), 4);
        }
        pool.destroy();
    }

    #[test]
    fn new_in_context_uses_active_pool() {
        let pool = Pool::create(PoolFlags::CUSTOM);
        crate::context::perform(&pool, |p| {
            let mut map: OrderedMap<i32, i32> = OrderedMap::new_in_context();
            map.insert(1, 1);
            assert!(map.pool().same(p));
        });
        pool.destroy();
    }
}
