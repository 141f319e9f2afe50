//! Red-black tree engine backing the ordered map and set.
//!
//! Textbook CLRS rebalancing over arena-allocated nodes with parent links.
//! The engine tracks the root, leftmost, and rightmost nodes so begin/end
//! iteration and hinted appends at either end stay O(1). Nodes come from a
//! [`NodeArena`]: freed nodes thread onto the arena freelist (through the
//! parent field) and `reserve` preallocates a contiguous batch.

use std::borrow::Borrow;
use std::mem::MaybeUninit;
use std::ptr::NonNull;

use super::arena::{ArenaNode, NodeArena};
use crate::pool::Pool;

pub(crate) struct RbNode<K, V> {
    batch: u32,
    red: bool,
    parent: *mut RbNode<K, V>,
    left: *mut RbNode<K, V>,
    right: *mut RbNode<K, V>,
    value: MaybeUninit<(K, V)>,
}

impl<K, V> ArenaNode for RbNode<K, V> {
    fn set_batch(&mut self, batch: u32) {
        self.batch = batch;
    }
    fn batch(&self) -> u32 {
        self.batch
    }
    // Freed nodes are threaded through the parent field.
    fn set_free_next(&mut self, next: *mut Self) {
        self.parent = next;
    }
    fn free_next(&self) -> *mut Self {
        self.parent
    }
}

impl<K, V> RbNode<K, V> {
    #[inline]
    pub(crate) fn key(&self) -> &K {
        unsafe { &self.value.assume_init_ref().0 }
    }

    #[inline]
    pub(crate) fn val(&self) -> &V {
        unsafe { &self.value.assume_init_ref().1 }
    }

    #[inline]
    pub(crate) fn val_mut(&mut self) -> &mut V {
        unsafe { &mut self.value.assume_init_mut().1 }
    }
}

type Ptr<K, V> = *mut RbNode<K, V>;

#[inline]
unsafe fn is_red<K, V>(node: Ptr<K, V>) -> bool {
    !node.is_null() && (*node).red
}

#[inline]
unsafe fn min_node<K, V>(mut node: Ptr<K, V>) -> Ptr<K, V> {
    while !(*node).left.is_null() {
        node = (*node).left;
    }
    node
}

#[inline]
unsafe fn max_node<K, V>(mut node: Ptr<K, V>) -> Ptr<K, V> {
    while !(*node).right.is_null() {
        node = (*node).right;
    }
    node
}

pub(crate) unsafe fn successor<K, V>(node: Ptr<K, V>) -> Ptr<K, V> {
    if !(*node).right.is_null() {
        return min_node((*node).right);
    }
    let mut n = node;
    let mut p = (*n).parent;
    while !p.is_null() && n == (*p).right {
        n = p;
        p = (*p).parent;
    }
    p
}

pub(crate) unsafe fn predecessor<K, V>(node: Ptr<K, V>) -> Ptr<K, V> {
    if !(*node).left.is_null() {
        return max_node((*node).left);
    }
    let mut n = node;
    let mut p = (*n).parent;
    while !p.is_null() && n == (*p).left {
        n = p;
        p = (*p).parent;
    }
    p
}

pub(crate) enum InsertResult<K, V> {
    Inserted(NonNull<RbNode<K, V>>),
    /// Key already present: the existing node plus the rejected pair.
    Exists(NonNull<RbNode<K, V>>, K, V),
}

pub(crate) struct RbTree<K, V> {
    arena: NodeArena<RbNode<K, V>>,
    root: Ptr<K, V>,
    leftmost: Ptr<K, V>,
    rightmost: Ptr<K, V>,
    len: usize,
}

impl<K, V> RbTree<K, V> {
    pub(crate) fn new(pool: &Pool) -> Self {
        RbTree {
            arena: NodeArena::new(pool),
            root: std::ptr::null_mut(),
            leftmost: std::ptr::null_mut(),
            rightmost: std::ptr::null_mut(),
            len: 0,
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub(crate) fn pool(&self) -> &Pool {
        self.arena.pool()
    }

    #[inline]
    pub(crate) fn first(&self) -> Ptr<K, V> {
        self.leftmost
    }

    #[inline]
    pub(crate) fn last(&self) -> Ptr<K, V> {
        self.rightmost
    }

    pub(crate) fn reserve(&mut self, additional: usize) {
        self.arena.reserve(additional);
    }

    pub(crate) fn shrink_to_fit(&mut self) {
        self.arena.shrink_to_fit();
    }

    pub(crate) fn set_memory_persistent(&mut self, persistent: bool) {
        self.arena.set_persistent(persistent);
    }

    pub(crate) fn free_capacity(&self) -> usize {
        self.arena.free_capacity()
    }

    /// Drops every entry and returns all nodes to the arena.
    pub(crate) fn clear(&mut self) {
        unsafe {
            let mut node = self.root;
            while !node.is_null() {
                if !(*node).left.is_null() {
                    node = (*node).left;
                } else if !(*node).right.is_null() {
                    node = (*node).right;
                } else {
                    let parent = (*node).parent;
                    if !parent.is_null() {
                        if (*parent).left == node {
                            (*parent).left = std::ptr::null_mut();
                        } else {
                            (*parent).right = std::ptr::null_mut();
                        }
                    }
                    (*node).value.assume_init_drop();
                    self.arena.free_node(NonNull::new_unchecked(node));
                    node = parent;
                }
            }
        }
        self.root = std::ptr::null_mut();
        self.leftmost = std::ptr::null_mut();
        self.rightmost = std::ptr::null_mut();
        self.len = 0;
    }
}

impl<K: Ord, V> RbTree<K, V> {
    // ----- lookup -----------------------------------------------------

    pub(crate) fn find<Q>(&self, key: &Q) -> Ptr<K, V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut node = self.root;
        unsafe {
            while !node.is_null() {
                match key.cmp((*node).key().borrow()) {
                    std::cmp::Ordering::Less => node = (*node).left,
                    std::cmp::Ordering::Greater => node = (*node).right,
                    std::cmp::Ordering::Equal => return node,
                }
            }
        }
        std::ptr::null_mut()
    }

    /// First node whose key is not less than `key` (null past the end).
    pub(crate) fn lower_bound<Q>(&self, key: &Q) -> Ptr<K, V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut node = self.root;
        let mut result: Ptr<K, V> = std::ptr::null_mut();
        unsafe {
            while !node.is_null() {
                if (*node).key().borrow() < key {
                    node = (*node).right;
                } else {
                    result = node;
                    node = (*node).left;
                }
            }
        }
        result
    }

    /// First node whose key is greater than `key` (null past the end).
    pub(crate) fn upper_bound<Q>(&self, key: &Q) -> Ptr<K, V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut node = self.root;
        let mut result: Ptr<K, V> = std::ptr::null_mut();
        unsafe {
            while !node.is_null() {
                if (*node).key().borrow() <= key {
                    node = (*node).right;
                } else {
                    result = node;
                    node = (*node).left;
                }
            }
        }
        result
    }

    // ----- insertion --------------------------------------------------

    pub(crate) fn insert_unique(&mut self, key: K, value: V) -> InsertResult<K, V> {
        let mut parent: Ptr<K, V> = std::ptr::null_mut();
        let mut link = self.root;
        let mut went_left = false;
        unsafe {
            while !link.is_null() {
                parent = link;
                match key.cmp((*link).key()) {
                    std::cmp::Ordering::Less => {
                        link = (*link).left;
                        went_left = true;
                    }
                    std::cmp::Ordering::Greater => {
                        link = (*link).right;
                        went_left = false;
                    }
                    std::cmp::Ordering::Equal => {
                        return InsertResult::Exists(NonNull::new_unchecked(link), key, value);
                    }
                }
            }
        }
        InsertResult::Inserted(self.attach(parent, went_left, key, value))
    }

    /// Hinted insertion: `hint` is the node the new entry should precede
    /// (null meaning "insert at the end"). A hint validated against the
    /// immediate predecessor gives O(1) appends; an invalid hint falls
    /// back to a plain walk.
    pub(crate) fn insert_hint(
        &mut self,
        hint: Ptr<K, V>,
        key: K,
        value: V,
    ) -> InsertResult<K, V> {
        unsafe {
            if hint.is_null() {
                // Append past the current maximum.
                if self.rightmost.is_null() {
                    return self.insert_unique(key, value);
                }
                return match key.cmp((*self.rightmost).key()) {
                    std::cmp::Ordering::Greater => {
                        InsertResult::Inserted(self.attach(self.rightmost, false, key, value))
                    }
                    std::cmp::Ordering::Equal => InsertResult::Exists(
                        NonNull::new_unchecked(self.rightmost),
                        key,
                        value,
                    ),
                    std::cmp::Ordering::Less => self.insert_unique(key, value),
                };
            }
            if key >= *(*hint).key() {
                if key == *(*hint).key() {
                    return InsertResult::Exists(NonNull::new_unchecked(hint), key, value);
                }
                return self.insert_unique(key, value);
            }
            let pred = predecessor(hint);
            if pred.is_null() {
                // Prepend before the current minimum.
                return InsertResult::Inserted(self.attach(hint, true, key, value));
            }
            match key.cmp((*pred).key()) {
                std::cmp::Ordering::Greater => {
                    // Attach between pred and hint: one of the two slots is
                    // guaranteed free.
                    if (*hint).left.is_null() {
                        InsertResult::Inserted(self.attach(hint, true, key, value))
                    } else {
                        InsertResult::Inserted(self.attach(pred, false, key, value))
                    }
                }
                std::cmp::Ordering::Equal => {
                    InsertResult::Exists(NonNull::new_unchecked(pred), key, value)
                }
                std::cmp::Ordering::Less => self.insert_unique(key, value),
            }
        }
    }

    /// Creates, links, and rebalances a new red node under `parent`.
    fn attach(
        &mut self,
        parent: Ptr<K, V>,
        as_left: bool,
        key: K,
        value: V,
    ) -> NonNull<RbNode<K, V>> {
        let node = self.arena.alloc_node();
        let z = node.as_ptr();
        unsafe {
            (*z).red = true;
            (*z).parent = parent;
            (*z).left = std::ptr::null_mut();
            (*z).right = std::ptr::null_mut();
            (*z).value = MaybeUninit::new((key, value));

            if parent.is_null() {
                self.root = z;
                self.leftmost = z;
                self.rightmost = z;
            } else if as_left {
                (*parent).left = z;
                if parent == self.leftmost {
                    self.leftmost = z;
                }
            } else {
                (*parent).right = z;
                if parent == self.rightmost {
                    self.rightmost = z;
                }
            }
            self.insert_fixup(z);
        }
        self.len += 1;
        node
    }

    unsafe fn rotate_left(&mut self, x: Ptr<K, V>) {
        let y = (*x).right;
        (*x).right = (*y).left;
        if !(*y).left.is_null() {
            (*(*y).left).parent = x;
        }
        (*y).parent = (*x).parent;
        if (*x).parent.is_null() {
            self.root = y;
        } else if x == (*(*x).parent).left {
            (*(*x).parent).left = y;
        } else {
            (*(*x).parent).right = y;
        }
        (*y).left = x;
        (*x).parent = y;
    }

    unsafe fn rotate_right(&mut self, x: Ptr<K, V>) {
        let y = (*x).left;
        (*x).left = (*y).right;
        if !(*y).right.is_null() {
            (*(*y).right).parent = x;
        }
        (*y).parent = (*x).parent;
        if (*x).parent.is_null() {
            self.root = y;
        } else if x == (*(*x).parent).right {
            (*(*x).parent).right = y;
        } else {
            (*(*x).parent).left = y;
        }
        (*y).right = x;
        (*x).parent = y;
    }

    unsafe fn insert_fixup(&mut self, mut z: Ptr<K, V>) {
        while is_red((*z).parent) {
            let parent = (*z).parent;
            let grand = (*parent).parent;
            if parent == (*grand).left {
                let uncle = (*grand).right;
                if is_red(uncle) {
                    (*parent).red = false;
                    (*uncle).red = false;
                    (*grand).red = true;
                    z = grand;
                } else {
                    if z == (*parent).right {
                        z = parent;
                        self.rotate_left(z);
                    }
                    let parent = (*z).parent;
                    let grand = (*parent).parent;
                    (*parent).red = false;
                    (*grand).red = true;
                    self.rotate_right(grand);
                }
            } else {
                let uncle = (*grand).left;
                if is_red(uncle) {
                    (*parent).red = false;
                    (*uncle).red = false;
                    (*grand).red = true;
                    z = grand;
                } else {
                    if z == (*parent).left {
                        z = parent;
                        self.rotate_right(z);
                    }
                    let parent = (*z).parent;
                    let grand = (*parent).parent;
                    (*parent).red = false;
                    (*grand).red = true;
                    self.rotate_left(grand);
                }
            }
        }
        (*self.root).red = false;
    }

    // ----- removal ----------------------------------------------------

    /// Replaces the subtree rooted at `u` with the one rooted at `v`.
    unsafe fn transplant(&mut self, u: Ptr<K, V>, v: Ptr<K, V>) {
        if (*u).parent.is_null() {
            self.root = v;
        } else if u == (*(*u).parent).left {
            (*(*u).parent).left = v;
        } else {
            (*(*u).parent).right = v;
        }
        if !v.is_null() {
            (*v).parent = (*u).parent;
        }
    }

    /// Unlinks `z`, returning its pair. The node goes back to the arena.
    pub(crate) fn erase_node(&mut self, z: NonNull<RbNode<K, V>>) -> (K, V) {
        let z = z.as_ptr();
        unsafe {
            if z == self.leftmost {
                self.leftmost = successor(z);
            }
            if z == self.rightmost {
                self.rightmost = predecessor(z);
            }

            let removed_red;
            let x: Ptr<K, V>;
            let x_parent: Ptr<K, V>;
            if (*z).left.is_null() {
                removed_red = (*z).red;
                x = (*z).right;
                x_parent = (*z).parent;
                self.transplant(z, (*z).right);
            } else if (*z).right.is_null() {
                removed_red = (*z).red;
                x = (*z).left;
                x_parent = (*z).parent;
                self.transplant(z, (*z).left);
            } else {
                let y = min_node((*z).right);
                removed_red = (*y).red;
                x = (*y).right;
                if (*y).parent == z {
                    x_parent = y;
                } else {
                    x_parent = (*y).parent;
                    self.transplant(y, (*y).right);
                    (*y).right = (*z).right;
                    (*(*y).right).parent = y;
                }
                self.transplant(z, y);
                (*y).left = (*z).left;
                (*(*y).left).parent = y;
                (*y).red = (*z).red;
            }
            if !removed_red {
                self.erase_fixup(x, x_parent);
            }

            let pair = (*z).value.assume_init_read();
            self.arena.free_node(NonNull::new_unchecked(z));
            self.len -= 1;
            pair
        }
    }

    /// CLRS delete fixup; `x` may be null, so its parent rides along.
    unsafe fn erase_fixup(&mut self, mut x: Ptr<K, V>, mut parent: Ptr<K, V>) {
        while x != self.root && !is_red(x) {
            if parent.is_null() {
                break;
            }
            if x == (*parent).left {
                let mut w = (*parent).right;
                if is_red(w) {
                    (*w).red = false;
                    (*parent).red = true;
                    self.rotate_left(parent);
                    w = (*parent).right;
                }
                if !is_red((*w).left) && !is_red((*w).right) {
                    (*w).red = true;
                    x = parent;
                    parent = (*x).parent;
                } else {
                    if !is_red((*w).right) {
                        if !(*w).left.is_null() {
                            (*(*w).left).red = false;
                        }
                        (*w).red = true;
                        self.rotate_right(w);
                        w = (*parent).right;
                    }
                    (*w).red = (*parent).red;
                    (*parent).red = false;
                    if !(*w).right.is_null() {
                        (*(*w).right).red = false;
                    }
                    self.rotate_left(parent);
                    x = self.root;
                    parent = std::ptr::null_mut();
                }
            } else {
                let mut w = (*parent).left;
                if is_red(w) {
                    (*w).red = false;
                    (*parent).red = true;
                    self.rotate_right(parent);
                    w = (*parent).left;
                }
                if !is_red((*w).left) && !is_red((*w).right) {
                    (*w).red = true;
                    x = parent;
                    parent = (*x).parent;
                } else {
                    if !is_red((*w).left) {
                        if !(*w).right.is_null() {
                            (*(*w).right).red = false;
                        }
                        (*w).red = true;
                        self.rotate_left(w);
                        w = (*parent).left;
                    }
                    (*w).red = (*parent).red;
                    (*parent).red = false;
                    if !(*w).left.is_null() {
                        (*(*w).left).red = false;
                    }
                    self.rotate_right(parent);
                    x = self.root;
                    parent = std::ptr::null_mut();
                }
            }
        }
        if !x.is_null() {
            (*x).red = false;
        }
    }

    // ----- validation -------------------------------------------------

    /// Asserts the red-black invariants and key ordering. Test support.
    pub(crate) fn validate(&self) {
        unsafe {
            assert!(!is_red(self.root), "root must be black");
            if self.root.is_null() {
                assert!(self.leftmost.is_null() && self.rightmost.is_null());
                assert_eq!(self.len, 0);
                return;
            }
            assert_eq!(self.leftmost, min_node(self.root));
            assert_eq!(self.rightmost, max_node(self.root));

            let mut count = 0usize;
            let mut node = self.leftmost;
            let mut prev: Ptr<K, V> = std::ptr::null_mut();
            while !node.is_null() {
                if !prev.is_null() {
                    assert!((*prev).key() < (*node).key(), "in-order keys must ascend");
                }
                if is_red(node) {
                    assert!(!is_red((*node).left), "red node with red left child");
                    assert!(!is_red((*node).right), "red node with red right child");
                }
                prev = node;
                node = successor(node);
                count += 1;
            }
            assert_eq!(count, self.len);

            Self::black_height(self.root);
        }
    }

    unsafe fn black_height(node: Ptr<K, V>) -> usize {
        if node.is_null() {
            return 1;
        }
        let left = Self::black_height((*node).left);
        let right = Self::black_height((*node).right);
        assert_eq!(left, right, "black heights must match on every path");
        left + usize::from(!(*node).red)
    }
}

impl<K, V> Drop for RbTree<K, V> {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::PoolFlags;

    fn keys<K: Ord + Clone, V>(tree: &RbTree<K, V>) -> Vec<K> {
        let mut out = Vec::new();
        let mut node = tree.first();
        while !node.is_null() {
            unsafe {
                out.push((*node).key().clone());
                node = successor(node);
            }
        }
        out
    }

    #[test]
    fn insert_maintains_invariants() {
        let pool = Pool::create(PoolFlags::CUSTOM);
        {
            let mut tree: RbTree<i32, i32> = RbTree::new(&pool);
            for key in [5, 3, 8, 1, 4, 7, 9] {
                assert!(matches!(
                    tree.insert_unique(key, key * 10),
                    InsertResult::Inserted(_)
                ));
                tree.validate();
            }
            assert_eq!(tree.len(), 7);
            assert_eq!(keys(&tree), vec![1, 3, 4, 5, 7, 8, 9]);
        }
        pool.destroy();
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let pool = Pool::create(PoolFlags::CUSTOM);
        {
            let mut tree: RbTree<i32, &str> = RbTree::new(&pool);
            tree.insert_unique(1, "first");
            match tree.insert_unique(1, "second") {
                InsertResult::Exists(node, key, value) => {
                    assert_eq!(unsafe { *(*node.as_ptr()).val() }, "first");
                    assert_eq!(key, 1);
                    assert_eq!(value, "second");
                }
                InsertResult::Inserted(_) => panic!("duplicate accepted"),
            }
            assert_eq!(tree.len(), 1);
        }
        pool.destroy();
    }

    #[test]
    fn erase_keeps_invariants() {
        let pool = Pool::create(PoolFlags::CUSTOM);
        {
            let mut tree: RbTree<i32, i32> = RbTree::new(&pool);
            for key in [5, 3, 8, 1, 4, 7, 9] {
                tree.insert_unique(key, key);
            }
            let node = tree.find(&5);
            assert!(!node.is_null());
            let (k, _) = tree.erase_node(NonNull::new(node).unwrap());
            assert_eq!(k, 5);
            tree.validate();
            assert_eq!(keys(&tree), vec![1, 3, 4, 7, 8, 9]);
        }
        pool.destroy();
    }

    #[test]
    fn random_churn_keeps_invariants() {
        let pool = Pool::create(PoolFlags::CUSTOM);
        {
            let mut tree: RbTree<u32, u32> = RbTree::new(&pool);
            // Deterministic pseudo-random sequence.
            let mut state = 0x2545F491u32;
            let mut present = std::collections::BTreeSet::new();
            for _ in 0..500 {
                state = state.wrapping_mul(1103515245).wrapping_add(12345);
                let key = state % 128;
                if present.contains(&key) {
                    let node = tree.find(&key);
                    assert!(!node.is_null());
                    tree.erase_node(NonNull::new(node).unwrap());
                    present.remove(&key);
                } else {
                    assert!(matches!(
                        tree.insert_unique(key, key),
                        InsertResult::Inserted(_)
                    ));
                    present.insert(key);
                }
                tree.validate();
            }
            let expected: Vec<u32> = present.iter().copied().collect();
            assert_eq!(keys(&tree), expected);
        }
        pool.destroy();
    }

    #[test]
    fn bounds_and_find() {
        let pool = Pool::create(PoolFlags::CUSTOM);
        {
            let mut tree: RbTree<i32, ()> = RbTree::new(&pool);
            for key in [10, 20, 30, 40] {
                tree.insert_unique(key, ());
            }
            unsafe {
                assert_eq!(*(*tree.lower_bound(&20)).key(), 20);
                assert_eq!(*(*tree.lower_bound(&21)).key(), 30);
                assert_eq!(*(*tree.upper_bound(&20)).key(), 30);
                assert!(tree.upper_bound(&40).is_null());
                assert!(tree.lower_bound(&41).is_null());
                assert!(tree.find(&25).is_null());
            }
        }
        pool.destroy();
    }

    #[test]
    fn hinted_append_at_end() {
        let pool = Pool::create(PoolFlags::CUSTOM);
        {
            let mut tree: RbTree<i32, i32> = RbTree::new(&pool);
            for key in 0..64 {
                assert!(matches!(
                    tree.insert_hint(std::ptr::null_mut(), key, key),
                    InsertResult::Inserted(_)
                ));
            }
            tree.validate();
            assert_eq!(tree.len(), 64);

            // Invalid end hint falls back to a plain insert.
            assert!(matches!(
                tree.insert_hint(std::ptr::null_mut(), -1, -1),
                InsertResult::Inserted(_)
            ));
            tree.validate();
        }
        pool.destroy();
    }

    #[test]
    fn hinted_insert_before_node() {
        let pool = Pool::create(PoolFlags::CUSTOM);
        {
            let mut tree: RbTree<i32, i32> = RbTree::new(&pool);
            tree.insert_unique(10, 10);
            tree.insert_unique(30, 30);
            let hint = tree.find(&30);
            assert!(matches!(
                tree.insert_hint(hint, 20, 20),
                InsertResult::Inserted(_)
            ));
            tree.validate();
            assert_eq!(keys(&tree), vec![10, 20, 30]);
        }
        pool.destroy();
    }

    #[test]
    fn clear_resets_and_reuses_nodes() {
        let pool = Pool::create(PoolFlags::CUSTOM);
        {
            let mut tree: RbTree<i32, String> = RbTree::new(&pool);
            tree.reserve(16);
            for key in 0..16 {
                tree.insert_unique(key, key.to_string());
            }
            tree.clear();
            assert_eq!(tree.len(), 0);
            assert_eq!(tree.free_capacity(), 16);

            tree.insert_unique(1, "again".into());
            tree.validate();
        }
        pool.destroy();
    }

    #[test]
    fn heterogeneous_lookup_via_borrow() {
        let pool = Pool::create(PoolFlags::CUSTOM);
        {
            let mut tree: RbTree<String, i32> = RbTree::new(&pool);
            tree.insert_unique("alpha".to_owned(), 1);
            tree.insert_unique("beta".to_owned(), 2);

            // Lookup with &str against String keys.
            let node = tree.find("beta");
            assert!(!node.is_null());
            assert_eq!(unsafe { *(*node).val() }, 2);
        }
        pool.destroy();
    }
}
