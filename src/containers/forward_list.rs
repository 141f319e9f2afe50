//! Pool-aware singly-linked list with the before-begin cursor model.

use std::marker::PhantomData;

use crate::context;
use crate::pool::Pool;
use crate::storage::list::{ListEngine, ListNode};

/// A singly-linked list whose nodes live in a pool.
///
/// Nodes come from batched pool blocks; [`expand_front`]
/// pre-builds many entries with a single allocator call, and freed nodes
/// recycle through a private freelist. Positional edits use a
/// [`CursorMut`] obtained from [`before_begin`], mirroring the classic
/// before-begin/insert-after model.
///
/// [`expand_front`]: ForwardList::expand_front
/// [`before_begin`]: ForwardList::before_begin
///
/// # Examples
///
/// ```rust
/// use poolcore::{ForwardList, Pool, PoolFlags};
///
/// let pool = Pool::create(PoolFlags::CUSTOM);
/// {
///     let mut list = ForwardList::new(&pool);
///     list.push_front(2);
///     list.push_front(1);
///     let values: Vec<i32> = list.iter().copied().collect();
///     assert_eq!(values, vec![1, 2]);
/// }
/// pool.destroy();
/// ```
pub struct ForwardList<T> {
    engine: ListEngine<T>,
}

impl<T> ForwardList<T> {
    /// Creates an empty list allocating from `pool`.
    pub fn new(pool: &Pool) -> Self {
        ForwardList {
            engine: ListEngine::new(pool),
        }
    }

    /// Creates an empty list allocating from the thread's active pool.
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
        self.engine.len()
    }

    /// True when the list holds no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.engine.len() == 0
    }

    /// Prepends an element.
    pub fn push_front(&mut self, value: T) {
        self.engine.push_front(value);
    }

    /// Removes and returns the first element.
    pub fn pop_front(&mut self) -> Option<T> {
        self.engine.remove_after(std::ptr::null_mut())
    }

    /// First element.
    pub fn front(&self) -> Option<&T> {
        let head = self.engine.head();
        if head.is_null() {
            None
        } else {
            Some(unsafe { (*head).val() })
        }
    }

    /// Mutable first element.
    pub fn front_mut(&mut self) -> Option<&mut T> {
        let head = self.engine.head();
        if head.is_null() {
            None
        } else {
            Some(unsafe { (*head).val_mut() })
        }
    }

    /// Prepends `count` elements built by `ctor`, allocating their nodes
    /// as one contiguous batch.
    pub fn expand_front(&mut self, count: usize, ctor: impl FnMut() -> T) {
        self.engine.expand_front(count, ctor);
    }

    /// Preallocates one contiguous batch of `additional` nodes.
    pub fn reserve(&mut self, additional: usize) {
        self.engine.reserve(additional);
    }

    /// Releases idle node batches back to the pool.
    pub fn shrink_to_fit(&mut self) {
        self.engine.shrink_to_fit();
    }

    /// Keeps freed nodes forever.
    pub fn set_memory_persistent(&mut self, persistent: bool) {
        self.engine.set_memory_persistent(persistent);
    }

    /// Idle preallocated nodes (diagnostic).
    pub fn free_capacity(&self) -> usize {
        self.engine.free_capacity()
    }

    /// Drops all elements; preallocated nodes stay available.
    pub fn clear(&mut self) {
        self.engine.clear();
    }

    /// Iterator over the elements front to back.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            node: self.engine.head(),
            _marker: PhantomData,
        }
    }

    /// Cursor positioned before the first element.
    pub fn before_begin(&mut self) -> CursorMut<'_, T> {
        CursorMut {
            list: self,
            prev: std::ptr::null_mut(),
        }
    }
}

/// Forward iterator over list elements.
pub struct Iter<'a, T> {
    node: *mut ListNode<T>,
    _marker: PhantomData<&'a T>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.node.is_null() {
            return None;
        }
        unsafe {
            let item = (*self.node).val();
            self.node = (*self.node).next();
            Some(item)
        }
    }
}

impl<'a, T> IntoIterator for &'a ForwardList<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Mutable cursor using the before-begin model: the cursor sits *between*
/// elements, and edits apply after its position.
pub struct CursorMut<'a, T> {
    list: &'a mut ForwardList<T>,
    /// Node before the cursor gap; null = before-begin.
    prev: *mut ListNode<T>,
}

impl<'a, T> CursorMut<'a, T> {
    /// Element directly after the cursor.
    pub fn peek_next(&self) -> Option<&T> {
        let next = self.next_node();
        if next.is_null() {
            None
        } else {
            Some(unsafe { (*next).val() })
        }
    }

    fn next_node(&self) -> *mut ListNode<T> {
        if self.prev.is_null() {
            self.list.engine.head()
        } else {
            unsafe { (*self.prev).next() }
        }
    }

    /// Advances past the next element. Returns false at the end.
    pub fn move_next(&mut self) -> bool {
        let next = self.next_node();
        if next.is_null() {
            false
        } else {
            self.prev = next;
            true
        }
    }

    /// Inserts an element after the cursor position.
    pub fn insert_after(&mut self, value: T) {
        self.list.engine.insert_after(self.prev, value);
    }

    /// Removes and returns the element after the cursor position.
    pub fn remove_next(&mut self) -> Option<T> {
        self.list.engine.remove_after(self.prev)
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for ForwardList<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

unsafe impl<T: Send> Send for ForwardList<T> {}
