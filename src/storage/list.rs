//! Singly-linked list engine with batched node preallocation.

use std::mem::MaybeUninit;
use std::ptr::NonNull;

use super::arena::{ArenaNode, NodeArena};
use crate::pool::Pool;

pub(crate) struct ListNode<T> {
    batch: u32,
    next: *mut ListNode<T>,
    value: MaybeUninit<T>,
}

impl<T> ArenaNode for ListNode<T> {
    fn set_batch(&mut self, batch: u32) {
        self.batch = batch;
    }
    fn batch(&self) -> u32 {
        self.batch
    }
    // Freed nodes are threaded through the next field.
    fn set_free_next(&mut self, next: *mut Self) {
        self.next = next;
    }
    fn free_next(&self) -> *mut Self {
        self.next
    }
}

impl<T> ListNode<T> {
    #[inline]
    pub(crate) fn next(&self) -> *mut ListNode<T> {
        self.next
    }

    #[inline]
    pub(crate) fn val(&self) -> &T {
        unsafe { self.value.assume_init_ref() }
    }

    #[inline]
    pub(crate) fn val_mut(&mut self) -> &mut T {
        unsafe { self.value.assume_init_mut() }
    }
}

pub(crate) struct ListEngine<T> {
    arena: NodeArena<ListNode<T>>,
    head: *mut ListNode<T>,
    tail: *mut ListNode<T>,
    len: usize,
}

impl<T> ListEngine<T> {
    pub(crate) fn new(pool: &Pool) -> Self {
        ListEngine {
            arena: NodeArena::new(pool),
            head: std::ptr::null_mut(),
            tail: std::ptr::null_mut(),
            len: 0,
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub(crate) fn head(&self) -> *mut ListNode<T> {
        self.head
    }

    #[inline]
    pub(crate) fn pool(&self) -> &Pool {
        self.arena.pool()
    }

    pub(crate) fn free_capacity(&self) -> usize {
        self.arena.free_capacity()
    }

    fn new_node(&mut self, value: T) -> NonNull<ListNode<T>> {
        let node = self.arena.alloc_node();
        unsafe {
            (*node.as_ptr()).next = std::ptr::null_mut();
            (*node.as_ptr()).value = MaybeUninit::new(value);
        }
        node
    }

    pub(crate) fn push_front(&mut self, value: T) -> NonNull<ListNode<T>> {
        let node = self.new_node(value);
        unsafe {
            (*node.as_ptr()).next = self.head;
        }
        self.head = node.as_ptr();
        if self.tail.is_null() {
            self.tail = self.head;
        }
        self.len += 1;
        node
    }

    pub(crate) fn push_back(&mut self, value: T) -> NonNull<ListNode<T>> {
        let node = self.new_node(value);
        if self.tail.is_null() {
            self.head = node.as_ptr();
        } else {
            unsafe { (*self.tail).next = node.as_ptr() };
        }
        self.tail = node.as_ptr();
        self.len += 1;
        node
    }

    /// Inserts after `prev`; a null `prev` means before the head.
    pub(crate) fn insert_after(
        &mut self,
        prev: *mut ListNode<T>,
        value: T,
    ) -> NonNull<ListNode<T>> {
        if prev.is_null() {
            return self.push_front(value);
        }
        if prev == self.tail {
            return self.push_back(value);
        }
        let node = self.new_node(value);
        unsafe {
            (*node.as_ptr()).next = (*prev).next;
            (*prev).next = node.as_ptr();
        }
        self.len += 1;
        node
    }

    /// Removes the node after `prev` (null = the head). Returns its value.
    pub(crate) fn remove_after(&mut self, prev: *mut ListNode<T>) -> Option<T> {
        let target = if prev.is_null() {
            self.head
        } else {
            unsafe { (*prev).next }
        };
        let target = NonNull::new(target)?;
        unsafe {
            let next = (*target.as_ptr()).next;
            if prev.is_null() {
                self.head = next;
            } else {
                (*prev).next = next;
            }
            if target.as_ptr() == self.tail {
                self.tail = prev;
            }
            let value = (*target.as_ptr()).value.assume_init_read();
            self.arena.free_node(target);
            self.len -= 1;
            Some(value)
        }
    }

    /// Prepends `count` nodes built by `ctor`, preallocating them as one
    /// contiguous batch so the allocator is touched once.
    pub(crate) fn expand_front(&mut self, count: usize, mut ctor: impl FnMut() -> T) {
        self.arena.reserve(count);
        for _ in 0..count {
            self.push_front(ctor());
        }
    }

    pub(crate) fn reserve(&mut self, count: usize) {
        self.arena.reserve(count);
    }

    pub(crate) fn shrink_to_fit(&mut self) {
        self.arena.shrink_to_fit();
    }

    pub(crate) fn set_memory_persistent(&mut self, persistent: bool) {
        self.arena.set_persistent(persistent);
    }

    pub(crate) fn clear(&mut self) {
        let mut node = self.head;
        while let Some(current) = NonNull::new(node) {
            unsafe {
                node = (*current.as_ptr()).next;
                (*current.as_ptr()).value.assume_init_drop();
                self.arena.free_node(current);
            }
        }
        self.head = std::ptr::null_mut();
        self.tail = std::ptr::null_mut();
        self.len = 0;
    }
}

impl<T> Drop for ListEngine<T> {
    fn drop(&mut self) {
        self.clear();
    }
}
