//! Thread-local stack of "currently active pool" entries.
//!
//! The context stack carries an active pool through call chains without
//! adding parameters: callees that need scratch memory call
//! [`acquire`] instead of taking a pool argument. Each thread has its own
//! stack; a child thread starts empty. Entries carry an optional numeric
//! tag and a pointer-sized payload for the owner's bookkeeping.
//!
//! The scoped [`PoolContext`] guard and the [`perform`] family are the
//! preferred way to manipulate the stack.

use std::cell::RefCell;

use crate::pool::{Pool, PoolFlags};

/// Maximum nesting depth of the per-thread context stack.
pub const CONTEXT_STACK_DEPTH: usize = 256;

struct Entry {
    pool: Pool,
    tag: u32,
    payload: usize,
}

thread_local! {
    static STACK: RefCell<Vec<Entry>> = const { RefCell::new(Vec::new()) };
}

/// Pushes `pool` as the active pool for this thread.
///
/// # Panics
///
/// Panics on overflow; the stack depth bound is a design invariant.
pub fn push(pool: &Pool) {
    push_with_info(pool, 0, 0)
}

/// Pushes `pool` with a tag and a pointer-sized payload.
pub fn push_with_info(pool: &Pool, tag: u32, payload: usize) {
    pool.set_context_info(tag, payload);
    STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        assert!(
            stack.len() < CONTEXT_STACK_DEPTH,
            "pool context stack overflow"
        );
        stack.push(Entry {
            pool: pool.clone(),
            tag,
            payload,
        });
    });
}

/// Pops the active pool.
///
/// # Panics
///
/// Panics on underflow.
pub fn pop() {
    STACK.with(|stack| {
        stack
            .borrow_mut()
            .pop()
            .expect("pool context stack underflow");
    });
}

/// Returns the active pool, if any.
pub fn acquire() -> Option<Pool> {
    STACK.with(|stack| stack.borrow().last().map(|e| e.pool.clone()))
}

/// Returns the top entry's tag and payload, if any.
pub fn info() -> Option<(u32, usize)> {
    STACK.with(|stack| stack.borrow().last().map(|e| (e.tag, e.payload)))
}

/// Walks the stack from top to bottom; stop by returning `false`.
pub fn foreach_info(mut cb: impl FnMut(&Pool, u32, usize) -> bool) {
    STACK.with(|stack| {
        for entry in stack.borrow().iter().rev() {
            if !cb(&entry.pool, entry.tag, entry.payload) {
                break;
            }
        }
    });
}

/// What a [`PoolContext`] does to its pool after popping it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Finalize {
    /// Pop only.
    #[default]
    Discard,
    /// Skip the push entirely when the pool is already active.
    Conditional,
    /// Pop, then clear the pool.
    Clear,
    /// Pop, then destroy the pool.
    Destroy,
}

/// RAII guard making a pool active for a scope.
///
/// # Examples
///
/// ```rust
/// use poolcore::{context, Pool, PoolFlags};
///
/// let pool = Pool::create(PoolFlags::CUSTOM);
/// {
///     let _ctx = context::PoolContext::new(&pool, context::Finalize::Discard);
///     assert!(context::acquire().unwrap().same(&pool));
/// }
/// assert!(context::acquire().is_none());
/// pool.destroy();
/// ```
pub struct PoolContext {
    pool: Pool,
    owns: bool,
    finalize: Finalize,
}

impl PoolContext {
    /// Pushes `pool` (unless `Conditional` finds it already active).
    pub fn new(pool: &Pool, finalize: Finalize) -> PoolContext {
        Self::with_info(pool, 0, 0, finalize)
    }

    /// Pushes `pool` with a tag and payload.
    pub fn with_info(pool: &Pool, tag: u32, payload: usize, finalize: Finalize) -> PoolContext {
        let owns = match finalize {
            Finalize::Conditional => !matches!(acquire(), Some(top) if top.same(pool)),
            _ => true,
        };
        if owns {
            push_with_info(pool, tag, payload);
        }
        PoolContext {
            pool: pool.clone(),
            owns,
            finalize,
        }
    }

    /// Whether this guard performed the push (and will pop).
    #[inline]
    pub fn owns(&self) -> bool {
        self.owns
    }
}

impl Drop for PoolContext {
    fn drop(&mut self) {
        if self.owns {
            pop();
        }
        match self.finalize {
            Finalize::Discard | Finalize::Conditional => {}
            Finalize::Clear => self.pool.clear(),
            Finalize::Destroy => self.pool.destroy(),
        }
    }
}

/// Runs `cb` with `pool` active.
pub fn perform<R>(pool: &Pool, cb: impl FnOnce(&Pool) -> R) -> R {
    let _ctx = PoolContext::new(pool, Finalize::Discard);
    cb(pool)
}

/// Runs `cb` with `pool` active, recording a tag and payload.
pub fn perform_with_info<R>(
    pool: &Pool,
    tag: u32,
    payload: usize,
    cb: impl FnOnce(&Pool) -> R,
) -> R {
    let _ctx = PoolContext::with_info(pool, tag, payload, Finalize::Discard);
    cb(pool)
}

/// Runs `cb` with `pool` active, skipping the push when it already is.
pub fn perform_conditional<R>(pool: &Pool, cb: impl FnOnce(&Pool) -> R) -> R {
    let _ctx = PoolContext::new(pool, Finalize::Conditional);
    cb(pool)
}

/// Runs `cb` with `pool` active, clearing the pool afterwards.
pub fn perform_clear<R>(pool: &Pool, cb: impl FnOnce(&Pool) -> R) -> R {
    let _ctx = PoolContext::new(pool, Finalize::Clear);
    cb(pool)
}

/// Runs `cb` in a temporary child pool that is destroyed on return.
///
/// The child is created from `base`, or from the current active pool, or —
/// when neither exists — as a standalone root pool.
pub fn perform_temporary<R>(base: Option<&Pool>, cb: impl FnOnce(&Pool) -> R) -> R {
    let parent = base.cloned().or_else(acquire);
    let temp = match parent {
        Some(parent) => Pool::child_of(&parent, PoolFlags::CUSTOM),
        None => Pool::create(PoolFlags::CUSTOM),
    };
    let _ctx = PoolContext::new(&temp, Finalize::Destroy);
    cb(&temp)
}
