//! # poolcore
//!
//! A pool-based memory toolkit: hierarchical region pools, pool-aware
//! containers, a priority work queue, and a categorised filesystem
//! resource resolver built on top of them.
//!
//! ## Overview
//!
//! `poolcore` is built around region allocation: a [`Pool`] hands out
//! memory that is reclaimed wholesale when the pool is cleared or
//! destroyed. Pools form a tree (children die before parents), carry
//! cleanup hooks and keyed user-data, and share free-slab lists through an
//! [`Allocator`]. On top of that substrate sit:
//!
//! - a thread-local [`context`] stack carrying the "active pool" through
//!   call chains;
//! - pool-aware containers: [`OrderedMap`], [`OrderedSet`],
//!   [`ForwardList`], the SSO buffer [`SooBuf`], and the type-erased
//!   [`PoolFunction`] / [`Callback`] pair;
//! - a multi-producer [`PriorityQueue`] with pluggable locking;
//! - the [`fs`] module: a `FileCategory`-indexed resource resolver
//!   honouring XDG conventions, plus memory-mapped file regions.
//!
//! ## Quick start
//!
//! ```rust
//! use poolcore::{OrderedMap, Pool, PoolFlags};
//!
//! let pool = Pool::create(PoolFlags::CUSTOM);
//! {
//!     let mut map = OrderedMap::new(&pool);
//!     map.insert("b", 2);
//!     map.insert("a", 1);
//!     assert_eq!(map.iter().map(|(k, _)| *k).collect::<Vec<_>>(), ["a", "b"]);
//! }
//! pool.destroy();
//! ```
//!
//! ## Memory model
//!
//! Allocation from a pool never fails (system exhaustion aborts). Blocks
//! under 256 bytes come from a bump arena and are reclaimed only by
//! `clear`/`destroy`; larger blocks recycle through an exact-size
//! freelist. Containers lease the pool they allocate from: clearing or
//! destroying a pool while a container still uses it is a fatal error
//! rather than a use-after-free.
//!
//! ## Feature flags
//!
//! - `parking_lot` — faster internal mutexes and the queue's raw-mutex
//!   helper
//! - `serde` — `Serialize`/`Deserialize` on the fs value types and
//!   [`PoolStats`]

#![warn(missing_docs, rust_2018_idioms)]

pub mod config;
pub mod containers;
pub mod context;
pub mod error;
pub mod fs;
pub mod pool;
pub mod queue;
pub mod stats;

mod storage;
mod sync;
mod utils;

pub use config::AllocatorConfig;
pub use containers::{Callback, CursorMut, ForwardList, OrderedMap, OrderedSet, PoolFunction};
pub use error::{Result, Status};
pub use pool::{active_pool_count, is_native_pool, Allocator, CleanupFn, Pool, PoolFlags};
pub use queue::PriorityQueue;
pub use stats::PoolStats;
pub use storage::SooBuf;

// Prelude for convenient imports
pub mod prelude {
    //! Convenient re-exports of commonly used types

    pub use crate::config::AllocatorConfig;
    pub use crate::containers::{Callback, ForwardList, OrderedMap, OrderedSet, PoolFunction};
    pub use crate::context::{self, Finalize, PoolContext};
    pub use crate::error::{Result, Status};
    pub use crate::fs::{AccessMode, FileCategory, FileFlags, FileInfo, MappingType, ProtFlags};
    pub use crate::pool::{Allocator, Pool, PoolFlags};
    pub use crate::queue::PriorityQueue;
    pub use crate::storage::SooBuf;
}
