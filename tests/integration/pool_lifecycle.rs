//! Integration tests for pool lifetime, cleanups, and the context stack.

use poolcore::{context, Allocator, Pool, PoolFlags};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[test]
fn test_mixed_allocation_lifecycle() {
    // 200 and 300 bytes stay in the bump arena; the 4096-byte block is
    // tracked for exact-size recycling.
    let alloc = Allocator::new();
    let pool = Pool::with_allocator(&alloc, PoolFlags::CUSTOM);

    let mut small_a = 200;
    let mut small_b = 300;
    let mut large = 4096;
    let _pa = pool.alloc(&mut small_a);
    let _pb = pool.alloc(&mut small_b);
    let pc = pool.alloc(&mut large);
    assert_eq!(large, 4096);

    pool.free(pc, 4096);
    assert_eq!(pool.return_bytes(), 4096);

    // The freed block is reused for the next same-sized request.
    let mut again = 4096;
    assert_eq!(pool.alloc(&mut again), pc);
    pool.free(pc, 4096);

    let retained_before = alloc.retained_bytes();
    pool.destroy();
    // Every slab went back to the allocator's freelist.
    assert!(alloc.retained_bytes() > retained_before);
}

#[test]
fn test_descendant_cleanups_run_once_in_reverse_order() {
    let order = Arc::new(Mutex::new(Vec::new()));

    let root = Pool::create(PoolFlags::CUSTOM);
    let mut children = Vec::new();
    for i in 0..4 {
        let child = Pool::child_of(&root, PoolFlags::CUSTOM);
        let order = Arc::clone(&order);
        child.cleanup_register_fn(move || order.lock().unwrap().push(i));
        children.push(child);
    }

    root.destroy();
    // Reverse registration order, each exactly once.
    assert_eq!(*order.lock().unwrap(), vec![3, 2, 1, 0]);
}

#[test]
fn test_grandchildren_die_before_grandparent_cleanups() {
    let order = Arc::new(Mutex::new(Vec::new()));

    let root = Pool::create(PoolFlags::CUSTOM);
    let child = Pool::child_of(&root, PoolFlags::CUSTOM);
    let grandchild = Pool::child_of(&child, PoolFlags::CUSTOM);

    for (pool, name) in [(&root, "root"), (&child, "child"), (&grandchild, "grand")] {
        let order = Arc::clone(&order);
        pool.cleanup_register_fn(move || order.lock().unwrap().push(name));
    }

    root.destroy();
    assert_eq!(*order.lock().unwrap(), vec!["grand", "child", "root"]);
}

#[test]
fn test_killed_cleanup_never_fires() {
    static FIRED: AtomicUsize = AtomicUsize::new(0);
    fn record(_: *mut ()) -> poolcore::Result<()> {
        FIRED.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    let pool = Pool::create(PoolFlags::CUSTOM);
    pool.cleanup_register(std::ptr::null_mut(), record);
    pool.cleanup_register(1 as *mut (), record);
    pool.cleanup_kill(std::ptr::null_mut(), record);
    pool.destroy();

    // Only the (1, record) registration survived.
    assert_eq!(FIRED.load(Ordering::Relaxed), 1);
}

#[test]
fn test_clear_reuses_pool_across_generations() {
    let pool = Pool::create(PoolFlags::CUSTOM);
    for generation in 0..50 {
        let bytes = pool.palloc(100 + generation);
        assert!(!bytes.as_ptr().is_null());
        pool.clear();
        assert_eq!(pool.allocated_bytes(), 0);
    }
    pool.destroy();
}

#[test]
fn test_context_stack_threads_active_pool() {
    let outer = Pool::create_tagged("outer", PoolFlags::CUSTOM);
    let inner = Pool::create_tagged("inner", PoolFlags::CUSTOM);

    context::perform(&outer, |_| {
        assert_eq!(context::acquire().unwrap().tag(), Some("outer"));
        context::perform(&inner, |_| {
            assert_eq!(context::acquire().unwrap().tag(), Some("inner"));
        });
        assert_eq!(context::acquire().unwrap().tag(), Some("outer"));
    });
    assert!(context::acquire().is_none());

    inner.destroy();
    outer.destroy();
}

#[test]
fn test_child_threads_see_empty_context() {
    let pool = Pool::create(PoolFlags::THREAD_SAFE);
    context::perform(&pool, |_| {
        std::thread::scope(|scope| {
            scope.spawn(|| {
                assert!(context::acquire().is_none());
            });
        });
    });
    pool.destroy();
}

#[test]
fn test_thread_safe_pool_allocates_from_many_threads() {
    let pool = Pool::create(PoolFlags::THREAD_SAFE);
    std::thread::scope(|scope| {
        for _ in 0..4 {
            let pool = pool.clone();
            scope.spawn(move || {
                for size in 1..200 {
                    let ptr = pool.palloc(size);
                    assert!(!ptr.as_ptr().is_null());
                }
            });
        }
    });
    assert!(pool.allocated_bytes() > 0);
    pool.destroy();
}

#[test]
fn test_userdata_survives_until_clear() {
    static DROPPED: AtomicUsize = AtomicUsize::new(0);
    fn on_drop(_: *mut ()) -> poolcore::Result<()> {
        DROPPED.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    let pool = Pool::create(PoolFlags::CUSTOM);
    pool.userdata_set("slot", 7 as *mut (), Some(on_drop)).unwrap();
    assert_eq!(pool.userdata_get("slot").unwrap(), Some(7 as *mut ()));

    pool.clear();
    assert_eq!(DROPPED.load(Ordering::Relaxed), 1);
    assert_eq!(pool.userdata_get("slot").unwrap(), None);
    pool.destroy();
}

#[test]
fn test_magic_word_identifies_native_pools() {
    let pool = Pool::create(PoolFlags::CUSTOM);
    assert!(unsafe { poolcore::is_native_pool(pool.as_raw()) });

    let foreign = [0xA5u8; 64];
    assert!(!unsafe { poolcore::is_native_pool(foreign.as_ptr()) });
    pool.destroy();
}
