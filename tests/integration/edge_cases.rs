//! Edge-case coverage across the toolkit.

use poolcore::{context, Pool, PoolFlags, PriorityQueue, SooBuf};

#[test]
fn test_zero_sized_allocation_still_returns_a_block() {
    let pool = Pool::create(PoolFlags::CUSTOM);
    let mut size = 0;
    let ptr = pool.alloc(&mut size);
    assert!(size > 0);
    assert!(!ptr.as_ptr().is_null());
    pool.destroy();
}

#[test]
fn test_free_of_unknown_pointer_is_ignored() {
    let pool = Pool::create(PoolFlags::CUSTOM);
    let mut bogus = [0u8; 512];
    let ptr = std::ptr::NonNull::new(bogus.as_mut_ptr()).unwrap();
    // Not a pool block: must be ignored, not corrupt the freelist.
    pool.free(ptr, 512);
    assert_eq!(pool.return_bytes(), 0);
    pool.destroy();
}

#[test]
fn test_deep_context_nesting_within_bound() {
    let pool = Pool::create(PoolFlags::CUSTOM);
    for _ in 0..100 {
        context::push(&pool);
    }
    for _ in 0..100 {
        context::pop();
    }
    assert!(context::acquire().is_none());
    pool.destroy();
}

#[test]
fn test_empty_queue_pops_report_false() {
    let pool = Pool::create(PoolFlags::CUSTOM);
    {
        let queue: PriorityQueue<u8> = PriorityQueue::new(&pool);
        assert!(!queue.pop_prefix(|_, _| panic!("nothing to pop")));
        assert!(!queue.pop_direct(|_, _| panic!("nothing to pop")));
        assert!(queue.empty());
    }
    pool.destroy();
}

#[test]
fn test_negative_priorities_sort_before_zero() {
    let pool = Pool::create(PoolFlags::CUSTOM);
    {
        let queue: PriorityQueue<i32> = PriorityQueue::new(&pool);
        queue.push(0, false, 0);
        queue.push(-5, false, -5);
        queue.push(3, false, 3);

        let mut order = Vec::new();
        while queue.pop_prefix(|_, v| order.push(v)) {}
        assert_eq!(order, vec![-5, 0, 3]);
    }
    pool.destroy();
}

#[test]
fn test_soo_buffer_of_wide_elements() {
    let pool = Pool::create(PoolFlags::CUSTOM);
    {
        // u64 elements: small capacity is (24 - 1) / 8 = 2.
        let mut buf: SooBuf<u64> = SooBuf::new(&pool);
        assert_eq!(SooBuf::<u64>::SMALL_CAPACITY, 2);

        buf.push(1);
        buf.push(2);
        assert_eq!(pool.allocated_bytes(), 0);

        buf.push(3);
        assert!(pool.allocated_bytes() > 0);
        assert_eq!(buf.as_slice(), &[1, 2, 3]);
    }
    pool.destroy();
}

#[test]
fn test_empty_soo_extract_is_valid() {
    let pool = Pool::create(PoolFlags::CUSTOM);
    {
        let mut buf: SooBuf<u8, 1> = SooBuf::new(&pool);
        let (ptr, len) = buf.extract();
        assert_eq!(len, 0);
        assert!(!ptr.as_ptr().is_null());
    }
    pool.destroy();
}

#[test]
fn test_nested_temporary_pools() {
    let value = context::perform_temporary(None, |outer| {
        let outer_tag = outer.allocated_bytes();
        context::perform_temporary(None, |inner| {
            let _ = inner.palloc(64);
        });
        outer_tag
    });
    assert_eq!(value, 0);
}
