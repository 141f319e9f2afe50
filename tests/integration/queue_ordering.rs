//! Integration tests for priority-queue ordering and node recycling.

use poolcore::queue::{PREALLOCATED_NODES, STORAGE_NODES};
use poolcore::{Pool, PoolFlags, PriorityQueue};

#[test]
fn test_tie_breaking_matches_producer_intent() {
    let pool = Pool::create(PoolFlags::CUSTOM);
    {
        let queue: PriorityQueue<&str> = PriorityQueue::new(&pool);
        queue.push(10, false, "a");
        queue.push(5, false, "b");
        queue.push(10, true, "c");

        let mut order = Vec::new();
        while queue.pop_prefix(|_, value| order.push(value)) {}
        assert_eq!(order, vec!["b", "c", "a"]);
    }
    pool.destroy();
}

#[test]
fn test_first_if_tie_orders_within_equal_priorities() {
    let pool = Pool::create(PoolFlags::CUSTOM);
    {
        let queue: PriorityQueue<u32> = PriorityQueue::new(&pool);
        // Tail-inserted peers keep arrival order; head-inserted peers
        // reverse it and precede all of them.
        queue.push(1, false, 1);
        queue.push(1, false, 2);
        queue.push(1, true, 3);
        queue.push(1, true, 4);

        let mut order = Vec::new();
        while queue.pop_prefix(|_, value| order.push(value)) {}
        assert_eq!(order, vec![4, 3, 1, 2]);
    }
    pool.destroy();
}

#[test]
fn test_priorities_never_decrease_under_churn() {
    let pool = Pool::create(PoolFlags::CUSTOM);
    {
        let queue: PriorityQueue<u64> = PriorityQueue::new(&pool);
        let mut state = 777u64;
        let mut pending = 0usize;

        for round in 0..1000u64 {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
            if pending == 0 || state % 3 != 0 {
                queue.push((state % 10) as i32, state & 1 == 0, round);
                pending += 1;
            } else {
                let mut floor = i32::MIN;
                assert!(queue.pop_prefix(|priority, _| floor = priority));
                pending -= 1;
                // Everything still queued is at or above what we popped.
                queue.foreach(|priority, _| assert!(priority >= floor));
            }
        }
    }
    pool.destroy();
}

#[test]
fn test_blocks_come_from_the_pool_and_return() {
    let pool = Pool::create(PoolFlags::CUSTOM);
    {
        let queue: PriorityQueue<u64> = PriorityQueue::new(&pool);
        assert_eq!(queue.capacity(), PREALLOCATED_NODES);
        assert_eq!(queue.free_capacity(), PREALLOCATED_NODES);

        let total = PREALLOCATED_NODES + STORAGE_NODES + 1;
        for i in 0..total as u64 {
            queue.push(0, false, i);
        }
        // Two blocks were carved out of the pool.
        assert_eq!(
            queue.capacity(),
            PREALLOCATED_NODES + 2 * STORAGE_NODES
        );
        assert!(pool.allocated_bytes() > 0);

        while queue.pop_prefix(|_, _| {}) {}
        // Every block returned to the pool's exact-size freelist.
        assert_eq!(queue.capacity(), PREALLOCATED_NODES);
        assert!(pool.return_bytes() >= pool.allocated_bytes());
    }
    pool.destroy();
}

#[test]
fn test_clear_requires_no_consumers_and_drops_items() {
    let pool = Pool::create(PoolFlags::CUSTOM);
    {
        let queue: PriorityQueue<Vec<u8>> = PriorityQueue::new(&pool);
        for i in 0..20 {
            queue.push(i, false, vec![0u8; 128]);
        }
        queue.clear();
        assert!(queue.empty());
        assert_eq!(queue.capacity(), PREALLOCATED_NODES);
    }
    pool.destroy();
}

#[test]
fn test_pop_direct_sees_value_in_place() {
    let pool = Pool::create(PoolFlags::CUSTOM);
    {
        let queue: PriorityQueue<Box<u64>> = PriorityQueue::new(&pool);
        queue.push(3, false, Box::new(33));
        queue.push(1, false, Box::new(11));

        let mut seen = Vec::new();
        while queue.pop_direct(|priority, value| seen.push((priority, **value))) {}
        assert_eq!(seen, vec![(1, 11), (3, 33)]);
    }
    pool.destroy();
}
