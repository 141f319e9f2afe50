//! Integration tests for the pool-aware container family.

use poolcore::{Callback, ForwardList, OrderedMap, OrderedSet, Pool, PoolFlags, PoolFunction, SooBuf};

#[test]
fn test_map_invariants_through_insert_and_erase() {
    let pool = Pool::create(PoolFlags::CUSTOM);
    {
        let mut map = OrderedMap::new(&pool);
        for key in [5, 3, 8, 1, 4, 7, 9] {
            map.insert(key, key * 10);
            map.validate();
        }

        assert_eq!(map.remove(&5), Some(50));
        map.validate();

        let keys: Vec<i32> = map.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![1, 3, 4, 7, 8, 9]);
    }
    pool.destroy();
}

#[test]
fn test_map_heavy_churn_against_reference() {
    let pool = Pool::create(PoolFlags::CUSTOM);
    {
        let mut map = OrderedMap::new(&pool);
        let mut reference = std::collections::BTreeMap::new();
        let mut state = 12345u64;

        for _ in 0..2000 {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let key = (state >> 33) % 256;
            if state & 1 == 0 {
                assert_eq!(map.insert(key, state), reference.insert(key, state));
            } else {
                assert_eq!(map.remove(&key), reference.remove(&key));
            }
        }
        map.validate();

        let ours: Vec<(u64, u64)> = map.iter().map(|(k, v)| (*k, *v)).collect();
        let theirs: Vec<(u64, u64)> = reference.iter().map(|(k, v)| (*k, *v)).collect();
        assert_eq!(ours, theirs);
    }
    pool.destroy();
}

#[test]
fn test_set_and_map_share_a_pool() {
    let pool = Pool::create(PoolFlags::CUSTOM);
    {
        let mut set = OrderedSet::new(&pool);
        let mut map = OrderedMap::new(&pool);
        for i in 0..100 {
            set.insert(i);
            map.insert(i, i * 2);
        }
        set.validate();
        map.validate();
        assert_eq!(set.len(), 100);
        assert_eq!(map.len(), 100);
    }
    pool.destroy();
}

#[test]
fn test_reserved_batch_is_used_without_new_allocations() {
    let pool = Pool::create(PoolFlags::CUSTOM);
    {
        let mut map: OrderedMap<u64, u64> = OrderedMap::new(&pool);
        map.reserve(64);
        let after_reserve = pool.allocated_bytes();
        assert!(after_reserve > 0);

        for key in 0..64 {
            map.insert(key, key);
        }
        // All nodes came from the reserved batch.
        assert_eq!(pool.allocated_bytes(), after_reserve);
    }
    pool.destroy();
}

#[test]
fn test_forward_list_round_trip() {
    let pool = Pool::create(PoolFlags::CUSTOM);
    {
        let mut list = ForwardList::new(&pool);
        for i in (0..10).rev() {
            list.push_front(i);
        }
        let values: Vec<i32> = list.iter().copied().collect();
        assert_eq!(values, (0..10).collect::<Vec<_>>());

        let mut cursor = list.before_begin();
        cursor.insert_after(-1);
        assert_eq!(list.front(), Some(&-1));
    }
    pool.destroy();
}

#[test]
fn test_soo_buffer_crossing_is_one_allocation() {
    let pool = Pool::create(PoolFlags::CUSTOM);
    {
        let mut buf: SooBuf<u8, 1> = SooBuf::new(&pool);
        let cap = SooBuf::<u8, 1>::SMALL_CAPACITY;

        for i in 0..cap {
            buf.push(i as u8);
        }
        assert_eq!(pool.allocated_bytes(), 0);

        buf.push(0xFF);
        let after_first_growth = pool.allocated_bytes();
        assert!(after_first_growth > 0);

        // Growth within the new capacity allocates nothing further.
        buf.push(0xFE);
        assert_eq!(pool.allocated_bytes(), after_first_growth);
        assert_eq!(buf.len(), cap + 2);
    }
    pool.destroy();
}

#[test]
fn test_pool_function_closes_over_environment() {
    let pool = Pool::create(PoolFlags::CUSTOM);
    {
        let table = vec![10u32, 20, 30];
        let lookup = PoolFunction::new(&pool, move |(i,): (usize,)| table[i]);
        assert_eq!(lookup.call((1,)), 20);

        let cloned = lookup.clone();
        drop(lookup);
        assert_eq!(cloned.call((2,)), 30);
    }
    pool.destroy();
}

#[test]
fn test_callback_passes_through_call_chain() {
    fn consume(cb: &Callback<'_, (u32,), u32>, input: u32) -> u32 {
        cb.call((input,))
    }

    let doubler = |(v,): (u32,)| v * 2;
    let cb = Callback::new(&doubler);
    assert_eq!(consume(&cb, 21), 42);
}

#[test]
fn test_containers_dropped_before_clear_release_leases() {
    let pool = Pool::create(PoolFlags::CUSTOM);
    {
        let mut map = OrderedMap::new(&pool);
        map.insert(1, 1);
    }
    // Map dropped: clear is allowed again.
    pool.clear();
    pool.destroy();
}

#[test]
#[should_panic(expected = "outstanding container leases")]
fn test_clear_under_live_container_is_fatal() {
    let pool = Pool::create(PoolFlags::CUSTOM);
    let mut map = OrderedMap::new(&pool);
    map.insert(1, 1);
    pool.clear();
}
