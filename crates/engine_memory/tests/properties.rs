//! Property tests for the allocators

use engine_memory::prelude::*;
use proptest::prelude::*;

proptest! {
    #[test]
    fn pushes_are_increasing_and_disjoint(sizes in prop::collection::vec(1usize..64, 1..32)) {
        let total: usize = sizes.iter().sum();
        let arena = Arena::new(total).unwrap();

        let mut expected = arena.base().as_ptr() as usize;
        for &size in &sizes {
            let addr = arena.push(size).as_ptr() as usize;
            prop_assert_eq!(addr, expected);
            expected += size;
        }
        prop_assert_eq!(arena.used(), total);
    }

    #[test]
    fn reset_to_mark_returns_the_first_later_address(
        before in 0usize..128,
        after in prop::collection::vec(1usize..64, 1..16),
        next in 1usize..64,
    ) {
        let mut arena = Arena::new(4096).unwrap();
        arena.push(before);
        let mark = arena.mark();
        let first = arena.push(after[0]).as_ptr() as usize;
        for &size in &after[1..] {
            arena.push(size);
        }

        arena.reset_to(mark).unwrap();
        prop_assert_eq!(arena.push(next).as_ptr() as usize, first);
    }

    #[test]
    fn aligned_pushes_respect_alignment(
        requests in prop::collection::vec((0usize..48, 0u32..7), 1..32),
    ) {
        let arena = Arena::new(64 * 1024).unwrap();
        let mut last_end = arena.base().as_ptr() as usize;
        for (size, shift) in requests {
            let align = 1usize << shift;
            let addr = arena.push_aligned(size, align).as_ptr() as usize;
            prop_assert_eq!(addr % align, 0);
            prop_assert!(addr >= last_end);
            last_end = addr + size;
        }
    }

    #[test]
    fn pool_hands_out_exactly_k_chunks(k in 1usize..64, chunk_size in 1usize..64) {
        let mut pool = PoolAllocator::new(k, chunk_size).unwrap();
        let mut chunks = Vec::new();
        for j in 0..k {
            chunks.push(pool.allocate().unwrap());
            prop_assert_eq!(pool.available_chunks(), k - j - 1);
        }
        prop_assert!(pool.allocate().is_err());

        for chunk in chunks {
            pool.deallocate(chunk).unwrap();
        }
        prop_assert_eq!(pool.available_chunks(), k);
    }

    #[test]
    fn pool_any_order_release_keeps_invariant(order in Just((0..16usize).collect::<Vec<_>>()).prop_shuffle()) {
        let mut pool = PoolAllocator::new(16, 8).unwrap();
        let chunks: Vec<_> = (0..16).map(|_| pool.allocate().unwrap()).collect();
        for (freed, &index) in order.iter().enumerate() {
            pool.deallocate(chunks[index]).unwrap();
            prop_assert_eq!(pool.available_chunks(), freed + 1);
        }
        let mut again: Vec<usize> = (0..16).map(|_| pool.allocate().unwrap().as_ptr() as usize).collect();
        let mut original: Vec<usize> = chunks.iter().map(|c| c.as_ptr() as usize).collect();
        again.sort_unstable();
        original.sort_unstable();
        prop_assert_eq!(again, original);
    }

    #[test]
    fn nested_scoped_handles_restore_the_cursor(sizes in prop::collection::vec(0usize..32, 1..12)) {
        let stack = StackAllocator::new(1024).unwrap();
        let start = stack.used();
        let mut handles = Vec::new();
        let mut cursors = Vec::new();
        for &size in &sizes {
            cursors.push(stack.used());
            handles.push(stack.allocate(size).unwrap());
        }
        while let Some(handle) = handles.pop() {
            let expected = cursors.pop().unwrap();
            drop(handle);
            prop_assert_eq!(stack.used(), expected);
        }
        prop_assert_eq!(stack.used(), start);
    }

    #[test]
    fn adapter_refill_stays_within_budget(m in 1usize..128) {
        let arena = Arena::new(128 * 8).unwrap();
        let mut values: ArenaVec<'_, u64> = ArenaVec::with_capacity_in(m, arena.allocator());
        values.extend(0..m as u64);
        values.clear();
        values.extend(0..m as u64);
        prop_assert_eq!(arena.used(), m * std::mem::size_of::<u64>());
    }

    #[test]
    fn adapter_growth_from_empty_stays_within_budget(m in 1usize..128) {
        let arena = Arena::new(256 * 8).unwrap();
        let mut values: ArenaVec<'_, u64> = arena.new_vec();
        values.extend(0..m as u64);
        let first_fill = arena.used();
        prop_assert_eq!(first_fill, values.capacity() * std::mem::size_of::<u64>());

        values.clear();
        values.extend(0..m as u64);
        prop_assert_eq!(values.len(), m);
        prop_assert_eq!(arena.used(), first_fill);
    }

    #[test]
    fn padded_stack_vecs_release_to_their_start(pads in prop::collection::vec(1usize..8, 1..8)) {
        let stack = StackAllocator::new(1024).unwrap();
        let mut scoped = Vec::new();
        let mut vecs = Vec::new();
        let mut cursors = Vec::new();
        for &pad in &pads {
            cursors.push(stack.used());
            scoped.push(stack.allocate(pad).unwrap());
            let mut values: StackVec<'_, u64> = StackVec::with_capacity_in(1, stack.allocator());
            values.push(pad as u64);
            vecs.push(values);
        }
        while let Some(values) = vecs.pop() {
            drop(values);
            drop(scoped.pop());
            prop_assert_eq!(Some(stack.used()), cursors.pop());
        }
        prop_assert_eq!(stack.used(), 0);
    }
}
