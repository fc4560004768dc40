//! Property-based tests for allocator and engine invariants
//!
//! Uses proptest to verify the bitmap, the catalog and the sort path agree
//! across many random operation sequences

use proptest::prelude::*;
use std::collections::HashSet;
use vdisk_rs::{
    BitmapAllocator, BlockAllocator, EngineConfig, Extent, MemoryStore, StorageEngine,
};

#[derive(Debug, Clone)]
enum Op {
    Reserve(u64),
    Release(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1u64..40).prop_map(Op::Reserve),
        any::<usize>().prop_map(Op::Release),
    ]
}

fn small_engine(budget: u64) -> StorageEngine<MemoryStore> {
    let config = EngineConfig::small().with_sort_budget(budget).with_seed(11);
    StorageEngine::with_store(MemoryStore::new(config.capacity_bytes), config).unwrap()
}

proptest! {
    #[test]
    fn prop_occupied_blocks_equal_live_extents(
        ops in prop::collection::vec(op_strategy(), 1..80)
    ) {
        let mut alloc = BitmapAllocator::new(4096, 200);
        let mut live: Vec<Extent> = Vec::new();

        for op in ops {
            match op {
                Op::Reserve(blocks) => {
                    if let Ok(extent) = alloc.reserve_blocks(blocks) {
                        live.push(extent);
                    }
                }
                Op::Release(i) if !live.is_empty() => {
                    let extent = live.swap_remove(i % live.len());
                    alloc.release(extent);
                }
                Op::Release(_) => {}
            }

            // No block is shared between live extents
            let mut claimed = HashSet::new();
            for extent in &live {
                for block in extent.start..extent.end() {
                    prop_assert!(claimed.insert(block), "Block {} reserved twice!", block);
                }
            }

            for block in 0..alloc.total_blocks() {
                prop_assert_eq!(alloc.is_occupied(block), claimed.contains(&block));
            }

            prop_assert_eq!(
                alloc.free_block_count() + alloc.occupied_block_count(),
                alloc.total_blocks()
            );
            prop_assert_eq!(alloc.count_occupied(), claimed.len() as u64);
        }
    }

    #[test]
    fn prop_reserve_fails_only_without_a_run(
        occupied in prop::collection::vec(any::<bool>(), 1..150),
        request in 1u64..20
    ) {
        let mut alloc = BitmapAllocator::new(4096, occupied.len() as u64);
        for (i, &used) in occupied.iter().enumerate() {
            if used {
                alloc.mark_occupied(Extent::new(i as u64, 1)).unwrap();
            }
        }

        let largest = alloc.largest_free_run();
        match alloc.reserve_blocks(request) {
            Ok(extent) => {
                prop_assert!(request <= largest);
                // First fit: nothing earlier could hold the request
                let earlier_run = (0..extent.start).any(|start| {
                    start + request <= extent.start
                        && (start..start + request).all(|b| !occupied[b as usize])
                });
                prop_assert!(!earlier_run);
            }
            Err(_) => prop_assert!(request > largest),
        }
    }

    #[test]
    fn prop_engine_stays_consistent(
        sizes in prop::collection::vec(1i64..5000, 1..12),
        deletions in prop::collection::vec(any::<bool>(), 12)
    ) {
        let mut engine = small_engine(64 * 1024);

        for (i, &count) in sizes.iter().enumerate() {
            engine.create(&format!("f{}", i), count).unwrap();
        }

        for (i, &delete) in deletions.iter().take(sizes.len()).enumerate() {
            if delete {
                engine.delete(&format!("f{}", i)).unwrap();
            }
            prop_assert!(engine.check_consistency().is_ok());
        }

        let remaining: u64 = sizes
            .iter()
            .zip(&deletions)
            .filter(|(_, deleted)| !**deleted)
            .map(|(&count, _)| count as u64 * 4)
            .sum();
        prop_assert_eq!(engine.list().used_bytes, remaining);
        prop_assert_eq!(engine.free_bytes(), engine.total_capacity() - remaining);
    }

    #[test]
    fn prop_external_and_in_memory_sort_agree(
        values in prop::collection::vec(any::<i32>(), 1..3000)
    ) {
        let mut external = small_engine(256);
        let mut in_memory = small_engine(64 * 1024);
        external.create_with_values("v", &values).unwrap();
        in_memory.create_with_values("v", &values).unwrap();

        external.sort("v").unwrap();
        in_memory.sort("v").unwrap();

        let end = values.len() as i64 - 1;
        let a = external.read_range("v", 0, end).unwrap();
        let b = in_memory.read_range("v", 0, end).unwrap();

        let mut expected = values.clone();
        expected.sort();
        prop_assert_eq!(&a, &expected);
        prop_assert_eq!(&b, &expected);
    }

    #[test]
    fn prop_concatenate_preserves_order(
        head in prop::collection::vec(any::<i32>(), 1..3000),
        tail in prop::collection::vec(any::<i32>(), 1..3000),
        spacer in any::<bool>()
    ) {
        let mut engine = small_engine(64 * 1024);
        engine.create_with_values("a", &head).unwrap();
        if spacer {
            engine.create("spacer", 1).unwrap();
        }
        engine.create_with_values("b", &tail).unwrap();

        engine.concatenate("a", "b").unwrap();

        let total = (head.len() + tail.len()) as i64;
        let mut expected = head.clone();
        expected.extend(&tail);
        prop_assert_eq!(engine.read_range("a", 0, total - 1).unwrap(), expected);
        prop_assert!(engine.entry("b").is_err());
        prop_assert!(engine.check_consistency().is_ok());
    }
}
