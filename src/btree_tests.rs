//! Comprehensive tree tests

#[cfg(test)]
mod tests {
    use crate::key::Key;
    use crate::page::{self, Page};
    use crate::record::Record;
    use crate::PmTree;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;

    /// Max entries a leaf takes before the FAIR path splits it.
    const FAST_LIMIT: usize = page::CARDINALITY - 1;

    fn insert_all(tree: &PmTree, pairs: &[(u64, u64)]) {
        let mut ctx = tree.alloc_context();
        for &(k, v) in pairs {
            tree.insert(&mut ctx, Key::from(k), v).unwrap();
        }
    }

    fn assert_strictly_sorted(keys: &[Key]) {
        for pair in keys.windows(2) {
            assert!(pair[0] < pair[1], "out of order: {} !< {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_empty_tree() {
        let tree = PmTree::with_capacity(1 << 14);
        assert_eq!(tree.search(Key::from(42)), None);
        assert!(!tree.remove(Key::from(42)));
        assert_eq!(tree.height(), 1);
    }

    #[test]
    fn test_single_entry_lifecycle() {
        let tree = PmTree::with_capacity(1 << 14);
        let mut ctx = tree.alloc_context();

        tree.insert(&mut ctx, Key::from(7), 70).unwrap();
        assert_eq!(tree.search(Key::from(7)), Some(70));

        // Overwrite keeps only the latest value.
        tree.insert(&mut ctx, Key::from(7), 71).unwrap();
        assert_eq!(tree.search(Key::from(7)), Some(71));

        assert!(tree.remove(Key::from(7)));
        assert_eq!(tree.search(Key::from(7)), None);
    }

    #[test]
    fn test_worked_example() {
        // insert {5,1,9,3} -> {50,10,90,30}; search(3)=30; search(7)=miss;
        // remove(1); search(1)=miss; 5,9,3 survive.
        let tree = PmTree::with_capacity(1 << 14);
        insert_all(&tree, &[(5, 50), (1, 10), (9, 90), (3, 30)]);

        assert_eq!(tree.search(Key::from(3)), Some(30));
        assert_eq!(tree.search(Key::from(7)), None);

        assert!(tree.remove(Key::from(1)));
        assert_eq!(tree.search(Key::from(1)), None);

        assert_eq!(tree.search(Key::from(5)), Some(50));
        assert_eq!(tree.search(Key::from(9)), Some(90));
        assert_eq!(tree.search(Key::from(3)), Some(30));
    }

    #[test]
    fn test_smallest_key_is_insertable() {
        // Key 0 links behind the head sentinel.
        let tree = PmTree::with_capacity(1 << 14);
        insert_all(&tree, &[(3, 33), (0, 1)]);
        assert_eq!(tree.search(Key::from(0)), Some(1));
        assert_eq!(tree.list_keys(), vec![Key::from(0), Key::from(3)]);
    }

    #[test]
    fn test_remove_missing_leaves_structure_unchanged() {
        let tree = PmTree::with_capacity(1 << 14);
        insert_all(&tree, &[(2, 20), (4, 40), (6, 60)]);

        let leaves_before = tree.leaf_keys();
        let list_before = tree.list_keys();
        assert!(!tree.remove(Key::from(5)));
        assert_eq!(tree.leaf_keys(), leaves_before);
        assert_eq!(tree.list_keys(), list_before);
    }

    #[test]
    fn test_sequential_inserts_with_splits() {
        let tree = PmTree::with_capacity(1 << 16);
        let mut ctx = tree.alloc_context();

        let n = 3_000u64;
        for i in 0..n {
            tree.insert(&mut ctx, Key::from(i), i * 10).unwrap();
        }
        assert!(tree.height() > 1);

        for i in 0..n {
            assert_eq!(tree.search(Key::from(i)), Some(i * 10), "key {i}");
        }
        for i in n..n + 100 {
            assert_eq!(tree.search(Key::from(i)), None);
        }

        // In-order leaf traversal yields exactly the inserted key set.
        let leaves = tree.leaf_keys();
        assert_eq!(leaves.len(), n as usize);
        assert_strictly_sorted(&leaves);
        assert_eq!(leaves[0], Key::from(0));
        assert_eq!(leaves[n as usize - 1], Key::from(n - 1));

        // And so does the durable list.
        let list = tree.list_keys();
        assert_eq!(list, leaves);
    }

    #[test]
    fn test_random_inserts_and_removes() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(0x5eed);
        let mut keys: Vec<u64> = (0..2_000).map(|i| i * 3 + 1).collect();
        keys.shuffle(&mut rng);

        let tree = PmTree::with_capacity(1 << 16);
        let mut ctx = tree.alloc_context();
        for &k in &keys {
            tree.insert(&mut ctx, Key::from(k), k + 7).unwrap();
        }

        keys.sort_unstable();
        let expected: Vec<Key> = keys.iter().map(|&k| Key::from(k)).collect();
        assert_eq!(tree.leaf_keys(), expected);
        assert_eq!(tree.list_keys(), expected);

        // Remove every other key.
        for pair in keys.chunks(2) {
            assert!(tree.remove(Key::from(pair[0])));
        }
        for pair in keys.chunks(2) {
            assert_eq!(tree.search(Key::from(pair[0])), None);
            if let Some(&kept) = pair.get(1) {
                assert_eq!(tree.search(Key::from(kept)), Some(kept + 7));
            }
        }

        let kept: Vec<Key> =
            keys.chunks(2).filter_map(|pair| pair.get(1)).map(|&k| Key::from(k)).collect();
        assert_eq!(tree.leaf_keys(), kept);
        assert_eq!(tree.list_keys(), kept);
    }

    #[test]
    fn test_overwrite_does_not_grow_durable_list() {
        let tree = PmTree::with_capacity(1 << 14);
        let mut ctx = tree.alloc_context();

        for i in 0..50u64 {
            tree.insert(&mut ctx, Key::from(i), i).unwrap();
        }
        let before = tree.persistent_memory_used();

        for i in 0..50u64 {
            tree.insert(&mut ctx, Key::from(i), i + 1000).unwrap();
        }
        assert_eq!(tree.persistent_memory_used(), before);
        for i in 0..50u64 {
            assert_eq!(tree.search(Key::from(i)), Some(i + 1000));
        }
    }

    #[test]
    fn test_memory_accounting() {
        let record = std::mem::size_of::<Record>();
        let page = std::mem::size_of::<Page>();

        let tree = PmTree::with_capacity(1 << 14);
        // One leaf, one sentinel record.
        assert_eq!(tree.memory_used(), page);
        assert_eq!(tree.persistent_memory_used(), record);

        let mut ctx = tree.alloc_context();
        for i in 0..FAST_LIMIT as u64 {
            tree.insert(&mut ctx, Key::from(i), i).unwrap();
        }
        // Still a single leaf holding FAST_LIMIT entries.
        assert_eq!(tree.memory_used(), page);
        assert_eq!(tree.persistent_memory_used(), (FAST_LIMIT + 1) * record);

        // One more insert splits the leaf and grows a root above it.
        tree.insert(&mut ctx, Key::from(FAST_LIMIT as u64), 0).unwrap();
        assert_eq!(tree.height(), 2);
        assert_eq!(tree.memory_used(), 3 * page);
        assert_eq!(tree.persistent_memory_used(), (FAST_LIMIT + 2) * record);
    }

    #[test]
    fn test_small_slab_capacity_is_usable() {
        // A record slab smaller than one context refill chunk still serves
        // inserts up to its real capacity.
        let tree = PmTree::with_capacity(1 << 10);
        let mut ctx = tree.alloc_context();
        for k in 0..500u64 {
            tree.insert(&mut ctx, Key::from(k), k + 1).unwrap();
        }
        for k in 0..500u64 {
            assert_eq!(tree.search(Key::from(k)), Some(k + 1));
        }
    }

    #[test]
    fn test_search_never_resolves_a_shifted_neighbor() {
        // In-place inserts right-shift leaf slots. A lock-free reader that
        // matches a key mid-shift must resolve that key's own record or
        // miss, never the neighbor whose pointer previously sat in the slot.
        use std::sync::atomic::{AtomicBool, Ordering};

        for _round in 0..64 {
            let tree = PmTree::with_capacity(1 << 14);
            let done = AtomicBool::new(false);

            std::thread::scope(|scope| {
                let tree = &tree;
                let done = &done;
                scope.spawn(move || {
                    let mut ctx = tree.alloc_context();
                    // Descending evens land in slot 0; the odds then wedge
                    // between them, shifting the tail right each time.
                    let descending = (0..FAST_LIMIT as u64).rev();
                    for k in descending.clone().filter(|k| k % 2 == 0) {
                        tree.insert(&mut ctx, Key::from(k), k + 1_000).unwrap();
                    }
                    for k in descending.filter(|k| k % 2 == 1) {
                        tree.insert(&mut ctx, Key::from(k), k + 1_000).unwrap();
                    }
                    done.store(true, Ordering::Release);
                });
                for _ in 0..3 {
                    scope.spawn(move || {
                        while !done.load(Ordering::Acquire) {
                            for k in 0..FAST_LIMIT as u64 {
                                if let Some(v) = tree.search(Key::from(k)) {
                                    assert_eq!(v, k + 1_000, "key {k} resolved a neighbor");
                                }
                            }
                        }
                    });
                }
            });
        }
    }

    #[test]
    fn test_concurrent_distinct_inserts() {
        let threads = 8u64;
        let per_thread = 1_000u64;
        let tree = PmTree::with_capacity(1 << 17);

        std::thread::scope(|scope| {
            for t in 0..threads {
                let tree = &tree;
                scope.spawn(move || {
                    let mut rng = rand::rngs::StdRng::seed_from_u64(t);
                    let mut keys: Vec<u64> =
                        (0..per_thread).map(|i| i * threads + t).collect();
                    keys.shuffle(&mut rng);
                    let mut ctx = tree.alloc_context();
                    for k in keys {
                        tree.insert(&mut ctx, Key::from(k), k * 2).unwrap();
                    }
                });
            }
        });

        let n = (threads * per_thread) as usize;
        for k in 0..(threads * per_thread) {
            assert_eq!(tree.search(Key::from(k)), Some(k * 2), "key {k}");
        }

        let leaves = tree.leaf_keys();
        assert_eq!(leaves.len(), n);
        assert_strictly_sorted(&leaves);

        // End-to-end sorted, cycle-free durable list with exactly N records.
        let list = tree.list_keys();
        assert_eq!(list.len(), n);
        assert_strictly_sorted(&list);
    }

    #[test]
    fn test_concurrent_upserts_same_keys() {
        let threads = 4u64;
        let n = 512u64;
        let tree = PmTree::with_capacity(1 << 17);

        // Pre-populate so every thread overwrites the same key set.
        insert_all(&tree, &(0..n).map(|k| (k, k)).collect::<Vec<_>>());

        std::thread::scope(|scope| {
            for t in 0..threads {
                let tree = &tree;
                scope.spawn(move || {
                    let mut ctx = tree.alloc_context();
                    for k in 0..n {
                        tree.insert(&mut ctx, Key::from(k), t * 10_000 + k).unwrap();
                    }
                });
            }
        });

        let list = tree.list_keys();
        assert_eq!(list.len(), n as usize);
        assert_strictly_sorted(&list);
        for k in 0..n {
            let v = tree.search(Key::from(k)).unwrap();
            assert!(
                (0..threads).any(|t| v == t * 10_000 + k),
                "key {k} holds foreign value {v}"
            );
        }
    }

    #[test]
    fn test_concurrent_removes() {
        let n = 4_000u64;
        let threads = 4u64;
        let tree = PmTree::with_capacity(1 << 17);
        insert_all(&tree, &(0..n).map(|k| (k, k + 1)).collect::<Vec<_>>());

        // Each thread removes a strided quarter of the even keys.
        std::thread::scope(|scope| {
            for t in 0..threads {
                let tree = &tree;
                scope.spawn(move || {
                    let mut k = t * 2;
                    while k < n {
                        assert!(tree.remove(Key::from(k)), "remove {k}");
                        k += threads * 2;
                    }
                });
            }
        });

        for k in (0..n).step_by(2) {
            assert_eq!(tree.search(Key::from(k)), None, "removed key {k} resurfaced");
        }
        for k in (1..n).step_by(2) {
            assert_eq!(tree.search(Key::from(k)), Some(k + 1), "kept key {k} lost");
        }

        // Every removed even key has an odd neighbor that stays put, so no
        // two removals ever contend on the same predecessor cell and the
        // durable list ends exactly at the kept set.
        let expected: Vec<Key> = (1..n).step_by(2).map(Key::from).collect();
        assert_eq!(tree.leaf_keys(), expected);
        assert_eq!(tree.list_keys(), expected);
    }

    #[test]
    fn test_concurrent_mixed_readers_and_writers() {
        let n = 2_000u64;
        let tree = PmTree::with_capacity(1 << 17);
        insert_all(&tree, &(0..n).map(|k| (k, k)).collect::<Vec<_>>());

        std::thread::scope(|scope| {
            // Writers append a fresh key range.
            for t in 0..2u64 {
                let tree = &tree;
                scope.spawn(move || {
                    let mut ctx = tree.alloc_context();
                    for i in 0..n {
                        let k = n + i * 2 + t;
                        tree.insert(&mut ctx, Key::from(k), k).unwrap();
                    }
                });
            }
            // Readers hammer the stable range; lock-free reads must always
            // see consistent values.
            for _ in 0..4 {
                let tree = &tree;
                scope.spawn(move || {
                    for round in 0..4u64 {
                        for k in 0..n {
                            assert_eq!(
                                tree.search(Key::from(k)),
                                Some(k),
                                "round {round}: stable key {k}"
                            );
                        }
                    }
                });
            }
        });

        for k in 0..3 * n {
            assert_eq!(tree.search(Key::from(k)), Some(k));
        }
        assert_strictly_sorted(&tree.list_keys());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;
        use std::collections::BTreeMap;

        #[derive(Debug, Clone)]
        enum Op {
            Insert(u16, u64),
            Remove(u16),
            Search(u16),
        }

        fn op_strategy() -> impl Strategy<Value = Op> {
            prop_oneof![
                (any::<u16>(), any::<u64>()).prop_map(|(k, v)| Op::Insert(k, v)),
                any::<u16>().prop_map(Op::Remove),
                any::<u16>().prop_map(Op::Search),
            ]
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(64))]

            #[test]
            fn matches_btreemap_model(ops in proptest::collection::vec(op_strategy(), 1..400)) {
                let tree = PmTree::with_capacity(1 << 16);
                let mut ctx = tree.alloc_context();
                let mut model = BTreeMap::new();

                for op in ops {
                    match op {
                        Op::Insert(k, v) => {
                            tree.insert(&mut ctx, Key::from(u64::from(k)), v).unwrap();
                            model.insert(k, v);
                        }
                        Op::Remove(k) => {
                            let removed = tree.remove(Key::from(u64::from(k)));
                            prop_assert_eq!(removed, model.remove(&k).is_some());
                        }
                        Op::Search(k) => {
                            prop_assert_eq!(
                                tree.search(Key::from(u64::from(k))),
                                model.get(&k).copied()
                            );
                        }
                    }
                }

                let expected: Vec<Key> =
                    model.keys().map(|&k| Key::from(u64::from(k))).collect();
                prop_assert_eq!(tree.leaf_keys(), expected.clone());
                prop_assert_eq!(tree.list_keys(), expected);
            }
        }
    }
}
