//! Single-block behavior through the index API: read-your-write, absent
//! keys, idempotent deletes, duplicate keys, range bounds.

#[cfg(test)]
mod tests {
    use super::super::helpers::{booted_index, val};
    use crate::IndexConfig;
    use crate::index::{BlockRangeIndex, IndexError};
    use crate::metadata::BlockRangeIndexMetadata;
    use crate::policy::RandomPageReplacementPolicy;
    use crate::store::MemoryPageStore;
    use std::sync::Arc;

    #[test]
    fn put_then_search_returns_value() {
        let index = booted_index(64 * 1024, 8);
        index.put(1, val(1)).unwrap();
        assert_eq!(index.search(&1).unwrap(), vec![val(1)]);
        assert!(index.contains_key(&1).unwrap());
    }

    #[test]
    fn search_absent_key_is_empty_not_error() {
        let index = booted_index(64 * 1024, 8);
        index.put(1, val(1)).unwrap();
        assert!(index.search(&2).unwrap().is_empty());
        assert!(!index.contains_key(&2).unwrap());
    }

    #[test]
    fn duplicate_keys_accumulate_values() {
        let index = booted_index(64 * 1024, 8);
        index.put(5, "x".to_string()).unwrap();
        index.put(5, "y".to_string()).unwrap();
        index.put(5, "x".to_string()).unwrap();

        let found = index.search(&5).unwrap();
        assert_eq!(found.len(), 3);
        assert_eq!(found.iter().filter(|v| *v == "x").count(), 2);
    }

    #[test]
    fn delete_removes_one_exact_pair() {
        let index = booted_index(64 * 1024, 8);
        index.put(5, "x".to_string()).unwrap();
        index.put(5, "y".to_string()).unwrap();

        assert!(index.delete(&5, &"x".to_string()).unwrap());
        assert_eq!(index.search(&5).unwrap(), vec!["y".to_string()]);
    }

    #[test]
    fn delete_absent_pair_is_idempotent_noop() {
        let index = booted_index(64 * 1024, 8);
        index.put(1, val(1)).unwrap();

        assert!(!index.delete(&1, &"other".to_string()).unwrap());
        assert!(!index.delete(&99, &val(99)).unwrap());
        // Deleting twice: second call is a no-op too.
        assert!(index.delete(&1, &val(1)).unwrap());
        assert!(!index.delete(&1, &val(1)).unwrap());
        assert!(!index.contains_key(&1).unwrap());
    }

    #[test]
    fn range_search_is_inclusive_both_ends() {
        let index = booted_index(64 * 1024, 8);
        for i in 0..10 {
            index.put(i, val(i)).unwrap();
        }
        let found = index.search_range(&3, &6).unwrap();
        assert_eq!(found, vec![val(3), val(4), val(5), val(6)]);
    }

    #[test]
    fn range_search_inverted_bounds_is_empty() {
        let index = booted_index(64 * 1024, 8);
        index.put(1, val(1)).unwrap();
        assert!(index.search_range(&5, &1).unwrap().is_empty());
    }

    #[test]
    fn range_search_returns_ascending_key_order() {
        let index = booted_index(64 * 1024, 8);
        for i in (0..20).rev() {
            index.put(i, val(i)).unwrap();
        }
        let found = index.search_range(&0, &19).unwrap();
        let expected: Vec<_> = (0..20).map(val).collect();
        assert_eq!(found, expected);
    }

    #[test]
    fn negative_keys_resolve_through_head_block() {
        let index = booted_index(64 * 1024, 8);
        index.put(-100, val(-100)).unwrap();
        index.put(100, val(100)).unwrap();
        assert_eq!(index.search(&-100).unwrap(), vec![val(-100)]);
        assert_eq!(
            index.search_range(&i64::MIN, &i64::MAX).unwrap(),
            vec![val(-100), val(100)]
        );
    }

    #[test]
    fn fresh_boot_installs_single_head_block() {
        let index = booted_index(64 * 1024, 8);
        let blocks = index.blocks().unwrap();
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].start_key().as_key().is_none());
    }

    #[test]
    fn operations_before_boot_are_rejected() {
        let index: BlockRangeIndex<i64, String> = BlockRangeIndex::new(
            IndexConfig::default(),
            Arc::new(MemoryPageStore::new()),
            Arc::new(RandomPageReplacementPolicy::new(8)),
        )
        .unwrap();

        assert!(matches!(
            index.put(1, val(1)),
            Err(IndexError::Invariant(_))
        ));
        assert!(matches!(index.search(&1), Err(IndexError::Invariant(_))));
    }

    #[test]
    fn invalid_config_rejected() {
        let result: Result<BlockRangeIndex<i64, String>, _> = BlockRangeIndex::new(
            IndexConfig { max_block_size: 1 },
            Arc::new(MemoryPageStore::new()),
            Arc::new(RandomPageReplacementPolicy::new(8)),
        );
        assert!(matches!(result, Err(IndexError::InvalidConfig(_))));
    }

    #[test]
    fn boot_rejects_unordered_snapshot() {
        use crate::metadata::{BlockMetadataEntry, BlockStartKey};

        let index = booted_index(64 * 1024, 8);
        let bad = BlockRangeIndexMetadata::new(vec![
            BlockMetadataEntry {
                start_key: BlockStartKey::Head,
                size: 0,
                page_id: 1,
            },
            BlockMetadataEntry {
                start_key: BlockStartKey::Key(10),
                size: 0,
                page_id: 2,
            },
            BlockMetadataEntry {
                start_key: BlockStartKey::Key(5),
                size: 0,
                page_id: 3,
            },
        ]);
        assert!(matches!(index.boot(bad), Err(IndexError::Boot(_))));
    }
}
