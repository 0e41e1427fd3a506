//! Snapshot validation and codec round-trip tests.

#[cfg(test)]
mod tests {
    use crate::encoding::{decode_from_slice, encode_to_vec};
    use crate::metadata::{
        BlockMetadataEntry, BlockRangeIndexMetadata, BlockStartKey, MetadataError,
    };

    fn entry(start_key: BlockStartKey<i64>, page_id: u64) -> BlockMetadataEntry<i64> {
        BlockMetadataEntry {
            start_key,
            size: 100,
            page_id,
        }
    }

    #[test]
    fn empty_snapshot_is_valid() {
        let metadata = BlockRangeIndexMetadata::<i64>::empty();
        assert!(metadata.is_empty());
        metadata.validate().unwrap();
    }

    #[test]
    fn ordered_snapshot_accepted() {
        let metadata = BlockRangeIndexMetadata::new(vec![
            entry(BlockStartKey::Head, 1),
            entry(BlockStartKey::Key(10), 2),
            entry(BlockStartKey::Key(20), 3),
        ]);
        metadata.validate().unwrap();
        assert_eq!(metadata.len(), 3);
    }

    #[test]
    fn missing_head_rejected() {
        let metadata = BlockRangeIndexMetadata::new(vec![
            entry(BlockStartKey::Key(10), 1),
            entry(BlockStartKey::Key(20), 2),
        ]);
        assert!(matches!(
            metadata.validate().unwrap_err(),
            MetadataError::MissingHead
        ));
    }

    #[test]
    fn duplicate_head_rejected() {
        let metadata = BlockRangeIndexMetadata::new(vec![
            entry(BlockStartKey::Head, 1),
            entry(BlockStartKey::Head, 2),
        ]);
        assert!(matches!(
            metadata.validate().unwrap_err(),
            MetadataError::UnorderedBoundaries(1)
        ));
    }

    #[test]
    fn unordered_boundaries_rejected_with_position() {
        let metadata = BlockRangeIndexMetadata::new(vec![
            entry(BlockStartKey::Head, 1),
            entry(BlockStartKey::Key(10), 2),
            entry(BlockStartKey::Key(10), 3),
            entry(BlockStartKey::Key(30), 4),
        ]);
        assert!(matches!(
            metadata.validate().unwrap_err(),
            MetadataError::UnorderedBoundaries(2)
        ));
    }

    #[test]
    fn head_sorts_before_every_key() {
        assert!(BlockStartKey::<i64>::Head < BlockStartKey::Key(i64::MIN));
        assert!(BlockStartKey::Key(1) < BlockStartKey::Key(2));
        assert_eq!(BlockStartKey::<i64>::Head, BlockStartKey::Head);
    }

    #[test]
    fn snapshot_round_trips_through_codec() {
        let metadata = BlockRangeIndexMetadata::new(vec![
            entry(BlockStartKey::Head, 7),
            entry(BlockStartKey::Key(-5), 8),
            entry(BlockStartKey::Key(1000), 9),
        ]);

        let bytes = encode_to_vec(&metadata).unwrap();
        let (decoded, consumed) =
            decode_from_slice::<BlockRangeIndexMetadata<i64>>(&bytes).unwrap();

        assert_eq!(decoded, metadata);
        assert_eq!(consumed, bytes.len());
        decoded.validate().unwrap();
    }

    #[test]
    fn string_keyed_snapshot_round_trips() {
        let metadata = BlockRangeIndexMetadata::new(vec![
            entry_string(BlockStartKey::Head, 1),
            entry_string(BlockStartKey::Key("m".to_string()), 2),
        ]);
        let bytes = encode_to_vec(&metadata).unwrap();
        let (decoded, _) = decode_from_slice::<BlockRangeIndexMetadata<String>>(&bytes).unwrap();
        assert_eq!(decoded, metadata);
    }

    fn entry_string(start_key: BlockStartKey<String>, page_id: u64) -> BlockMetadataEntry<String> {
        BlockMetadataEntry {
            start_key,
            size: 10,
            page_id,
        }
    }
}
