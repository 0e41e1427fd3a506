//! # Durable directory snapshots
//!
//! A [`BlockRangeIndexMetadata`] captures the *shape* of an index directory
//! — the ordered block boundaries, their size estimates, and their backing
//! page identifiers — without any block contents. It is produced only by
//! `checkpoint()` and consumed only by `boot()`, and is immutable once
//! constructed.
//!
//! Validation (HEAD sentinel first, strictly increasing boundaries) happens
//! at boot time, so a snapshot read from untrusted storage cannot install a
//! broken directory.
//!
//! Snapshots implement [`Encode`]/[`Decode`] so embedders can persist them
//! durably and hand them back on restart; the round-trip is exact.

#[cfg(test)]
mod tests;

use std::cmp::Ordering;

use thiserror::Error;

use crate::encoding::{self, Decode, Encode, EncodingError};
use crate::store::PageId;

// ------------------------------------------------------------------------------------------------
// Error type
// ------------------------------------------------------------------------------------------------

/// Rejection reasons for a malformed metadata snapshot.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// A non-empty snapshot whose first entry is not the HEAD sentinel.
    #[error("first metadata entry must be the head block")]
    MissingHead,

    /// Boundary list is not strictly increasing at the given position.
    #[error("metadata boundaries not strictly increasing at entry {0}")]
    UnorderedBoundaries(usize),
}

// ------------------------------------------------------------------------------------------------
// Block start key
// ------------------------------------------------------------------------------------------------

/// Ordering key of the block directory.
///
/// `Head` is the sentinel lower bound (−∞); exactly one HEAD entry exists
/// in any booted directory and it sorts before every concrete key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockStartKey<K> {
    /// Sentinel for the first block; covers everything below the second
    /// block's start key.
    Head,
    /// Minimum key owned by the block.
    Key(K),
}

impl<K> BlockStartKey<K> {
    /// The concrete key, if this is not the HEAD sentinel.
    pub fn as_key(&self) -> Option<&K> {
        match self {
            BlockStartKey::Head => None,
            BlockStartKey::Key(k) => Some(k),
        }
    }
}

impl<K: Ord> PartialOrd for BlockStartKey<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K: Ord> Ord for BlockStartKey<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (BlockStartKey::Head, BlockStartKey::Head) => Ordering::Equal,
            (BlockStartKey::Head, BlockStartKey::Key(_)) => Ordering::Less,
            (BlockStartKey::Key(_), BlockStartKey::Head) => Ordering::Greater,
            (BlockStartKey::Key(a), BlockStartKey::Key(b)) => a.cmp(b),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Snapshot structures
// ------------------------------------------------------------------------------------------------

/// One directory entry in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockMetadataEntry<K> {
    /// Lower bound of the block's key range.
    pub start_key: BlockStartKey<K>,
    /// Size estimate of the block's entries at checkpoint time.
    pub size: u64,
    /// Backing page holding the block's flushed contents.
    pub page_id: PageId,
}

/// Immutable snapshot of an index directory's shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRangeIndexMetadata<K> {
    entries: Vec<BlockMetadataEntry<K>>,
}

impl<K> BlockRangeIndexMetadata<K> {
    /// Snapshot of an empty index: boot installs a single empty HEAD block.
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Wraps an ordered entry list produced by checkpoint.
    pub(crate) fn new(entries: Vec<BlockMetadataEntry<K>>) -> Self {
        Self { entries }
    }

    /// Number of blocks described by the snapshot.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` for the snapshot of an empty index.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The described directory entries, in boundary order.
    pub fn entries(&self) -> &[BlockMetadataEntry<K>] {
        &self.entries
    }

    pub(crate) fn into_entries(self) -> Vec<BlockMetadataEntry<K>> {
        self.entries
    }
}

impl<K: Ord> BlockRangeIndexMetadata<K> {
    /// Checks the boot-time invariants: HEAD sentinel first, strictly
    /// increasing boundaries. An empty snapshot is trivially valid.
    pub fn validate(&self) -> Result<(), MetadataError> {
        let Some(first) = self.entries.first() else {
            return Ok(());
        };
        if first.start_key != BlockStartKey::Head {
            return Err(MetadataError::MissingHead);
        }
        for (i, pair) in self.entries.windows(2).enumerate() {
            if pair[0].start_key >= pair[1].start_key {
                return Err(MetadataError::UnorderedBoundaries(i + 1));
            }
        }
        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// Encoding implementations
// ------------------------------------------------------------------------------------------------

impl<K: Encode> Encode for BlockStartKey<K> {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        match self {
            BlockStartKey::Head => 0u32.encode_to(buf),
            BlockStartKey::Key(k) => {
                1u32.encode_to(buf)?;
                k.encode_to(buf)
            }
        }
    }
}

impl<K: Decode> Decode for BlockStartKey<K> {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut offset = 0;
        let (tag, n) = u32::decode_from(buf)?;
        offset += n;
        match tag {
            0 => Ok((BlockStartKey::Head, offset)),
            1 => {
                let (k, n) = K::decode_from(&buf[offset..])?;
                offset += n;
                Ok((BlockStartKey::Key(k), offset))
            }
            _ => Err(EncodingError::InvalidTag {
                tag,
                type_name: "BlockStartKey",
            }),
        }
    }
}

impl<K: Encode> Encode for BlockMetadataEntry<K> {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.start_key.encode_to(buf)?;
        self.size.encode_to(buf)?;
        self.page_id.encode_to(buf)?;
        Ok(())
    }
}

impl<K: Decode> Decode for BlockMetadataEntry<K> {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut offset = 0;
        let (start_key, n) = BlockStartKey::decode_from(buf)?;
        offset += n;
        let (size, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        let (page_id, n) = PageId::decode_from(&buf[offset..])?;
        offset += n;
        Ok((
            Self {
                start_key,
                size,
                page_id,
            },
            offset,
        ))
    }
}

impl<K: Encode> Encode for BlockRangeIndexMetadata<K> {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        encoding::encode_seq(&self.entries, buf)
    }
}

impl<K: Decode> Decode for BlockRangeIndexMetadata<K> {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let (entries, consumed) = encoding::decode_seq(buf)?;
        Ok((Self { entries }, consumed))
    }
}
