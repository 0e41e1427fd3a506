//! # brindex
//!
//! An embeddable **block range index** (BRIN): ordered keys map to values
//! through a dynamically-partitioned sequence of fixed-capacity pages
//! ("blocks"), each independently loadable and unloadable from a backing
//! store under a pluggable page-replacement policy, with crash-consistent
//! checkpointing to durable metadata.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use brindex::{
//!     BlockRangeIndex, BlockRangeIndexMetadata, IndexConfig, MemoryPageStore,
//!     RandomPageReplacementPolicy,
//! };
//!
//! let store = Arc::new(MemoryPageStore::new());
//! let policy = Arc::new(RandomPageReplacementPolicy::new(8));
//! let index: BlockRangeIndex<i64, String> =
//!     BlockRangeIndex::new(IndexConfig::default(), store, policy).unwrap();
//!
//! // A fresh index boots from the empty snapshot.
//! index.boot(BlockRangeIndexMetadata::empty()).unwrap();
//!
//! // Write — immediately visible to any thread.
//! index.put(1, "one".to_string()).unwrap();
//! assert_eq!(index.search(&1).unwrap(), vec!["one".to_string()]);
//!
//! // Range lookup, inclusive on both ends.
//! index.put(2, "two".to_string()).unwrap();
//! assert_eq!(index.search_range(&1, &2).unwrap().len(), 2);
//!
//! // Checkpoint flushes dirty blocks and snapshots the directory; a new
//! // instance boots from the snapshot without loading any contents.
//! let metadata = index.checkpoint().unwrap();
//! ```
//!
//! ## Features
//!
//! - **Lock-free-reader-friendly directory** — predecessor lookups resolve
//!   against an atomically-updated ordered directory; splits publish in a
//!   single step, and readers never observe a torn partition.
//! - **Per-block locking** — operations on different blocks run fully in
//!   parallel; a split touches only the block being split and the one being
//!   created.
//! - **Lazy paging** — blocks materialize from the page store on first
//!   access and can be shed again by the replacement policy once clean.
//! - **Pluggable eviction** — random (reference) and LRU policies ship with
//!   the crate; any [`PageReplacementPolicy`] is interchangeable.
//! - **Crash-consistent checkpoints** — dirty blocks flush to checksummed
//!   pages; the returned metadata snapshot round-trips through `boot`
//!   exactly.

pub mod block;
pub mod encoding;
pub mod index;
pub mod metadata;
pub mod policy;
pub mod store;

use encoding::{Decode, Encode};

pub use block::{Block, BlockState};
pub use index::{BlockRangeIndex, IndexError};
pub use metadata::{BlockMetadataEntry, BlockRangeIndexMetadata, BlockStartKey, MetadataError};
pub use policy::{
    LruPageReplacementPolicy, PageReplacementPolicy, RandomPageReplacementPolicy, ResidentPage,
};
pub use store::{FilePageStore, MemoryPageStore, PageId, PageStore, PageStoreError};

// ------------------------------------------------------------------------------------------------
// Size-aware contract
// ------------------------------------------------------------------------------------------------

/// Capability required of every key and value type: an estimated in-memory
/// byte footprint, used for block capacity accounting and split decisions.
///
/// Estimates do not need to be exact — only stable for a given value, so
/// the running size of a block is consistent across insert and remove.
pub trait SizeAware {
    /// Estimated in-memory footprint of this value, in bytes.
    fn estimated_size(&self) -> u64;
}

macro_rules! impl_size_aware_fixed {
    ($($ty:ty),*) => {
        $(
            impl SizeAware for $ty {
                fn estimated_size(&self) -> u64 {
                    std::mem::size_of::<$ty>() as u64
                }
            }
        )*
    };
}

impl_size_aware_fixed!(u32, u64, i32, i64);

impl SizeAware for String {
    fn estimated_size(&self) -> u64 {
        (std::mem::size_of::<String>() + self.len()) as u64
    }
}

impl SizeAware for Vec<u8> {
    fn estimated_size(&self) -> u64 {
        (std::mem::size_of::<Vec<u8>>() + self.len()) as u64
    }
}

// ------------------------------------------------------------------------------------------------
// Key / value bounds
// ------------------------------------------------------------------------------------------------

/// Everything an index key must provide: total ordering, cloning, size
/// estimation, the persistence codec, and thread-safety. Blanket-implemented
/// for any qualifying type.
pub trait IndexKey: Ord + Clone + SizeAware + Encode + Decode + Send + Sync + 'static {}

impl<T> IndexKey for T where T: Ord + Clone + SizeAware + Encode + Decode + Send + Sync + 'static {}

/// Everything an index value must provide. Equality is needed so `delete`
/// can remove one exact `(key, value)` pair.
pub trait IndexValue:
    Clone + PartialEq + SizeAware + Encode + Decode + Send + Sync + 'static
{
}

impl<T> IndexValue for T where
    T: Clone + PartialEq + SizeAware + Encode + Decode + Send + Sync + 'static
{
}

// ------------------------------------------------------------------------------------------------
// Configuration
// ------------------------------------------------------------------------------------------------

/// Minimum accepted block capacity; anything smaller degenerates into a
/// split per insert.
const MIN_BLOCK_SIZE: u64 = 64;

/// Configuration for a [`BlockRangeIndex`] instance.
///
/// Validated by [`BlockRangeIndex::new`].
///
/// # Example
///
/// ```rust
/// use brindex::IndexConfig;
///
/// // Use the default 64 KiB block capacity.
/// let config = IndexConfig::default();
///
/// // Or customize.
/// let config = IndexConfig {
///     max_block_size: 1024,
/// };
/// ```
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Maximum size estimate a block may reach before the `put` that
    /// exceeded it splits the block, in the units reported by
    /// [`SizeAware::estimated_size`].
    ///
    /// Default: 64 KiB. Must be ≥ 64.
    pub max_block_size: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            max_block_size: 64 * 1024,
        }
    }
}

impl IndexConfig {
    /// Validates all configuration parameters.
    pub(crate) fn validate(&self) -> Result<(), IndexError> {
        if self.max_block_size < MIN_BLOCK_SIZE {
            return Err(IndexError::InvalidConfig(format!(
                "max_block_size must be >= {MIN_BLOCK_SIZE}"
            )));
        }
        Ok(())
    }
}
