//! # Block
//!
//! A [`Block`] owns one contiguous partition of the key space: a sorted
//! multimap of entries plus the bookkeeping needed to move the partition in
//! and out of memory. Every block guards its contents with its own
//! exclusive lock; the directory in
//! [`BlockRangeIndex`](crate::index::BlockRangeIndex) orchestrates which
//! block an operation targets, but all mutation happens here, under the
//! block lock.
//!
//! ## Load states
//!
//! ```text
//! Unloaded ──load──▶ Clean ──mutation──▶ Dirty
//!     ▲                │ ▲                 │
//!     └────unload──────┘ └─────flush───────┘
//! ```
//!
//! A block boots `Unloaded` when it has a backing page, or `Dirty` with
//! empty contents when it is brand new (no checkpoint has seen it yet).
//! Unloading is only legal from `Clean`: the in-memory contents are
//! discarded but stay recoverable through the backing page identifier.
//!
//! Loading happens under the block lock, so a concurrent thread either
//! waits out the fetch or sees a fully-loaded block — never a partial one.

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use tracing::trace;

use crate::encoding::{self, Decode, Encode, EncodingError};
use crate::index::IndexError;
use crate::metadata::BlockStartKey;
use crate::policy::ResidentPage;
use crate::store::{PageId, PageStore};
use crate::{IndexKey, IndexValue, SizeAware};

/// Fixed per-entry overhead charged on top of the key and value footprints,
/// covering tree-node and vector bookkeeping.
pub(crate) const ENTRY_OVERHEAD: u64 = 48;

// ------------------------------------------------------------------------------------------------
// Load state
// ------------------------------------------------------------------------------------------------

/// Residency of a block's contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    /// Contents not in memory; recoverable via the backing page.
    Unloaded,
    /// Contents in memory and identical to the backing page.
    Clean,
    /// Contents in memory with unflushed modifications.
    Dirty,
}

// ------------------------------------------------------------------------------------------------
// Block
// ------------------------------------------------------------------------------------------------

/// One page-sized partition of the key range.
pub struct Block<K, V> {
    /// Stable identity of this in-memory block instance; survives
    /// unload/reload, distinct from the backing [`PageId`].
    id: u64,
    /// Lower bound of the owned key range. Immutable for the block's
    /// lifetime; the upper bound lives in [`BlockInner`] because splits
    /// shrink it.
    start: BlockStartKey<K>,
    inner: Mutex<BlockInner<K, V>>,
}

/// Lock-guarded block state.
pub(crate) struct BlockInner<K, V> {
    pub(crate) state: BlockState,
    pub(crate) entries: BTreeMap<K, Vec<V>>,
    /// Running estimate of the in-memory footprint of `entries`.
    pub(crate) size: u64,
    pub(crate) page_id: Option<PageId>,
    /// Exclusive upper bound of the owned range; `None` for the last block.
    /// Only ever shrinks (splits move the tail to a new block).
    pub(crate) upper_bound: Option<K>,
}

impl<K: IndexKey, V: IndexValue> BlockInner<K, V> {
    /// Whether `key` still falls inside this block's range. The lower bound
    /// is guaranteed by the directory's predecessor lookup; only the upper
    /// bound can have moved since.
    pub(crate) fn owns(&self, key: &K) -> bool {
        self.upper_bound.as_ref().is_none_or(|ub| key < ub)
    }

    /// Inserts an entry, updating the size estimate and dirtying the block.
    pub(crate) fn insert_entry(&mut self, key: K, value: V) {
        self.size += entry_size(&key, &value);
        self.entries.entry(key).or_default().push(value);
        self.state = BlockState::Dirty;
    }

    /// Removes one exact `(key, value)` pair if present. Absence is a
    /// no-op, not an error.
    pub(crate) fn remove_entry(&mut self, key: &K, value: &V) -> bool {
        let Some(values) = self.entries.get_mut(key) else {
            return false;
        };
        let Some(pos) = values.iter().position(|v| v == value) else {
            return false;
        };
        values.remove(pos);
        if values.is_empty() {
            self.entries.remove(key);
        }
        self.size = self.size.saturating_sub(entry_size(key, value));
        self.state = BlockState::Dirty;
        true
    }

    /// Chooses the first key of the upper half for a split: the first
    /// distinct key at which the accumulated size of everything before it
    /// reaches half the block estimate, falling back to the last distinct
    /// key. Values of one key always travel together, so a block holding a
    /// single distinct key cannot split (`None`).
    pub(crate) fn split_point(&self) -> Option<K> {
        let half = self.size / 2;
        let mut acc = 0u64;
        let mut fallback = None;
        for (i, (key, values)) in self.entries.iter().enumerate() {
            if i > 0 {
                if acc >= half {
                    return Some(key.clone());
                }
                fallback = Some(key);
            }
            acc += values
                .iter()
                .map(|v| entry_size(key, v))
                .sum::<u64>();
        }
        fallback.cloned()
    }

    /// Detaches all entries at and above `split_key`, returning them with
    /// their accumulated size, which is subtracted from this block.
    pub(crate) fn detach_tail(&mut self, split_key: &K) -> (BTreeMap<K, Vec<V>>, u64) {
        let tail = self.entries.split_off(split_key);
        let moved: u64 = tail
            .iter()
            .map(|(k, vs)| vs.iter().map(|v| entry_size(k, v)).sum::<u64>())
            .sum();
        self.size = self.size.saturating_sub(moved);
        (tail, moved)
    }
}

/// Estimated footprint of one entry.
fn entry_size<K: SizeAware, V: SizeAware>(key: &K, value: &V) -> u64 {
    key.estimated_size() + value.estimated_size() + ENTRY_OVERHEAD
}

impl<K: IndexKey, V: IndexValue> Block<K, V> {
    /// A brand-new HEAD block for an empty index: loaded, dirty, empty,
    /// with no backing page yet.
    pub(crate) fn new_head(id: u64) -> Self {
        Self {
            id,
            start: BlockStartKey::Head,
            inner: Mutex::new(BlockInner {
                state: BlockState::Dirty,
                entries: BTreeMap::new(),
                size: 0,
                page_id: None,
                upper_bound: None,
            }),
        }
    }

    /// A block reconstructed from a metadata snapshot: unloaded, carrying
    /// only its range, size estimate, and backing page.
    pub(crate) fn from_metadata(
        id: u64,
        start: BlockStartKey<K>,
        size: u64,
        page_id: PageId,
        upper_bound: Option<K>,
    ) -> Self {
        Self {
            id,
            start,
            inner: Mutex::new(BlockInner {
                state: BlockState::Unloaded,
                entries: BTreeMap::new(),
                size,
                page_id: Some(page_id),
                upper_bound,
            }),
        }
    }

    /// The upper half produced by a split: loaded and dirty, inheriting the
    /// parent's old upper bound, with no backing page yet.
    pub(crate) fn from_split(
        id: u64,
        start: K,
        entries: BTreeMap<K, Vec<V>>,
        size: u64,
        upper_bound: Option<K>,
    ) -> Self {
        Self {
            id,
            start: BlockStartKey::Key(start),
            inner: Mutex::new(BlockInner {
                state: BlockState::Dirty,
                entries,
                size,
                page_id: None,
                upper_bound,
            }),
        }
    }

    /// Acquires this block's exclusive lock.
    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, BlockInner<K, V>>, IndexError> {
        self.inner
            .lock()
            .map_err(|_| IndexError::Internal("block lock poisoned".into()))
    }

    /// Fetches contents from the page store if unloaded. Returns `true`
    /// when a fetch actually happened. Runs under the caller-held lock, so
    /// the load is atomic from the outside.
    pub(crate) fn load_locked(
        &self,
        inner: &mut BlockInner<K, V>,
        store: &dyn PageStore,
    ) -> Result<bool, IndexError> {
        if inner.state != BlockState::Unloaded {
            return Ok(false);
        }
        let Some(page_id) = inner.page_id else {
            return Err(IndexError::Invariant(format!(
                "unloaded block {} has no backing page",
                self.id
            )));
        };
        let raw = store.load_page(page_id)?;
        let entries = decode_entries::<K, V>(&raw)?;
        inner.size = entries
            .iter()
            .map(|(k, vs)| vs.iter().map(|v| entry_size(k, v)).sum::<u64>())
            .sum();
        inner.entries = entries;
        inner.state = BlockState::Clean;
        trace!(block = self.id, page_id, "block loaded");
        Ok(true)
    }

    /// Persists dirty contents to the page store, creating or overwriting
    /// the backing page, and marks the block clean. Returns `true` when a
    /// write actually happened.
    pub(crate) fn flush_locked(
        &self,
        inner: &mut BlockInner<K, V>,
        store: &dyn PageStore,
    ) -> Result<bool, IndexError> {
        if inner.state != BlockState::Dirty {
            return Ok(false);
        }
        let raw = encode_entries(&inner.entries)?;
        let page_id = store.save_page(inner.page_id, &raw)?;
        inner.page_id = Some(page_id);
        inner.state = BlockState::Clean;
        trace!(block = self.id, page_id, bytes = raw.len(), "block flushed");
        Ok(true)
    }

    /// Forces this block's contents into memory.
    ///
    /// Diagnostic entry point used by invariant checkers; the index's
    /// operations load lazily on their own and also notify the replacement
    /// policy, which this method does not.
    pub fn ensure_loaded(&self, store: &dyn PageStore) -> Result<(), IndexError> {
        let mut inner = self.lock()?;
        self.load_locked(&mut inner, store)?;
        Ok(())
    }

    // --------------------------------------------------------------------------------------------
    // Diagnostics
    // --------------------------------------------------------------------------------------------

    /// Lower bound of the owned key range.
    pub fn start_key(&self) -> &BlockStartKey<K> {
        &self.start
    }

    /// Current load state.
    pub fn state(&self) -> BlockState {
        self.lock()
            .map(|inner| inner.state)
            .unwrap_or(BlockState::Unloaded)
    }

    /// Whether contents are currently in memory.
    pub fn is_loaded(&self) -> bool {
        self.state() != BlockState::Unloaded
    }

    /// Whether contents differ from the backing page.
    pub fn is_dirty(&self) -> bool {
        self.state() == BlockState::Dirty
    }

    /// Current size estimate (meaningful even while unloaded).
    pub fn size_estimate(&self) -> u64 {
        self.lock().map(|inner| inner.size).unwrap_or(0)
    }

    /// Copy of the loaded entries in key order; empty while unloaded.
    pub fn entry_snapshot(&self) -> Result<Vec<(K, Vec<V>)>, IndexError> {
        let inner = self.lock()?;
        Ok(inner
            .entries
            .iter()
            .map(|(k, vs)| (k.clone(), vs.clone()))
            .collect())
    }
}

// ------------------------------------------------------------------------------------------------
// Replacement-policy view
// ------------------------------------------------------------------------------------------------

impl<K: IndexKey, V: IndexValue> ResidentPage for Block<K, V> {
    fn page_key(&self) -> u64 {
        self.id
    }

    fn try_unload(&self) -> bool {
        let Ok(mut inner) = self.inner.try_lock() else {
            return false;
        };
        match inner.state {
            BlockState::Unloaded => true,
            BlockState::Dirty => false,
            BlockState::Clean => {
                inner.entries.clear();
                inner.state = BlockState::Unloaded;
                trace!(block = self.id, "block unloaded");
                true
            }
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Page payload codec
// ------------------------------------------------------------------------------------------------

/// Serializes a block's entries as
/// `[u32 key_count]` then per key `K [u32 value_count] V…`.
fn encode_entries<K: Encode, V: Encode>(
    entries: &BTreeMap<K, Vec<V>>,
) -> Result<Vec<u8>, EncodingError> {
    let mut buf = Vec::new();
    let count = u32::try_from(entries.len())
        .map_err(|_| EncodingError::LengthOverflow("too many keys in block".into()))?;
    count.encode_to(&mut buf)?;
    for (key, values) in entries {
        key.encode_to(&mut buf)?;
        encoding::encode_seq(values, &mut buf)?;
    }
    Ok(buf)
}

fn decode_entries<K: Decode + Ord, V: Decode>(
    raw: &[u8],
) -> Result<BTreeMap<K, Vec<V>>, EncodingError> {
    let mut offset = 0;
    let (count, n) = u32::decode_from(raw)?;
    offset += n;
    let mut entries = BTreeMap::new();
    for _ in 0..count {
        let (key, n) = K::decode_from(&raw[offset..])?;
        offset += n;
        let (values, n) = encoding::decode_seq::<V>(&raw[offset..])?;
        offset += n;
        entries.insert(key, values);
    }
    Ok(entries)
}
