//! # Block range index
//!
//! The [`BlockRangeIndex`] maintains the ordered block directory and serves
//! every key-space operation. The directory maps each block's start key to
//! the block covering `[start, next_start)`; a predecessor lookup resolves
//! any key to exactly one owning block, and the partition covers the whole
//! key space with no gaps and no overlaps.
//!
//! ## Concurrency protocol
//!
//! The directory is a `BTreeMap` behind an `RwLock`; lookups hold the read
//! lock only long enough to clone out an `Arc` to the target block, and the
//! single writer is a split publishing its new block. Block contents are
//! guarded by per-block locks, so operations on different blocks proceed
//! fully in parallel.
//!
//! A lookup can go stale: between resolving a block and locking it, a
//! concurrent split may have moved the key's range into a new upper block.
//! Every block therefore records its current upper bound, and an operation
//! that locks a block and finds its key out of range retries the lookup.
//! Bounds only ever shrink and the directory always contains an owner, so
//! the retry terminates.
//!
//! A split runs entirely under the block's lock and publishes its new upper
//! block with a single directory insert, so concurrent lookups observe
//! either the pre-split or the post-split partition — never a torn one.
//!
//! Range scans resume from the upper bound observed *under the lock* of
//! each visited block rather than from the directory successor. A scan that
//! reads a block before a split already saw the whole pre-split range and
//! skips the new upper block; a scan that reads it after continues exactly
//! at the moved tail. Either way no entry is lost or read twice.

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use thiserror::Error;
use tracing::{debug, info, trace};

use crate::block::{Block, BlockState};
use crate::encoding::EncodingError;
use crate::metadata::{
    BlockMetadataEntry, BlockRangeIndexMetadata, BlockStartKey, MetadataError,
};
use crate::policy::{PageReplacementPolicy, ResidentPage};
use crate::store::{PageStore, PageStoreError};
use crate::{IndexConfig, IndexKey, IndexValue};

// ------------------------------------------------------------------------------------------------
// Error type
// ------------------------------------------------------------------------------------------------

/// Errors returned by [`BlockRangeIndex`] operations.
///
/// Absence of data is never an error: searching a missing key yields an
/// empty result and deleting a missing pair is a no-op.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Invalid configuration parameter.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// A metadata snapshot was rejected at boot.
    #[error("boot rejected: {0}")]
    Boot(#[from] MetadataError),

    /// The backing page store failed; fatal, not retried.
    #[error("page store error: {0}")]
    Store(#[from] PageStoreError),

    /// A persisted payload could not be decoded.
    #[error("page encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// Detected directory or block inconsistency. Indicates a bug; the
    /// offending operation is aborted and nothing is auto-corrected.
    #[error("invariant violation: {0}")]
    Invariant(String),

    /// Internal failure such as a poisoned lock.
    #[error("internal error: {0}")]
    Internal(String),
}

// ------------------------------------------------------------------------------------------------
// Index
// ------------------------------------------------------------------------------------------------

/// A BRIN-style paged range index: an ordered directory of lazily-loaded,
/// independently-locked blocks with crash-consistent checkpointing.
///
/// Construct one instance per logical index and share it across worker
/// threads via `Arc`. [`boot`](Self::boot) installs the directory; every
/// other operation fails with an invariant error until it runs.
pub struct BlockRangeIndex<K, V> {
    config: IndexConfig,
    store: Arc<dyn PageStore>,
    policy: Arc<dyn PageReplacementPolicy>,
    blocks: RwLock<BTreeMap<BlockStartKey<K>, Arc<Block<K, V>>>>,
    next_block_id: AtomicU64,
}

impl<K: IndexKey, V: IndexValue> BlockRangeIndex<K, V> {
    /// Creates an index over the given page store and replacement policy.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::InvalidConfig`] if a configuration parameter
    /// is out of range.
    pub fn new(
        config: IndexConfig,
        store: Arc<dyn PageStore>,
        policy: Arc<dyn PageReplacementPolicy>,
    ) -> Result<Self, IndexError> {
        config.validate()?;
        Ok(Self {
            config,
            store,
            policy,
            blocks: RwLock::new(BTreeMap::new()),
            next_block_id: AtomicU64::new(1),
        })
    }

    // --------------------------------------------------------------------------------------------
    // Boot
    // --------------------------------------------------------------------------------------------

    /// Rebuilds the directory from a metadata snapshot without loading any
    /// block contents: every described block starts unloaded, carrying only
    /// its range, size estimate, and page identifier. An empty snapshot
    /// installs a single empty HEAD block.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Boot`] if the snapshot's boundary list is not
    /// HEAD-first and strictly increasing.
    pub fn boot(&self, metadata: BlockRangeIndexMetadata<K>) -> Result<(), IndexError> {
        metadata.validate()?;
        let entries = metadata.into_entries();

        let mut directory = BTreeMap::new();
        if entries.is_empty() {
            let block = Arc::new(Block::new_head(self.next_block_id()));
            directory.insert(BlockStartKey::Head, block);
        } else {
            for (i, entry) in entries.iter().enumerate() {
                // The next boundary is this block's exclusive upper bound;
                // validation guarantees only the first entry is HEAD.
                let upper_bound = entries
                    .get(i + 1)
                    .and_then(|next| next.start_key.as_key().cloned());
                let block = Block::from_metadata(
                    self.next_block_id(),
                    entry.start_key.clone(),
                    entry.size,
                    entry.page_id,
                    upper_bound,
                );
                directory.insert(entry.start_key.clone(), Arc::new(block));
            }
        }

        let booted = directory.len();
        let old = {
            let mut dir = self
                .blocks
                .write()
                .map_err(|_| IndexError::Internal("directory lock poisoned".into()))?;
            std::mem::replace(&mut *dir, directory)
        };
        for block in old.into_values() {
            self.policy.on_remove(block.page_key());
        }

        info!(blocks = booted, "index booted");
        Ok(())
    }

    // --------------------------------------------------------------------------------------------
    // Mutation
    // --------------------------------------------------------------------------------------------

    /// Inserts a `(key, value)` entry. Duplicate keys are permitted; the
    /// entry is visible to any thread's `search` as soon as the call
    /// returns.
    ///
    /// If the insertion pushes the owning block's size estimate past the
    /// configured maximum, the block is split before returning.
    pub fn put(&self, key: K, value: V) -> Result<(), IndexError> {
        loop {
            let block = self.owner_of(&key)?;
            let mut inner = block.lock()?;
            if !inner.owns(&key) {
                // A split moved this range while we were resolving; retry.
                trace!(block = block.page_key(), "stale lookup on put, retrying");
                continue;
            }
            let loaded = block.load_locked(&mut inner, self.store.as_ref())?;
            inner.insert_entry(key.clone(), value.clone());

            let mut published = None;
            if inner.size > self.config.max_block_size && inner.entries.len() > 1 {
                published = self.split_locked(&block, &mut inner)?;
            }
            drop(inner);

            if let Some(new_block) = published {
                self.policy.on_access(&(new_block as Arc<dyn ResidentPage>));
            }
            self.admit(&block, loaded);
            return Ok(());
        }
    }

    /// Removes one exact `(key, value)` pair, returning whether it was
    /// present. Deleting an absent pair is an idempotent no-op.
    pub fn delete(&self, key: &K, value: &V) -> Result<bool, IndexError> {
        loop {
            let block = self.owner_of(key)?;
            let mut inner = block.lock()?;
            if !inner.owns(key) {
                continue;
            }
            let loaded = block.load_locked(&mut inner, self.store.as_ref())?;
            let removed = inner.remove_entry(key, value);
            drop(inner);

            self.admit(&block, loaded);
            return Ok(removed);
        }
    }

    // --------------------------------------------------------------------------------------------
    // Lookup
    // --------------------------------------------------------------------------------------------

    /// Returns all values associated with `key`, or an empty list if the
    /// key is absent.
    pub fn search(&self, key: &K) -> Result<Vec<V>, IndexError> {
        loop {
            let block = self.owner_of(key)?;
            let mut inner = block.lock()?;
            if !inner.owns(key) {
                continue;
            }
            let loaded = block.load_locked(&mut inner, self.store.as_ref())?;
            let values = inner.entries.get(key).cloned().unwrap_or_default();
            drop(inner);

            self.admit(&block, loaded);
            return Ok(values);
        }
    }

    /// Whether at least one entry exists for `key`.
    pub fn contains_key(&self, key: &K) -> Result<bool, IndexError> {
        Ok(!self.search(key)?.is_empty())
    }

    /// Returns all values whose keys fall in `[min, max]` (both ends
    /// inclusive), in ascending key order.
    pub fn search_range(&self, min: &K, max: &K) -> Result<Vec<V>, IndexError> {
        if min > max {
            return Ok(Vec::new());
        }

        let mut results = Vec::new();
        // `None` means "resolve the block owning `min`"; afterwards the
        // scan resumes at the upper bound observed under each block's lock.
        let mut resume_at: Option<K> = None;

        loop {
            let block = match &resume_at {
                None => self.owner_of(min)?,
                Some(bound) => match self.block_at_or_after(bound)? {
                    Some(block) => block,
                    None => break,
                },
            };
            if let Some(start) = block.start_key().as_key() {
                if start > max {
                    break;
                }
            }

            let mut inner = block.lock()?;
            if resume_at.is_none() && !inner.owns(min) {
                continue;
            }
            let loaded = block.load_locked(&mut inner, self.store.as_ref())?;
            for (_, values) in inner
                .entries
                .range((Bound::Included(min), Bound::Included(max)))
            {
                results.extend(values.iter().cloned());
            }
            let upper_bound = inner.upper_bound.clone();
            drop(inner);
            self.admit(&block, loaded);

            match upper_bound {
                None => break,
                Some(bound) => {
                    if &bound > max {
                        break;
                    }
                    resume_at = Some(bound);
                }
            }
        }

        Ok(results)
    }

    // --------------------------------------------------------------------------------------------
    // Checkpoint
    // --------------------------------------------------------------------------------------------

    /// Flushes every dirty block to the page store, reclaims emptied
    /// blocks, runs an eviction sweep over the now-clean pages, and returns
    /// a snapshot of the directory.
    ///
    /// Checkpoint does not quiesce the index: each dirty block is flushed
    /// under its own lock while mutation on other blocks proceeds. Blocks
    /// published by splits racing the checkpoint are picked up as the walk
    /// reaches their position, so the snapshot always describes a valid,
    /// fully-covering partition.
    ///
    /// Deletions empty blocks out but never remove them; checkpoint is the
    /// rebuild point. An empty non-HEAD block whose predecessor is still
    /// adjacent is spliced away — the predecessor absorbs its range — so
    /// after checkpoint the only possibly-empty block is the HEAD sentinel.
    pub fn checkpoint(&self) -> Result<BlockRangeIndexMetadata<K>, IndexError> {
        info!("checkpoint started");
        let mut entries = Vec::new();
        let mut cursor: Option<BlockStartKey<K>> = None;
        let mut prev: Option<Arc<Block<K, V>>> = None;
        let mut reclaimed = 0usize;

        loop {
            let next = {
                let dir = self
                    .blocks
                    .read()
                    .map_err(|_| IndexError::Internal("directory lock poisoned".into()))?;
                let item = match &cursor {
                    None => dir.iter().next(),
                    Some(c) => dir
                        .range((Bound::Excluded(c.clone()), Bound::Unbounded))
                        .next(),
                };
                item.map(|(start, block)| (start.clone(), Arc::clone(block)))
            };
            let Some((start, block)) = next else { break };

            if let (Some(prev_block), BlockStartKey::Key(start_key)) = (&prev, &start) {
                if self.try_reclaim(prev_block, &block, start_key)? {
                    reclaimed += 1;
                    cursor = Some(start);
                    continue;
                }
            }

            let mut inner = block.lock()?;
            block.flush_locked(&mut inner, self.store.as_ref())?;
            let page_id = inner.page_id.ok_or_else(|| {
                IndexError::Invariant(format!(
                    "block {} clean without backing page",
                    block.page_key()
                ))
            })?;
            entries.push(BlockMetadataEntry {
                start_key: start.clone(),
                size: inner.size,
                page_id,
            });
            drop(inner);

            prev = Some(block);
            cursor = Some(start);
        }

        let evicted = self.policy.select_victims(usize::MAX);
        debug!(
            blocks = entries.len(),
            reclaimed,
            evicted = evicted.len(),
            "checkpoint complete"
        );
        Ok(BlockRangeIndexMetadata::new(entries))
    }

    /// Splices an empty non-HEAD block out of the directory: its
    /// predecessor absorbs the range, the block's own bound collapses so
    /// any racing operation that already resolved it retries, and the
    /// directory entry is removed.
    ///
    /// Both block locks are taken in directory order (the only place two
    /// block locks are ever held at once). The splice only proceeds if the
    /// two blocks are still adjacent — a racing split of the predecessor
    /// voids the attempt and the block is left for the next checkpoint.
    fn try_reclaim(
        &self,
        prev: &Arc<Block<K, V>>,
        block: &Arc<Block<K, V>>,
        start_key: &K,
    ) -> Result<bool, IndexError> {
        let mut prev_inner = prev.lock()?;
        let mut inner = block.lock()?;

        if prev_inner.upper_bound.as_ref() != Some(start_key) {
            return Ok(false);
        }
        let empty = match inner.state {
            BlockState::Unloaded => inner.size == 0,
            _ => inner.entries.is_empty(),
        };
        if !empty {
            return Ok(false);
        }

        prev_inner.upper_bound = inner.upper_bound.replace(start_key.clone());
        {
            let mut dir = self
                .blocks
                .write()
                .map_err(|_| IndexError::Internal("directory lock poisoned".into()))?;
            dir.remove(&BlockStartKey::Key(start_key.clone()));
        }
        self.policy.on_remove(block.page_key());
        debug!(block = block.page_key(), "reclaimed empty block");
        Ok(true)
    }

    // --------------------------------------------------------------------------------------------
    // Diagnostics
    // --------------------------------------------------------------------------------------------

    /// Ordered snapshot of the directory's blocks. Does not force loading.
    pub fn blocks(&self) -> Result<Vec<Arc<Block<K, V>>>, IndexError> {
        let dir = self
            .blocks
            .read()
            .map_err(|_| IndexError::Internal("directory lock poisoned".into()))?;
        Ok(dir.values().cloned().collect())
    }

    /// The page store backing this index.
    pub fn store(&self) -> &Arc<dyn PageStore> {
        &self.store
    }

    // --------------------------------------------------------------------------------------------
    // Internal helpers
    // --------------------------------------------------------------------------------------------

    fn next_block_id(&self) -> u64 {
        self.next_block_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Predecessor lookup: the block with the greatest start key ≤ `key`.
    /// Holds the directory read lock only long enough to clone the `Arc`.
    fn owner_of(&self, key: &K) -> Result<Arc<Block<K, V>>, IndexError> {
        let dir = self
            .blocks
            .read()
            .map_err(|_| IndexError::Internal("directory lock poisoned".into()))?;
        dir.range(..=BlockStartKey::Key(key.clone()))
            .next_back()
            .map(|(_, block)| Arc::clone(block))
            .ok_or_else(|| IndexError::Invariant("directory has no head block (index not booted)".into()))
    }

    /// First block whose start key is ≥ `bound`. Used by range scans to
    /// resume at an observed upper bound.
    fn block_at_or_after(&self, bound: &K) -> Result<Option<Arc<Block<K, V>>>, IndexError> {
        let dir = self
            .blocks
            .read()
            .map_err(|_| IndexError::Internal("directory lock poisoned".into()))?;
        Ok(dir
            .range(BlockStartKey::Key(bound.clone())..)
            .next()
            .map(|(_, block)| Arc::clone(block)))
    }

    /// Splits an oversized block under its already-held lock: entries from
    /// the split point up move into a new block that inherits the old upper
    /// bound, and the new block is published with one atomic directory
    /// insert before the lock is released.
    fn split_locked(
        &self,
        block: &Arc<Block<K, V>>,
        inner: &mut crate::block::BlockInner<K, V>,
    ) -> Result<Option<Arc<Block<K, V>>>, IndexError> {
        let Some(split_key) = inner.split_point() else {
            // Single distinct key; nothing to partition.
            return Ok(None);
        };
        let (tail, moved) = inner.detach_tail(&split_key);
        let inherited_bound = inner.upper_bound.take();
        inner.upper_bound = Some(split_key.clone());

        let new_block = Arc::new(Block::from_split(
            self.next_block_id(),
            split_key.clone(),
            tail,
            moved,
            inherited_bound,
        ));

        {
            let mut dir = self
                .blocks
                .write()
                .map_err(|_| IndexError::Internal("directory lock poisoned".into()))?;
            dir.insert(BlockStartKey::Key(split_key), Arc::clone(&new_block));
        }

        debug!(
            block = block.page_key(),
            new_block = new_block.page_key(),
            kept = inner.size,
            moved,
            "block split"
        );
        Ok(Some(new_block))
    }

    /// Notifies the policy of an access and, after a fresh load, runs a
    /// best-effort eviction sweep to shed pages above the resident cap.
    fn admit(&self, block: &Arc<Block<K, V>>, loaded: bool) {
        let page: Arc<dyn ResidentPage> = block.clone();
        self.policy.on_access(&page);
        if loaded {
            let evicted = self.policy.select_victims(usize::MAX);
            if !evicted.is_empty() {
                trace!(evicted = evicted.len(), "shed resident pages after load");
            }
        }
    }
}

impl<K: IndexKey, V: IndexValue> BlockRangeIndex<K, V> {
    /// Verifies directory invariants over the current blocks: non-empty
    /// blocks must hold non-decreasing, non-overlapping key ranges across
    /// seams, and an empty block is only legal as the sole block or the
    /// HEAD block. Forces loading; intended for tests and offline checks.
    pub fn verify(&self) -> Result<(), IndexError> {
        let blocks = self.blocks()?;
        let total = blocks.len();
        let mut last_max: Option<K> = None;

        for block in blocks {
            block.ensure_loaded(self.store.as_ref())?;
            let entries = block.entry_snapshot()?;
            let is_head = matches!(block.start_key(), BlockStartKey::Head);

            let (Some((min, _)), Some((max, _))) = (entries.first(), entries.last()) else {
                if total != 1 && !is_head {
                    return Err(IndexError::Invariant(format!(
                        "empty non-head block {} in a directory of {total}",
                        block.page_key()
                    )));
                }
                continue;
            };
            if let Some(prev) = &last_max {
                if min < prev {
                    return Err(IndexError::Invariant(format!(
                        "block {} overlaps its predecessor",
                        block.page_key()
                    )));
                }
            }
            last_max = Some(max.clone());
        }
        Ok(())
    }
}
