use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::IndexConfig;
use crate::index::BlockRangeIndex;
use crate::metadata::BlockRangeIndexMetadata;
use crate::policy::{PageReplacementPolicy, RandomPageReplacementPolicy};
use crate::store::{MemoryPageStore, PageStore};

/// Initialize tracing subscriber controlled by `RUST_LOG` env var.
/// Safe to call multiple times — only the first call takes effect.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Booted index over a fresh in-memory store with the reference random
/// policy.
pub fn booted_index(max_block_size: u64, resident_cap: usize) -> BlockRangeIndex<i64, String> {
    booted_index_on(
        Arc::new(MemoryPageStore::new()),
        max_block_size,
        resident_cap,
    )
}

/// Booted index over the given store; lets tests share pages between
/// instances to exercise checkpoint/boot hand-off.
pub fn booted_index_on(
    store: Arc<dyn PageStore>,
    max_block_size: u64,
    resident_cap: usize,
) -> BlockRangeIndex<i64, String> {
    init_tracing();
    let policy: Arc<dyn PageReplacementPolicy> =
        Arc::new(RandomPageReplacementPolicy::new(resident_cap));
    let index =
        BlockRangeIndex::new(IndexConfig { max_block_size }, store, policy).expect("valid config");
    index.boot(BlockRangeIndexMetadata::empty()).expect("boot");
    index
}

/// The value conventionally stored under key `i`.
pub fn val(i: i64) -> String {
    format!("a{i}")
}

/// Boundary list of the current directory (None = HEAD sentinel), for
/// comparing partitions across instances.
pub fn boundaries(index: &BlockRangeIndex<i64, String>) -> Vec<Option<i64>> {
    index
        .blocks()
        .expect("blocks")
        .iter()
        .map(|b| b.start_key().as_key().copied())
        .collect()
}
