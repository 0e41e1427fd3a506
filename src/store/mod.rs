//! # Page store contract
//!
//! A [`PageStore`] is the durable backing for index blocks. The index hands
//! it opaque page payloads on flush and asks for them back on load; the
//! store assigns page identifiers and owns the physical layout.
//!
//! I/O failures are fatal from the index's point of view: they are
//! propagated to the caller unchanged, never retried internally.
//!
//! Two implementations ship with the crate:
//! - [`MemoryPageStore`] — heap-backed, for tests and embedders that handle
//!   durability elsewhere;
//! - [`FilePageStore`] — one checksummed file per page with atomic replace.

#[cfg(test)]
mod tests;

mod file;
mod memory;

pub use file::FilePageStore;
pub use memory::MemoryPageStore;

use std::io;

use thiserror::Error;

/// Identifier of a persisted page, assigned by the store on first save.
pub type PageId = u64;

// ------------------------------------------------------------------------------------------------
// Error type
// ------------------------------------------------------------------------------------------------

/// Errors returned by [`PageStore`] operations.
#[derive(Debug, Error)]
pub enum PageStoreError {
    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The requested page identifier is unknown to the store.
    #[error("page {0} not found")]
    PageNotFound(PageId),

    /// The stored payload failed checksum verification.
    #[error("checksum mismatch on page {page_id}")]
    ChecksumMismatch {
        /// The page whose payload is corrupt.
        page_id: PageId,
    },

    /// The stored payload is structurally unreadable (e.g. truncated).
    #[error("page {page_id} corrupted: {reason}")]
    Corrupted {
        /// The page whose payload is unreadable.
        page_id: PageId,
        /// Human-readable diagnosis.
        reason: String,
    },

    /// Internal invariant violation or poisoned lock.
    #[error("internal error: {0}")]
    Internal(String),
}

// ------------------------------------------------------------------------------------------------
// Store contract
// ------------------------------------------------------------------------------------------------

/// Durable backing for index block payloads.
///
/// Both operations are synchronous; callers block until the I/O completes.
/// Implementations must be safe to share across threads — the index issues
/// loads and saves concurrently from independent worker threads, though
/// never two saves for the same page at once (each block serializes its own
/// flushes under its lock).
pub trait PageStore: Send + Sync {
    /// Fetch the payload previously saved under `page_id`.
    fn load_page(&self, page_id: PageId) -> Result<Vec<u8>, PageStoreError>;

    /// Persist `data`, returning its page identifier.
    ///
    /// With `page_id == None` a fresh identifier is assigned; with
    /// `Some(id)` the existing page is overwritten in place and the same
    /// identifier is returned.
    fn save_page(&self, page_id: Option<PageId>, data: &[u8]) -> Result<PageId, PageStoreError>;
}
