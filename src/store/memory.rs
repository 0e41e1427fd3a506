//! Heap-backed page store.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::trace;

use super::{PageId, PageStore, PageStoreError};

/// A [`PageStore`] holding every page in a process-local map.
///
/// Pages survive only as long as the store itself; intended for tests and
/// for embedders that checkpoint into their own durability layer.
#[derive(Debug)]
pub struct MemoryPageStore {
    pages: Mutex<HashMap<PageId, Vec<u8>>>,
    next_id: AtomicU64,
}

impl Default for MemoryPageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPageStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            pages: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Number of pages currently held.
    pub fn page_count(&self) -> usize {
        self.pages.lock().map(|p| p.len()).unwrap_or(0)
    }
}

impl PageStore for MemoryPageStore {
    fn load_page(&self, page_id: PageId) -> Result<Vec<u8>, PageStoreError> {
        let pages = self
            .pages
            .lock()
            .map_err(|_| PageStoreError::Internal("page map lock poisoned".into()))?;
        pages
            .get(&page_id)
            .cloned()
            .ok_or(PageStoreError::PageNotFound(page_id))
    }

    fn save_page(&self, page_id: Option<PageId>, data: &[u8]) -> Result<PageId, PageStoreError> {
        let id = page_id.unwrap_or_else(|| self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut pages = self
            .pages
            .lock()
            .map_err(|_| PageStoreError::Internal("page map lock poisoned".into()))?;
        pages.insert(id, data.to_vec());
        trace!(page_id = id, bytes = data.len(), "page saved");
        Ok(id)
    }
}
