use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::policy::ResidentPage;

/// A stand-in resident page whose evictability can be toggled, mimicking a
/// block that is clean (unloadable) or dirty/locked (not).
pub struct FakePage {
    key: u64,
    evictable: AtomicBool,
    unloads: AtomicUsize,
}

impl FakePage {
    pub fn new(key: u64) -> Arc<Self> {
        Arc::new(Self {
            key,
            evictable: AtomicBool::new(true),
            unloads: AtomicUsize::new(0),
        })
    }

    /// A page that refuses to unload, like a dirty block.
    pub fn pinned(key: u64) -> Arc<Self> {
        let page = Self::new(key);
        page.evictable.store(false, Ordering::SeqCst);
        page
    }

    pub fn set_evictable(&self, evictable: bool) {
        self.evictable.store(evictable, Ordering::SeqCst);
    }

    /// How many times this page was actually unloaded.
    pub fn unload_count(&self) -> usize {
        self.unloads.load(Ordering::SeqCst)
    }
}

impl ResidentPage for FakePage {
    fn page_key(&self) -> u64 {
        self.key
    }

    fn try_unload(&self) -> bool {
        if self.evictable.load(Ordering::SeqCst) {
            self.unloads.fetch_add(1, Ordering::SeqCst);
            true
        } else {
            false
        }
    }
}
