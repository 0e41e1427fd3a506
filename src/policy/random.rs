//! Uniformly-random page replacement.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rand::seq::SliceRandom;
use tracing::{debug, error};

use super::{PageReplacementPolicy, ResidentPage};

/// The reference replacement policy: victims are drawn uniformly at random
/// from the resident set.
///
/// Random selection carries no recency state, so every resident clean page
/// is equally likely to be evicted — which makes it the harshest correctness
/// workout for the index's load/unload paths, independent of access pattern.
pub struct RandomPageReplacementPolicy {
    capacity: usize,
    inner: Mutex<ResidentSet>,
}

/// Resident pages in a flat vector for O(1) random pick and swap-removal,
/// with a side map from page key to slot.
#[derive(Default)]
struct ResidentSet {
    pages: Vec<Arc<dyn ResidentPage>>,
    slots: HashMap<u64, usize>,
}

impl ResidentSet {
    fn remove_slot(&mut self, slot: usize) -> Arc<dyn ResidentPage> {
        let page = self.pages.swap_remove(slot);
        self.slots.remove(&page.page_key());
        if let Some(moved) = self.pages.get(slot) {
            self.slots.insert(moved.page_key(), slot);
        }
        page
    }
}

impl RandomPageReplacementPolicy {
    /// Creates a policy keeping at most `capacity` pages resident.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(ResidentSet::default()),
        }
    }

    /// The configured resident-page cap.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> Option<std::sync::MutexGuard<'_, ResidentSet>> {
        // A poisoned policy lock only degrades eviction, never correctness.
        match self.inner.lock() {
            Ok(guard) => Some(guard),
            Err(_) => {
                error!("replacement policy lock poisoned; eviction disabled");
                None
            }
        }
    }
}

impl PageReplacementPolicy for RandomPageReplacementPolicy {
    fn on_access(&self, page: &Arc<dyn ResidentPage>) {
        let Some(mut inner) = self.lock() else { return };
        let key = page.page_key();
        if !inner.slots.contains_key(&key) {
            let slot = inner.pages.len();
            inner.slots.insert(key, slot);
            inner.pages.push(Arc::clone(page));
        }
    }

    fn select_victims(&self, limit: usize) -> Vec<Arc<dyn ResidentPage>> {
        let Some(mut inner) = self.lock() else {
            return Vec::new();
        };

        let overflow = inner.pages.len().saturating_sub(self.capacity).min(limit);
        if overflow == 0 {
            return Vec::new();
        }

        // Visit resident pages in a shuffled order; each candidate gets one
        // unload attempt, so a sweep over an all-dirty set terminates.
        let mut keys: Vec<u64> = inner.slots.keys().copied().collect();
        keys.shuffle(&mut rand::rng());

        let mut victims = Vec::with_capacity(overflow);
        for key in keys {
            if victims.len() == overflow {
                break;
            }
            let Some(&slot) = inner.slots.get(&key) else {
                continue;
            };
            if inner.pages[slot].try_unload() {
                victims.push(inner.remove_slot(slot));
            }
        }

        if !victims.is_empty() {
            debug!(
                evicted = victims.len(),
                resident = inner.pages.len(),
                "random policy evicted pages"
            );
        }
        victims
    }

    fn on_remove(&self, page_key: u64) {
        let Some(mut inner) = self.lock() else { return };
        if let Some(&slot) = inner.slots.get(&page_key) {
            inner.remove_slot(slot);
        }
    }

    fn resident_count(&self) -> usize {
        self.lock().map(|inner| inner.pages.len()).unwrap_or(0)
    }
}
