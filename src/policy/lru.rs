//! Least-recently-used page replacement.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use tracing::{debug, error};

use super::{PageReplacementPolicy, ResidentPage};

/// Evicts the least-recently-accessed resident pages first.
///
/// Recency is tracked with a stamped queue and lazy invalidation: every
/// access pushes a fresh `(page, stamp)` entry and older entries for the
/// same page become stale, skipped when they reach the queue head. This
/// keeps `on_access` O(1) instead of paying an O(n) queue scan per touch.
pub struct LruPageReplacementPolicy {
    capacity: usize,
    inner: Mutex<LruInner>,
}

struct LruInner {
    /// Access order, oldest at the front. Entries whose stamp no longer
    /// matches the page's slot are stale.
    queue: VecDeque<(u64, u64)>,
    pages: HashMap<u64, LruSlot>,
    next_stamp: u64,
}

struct LruSlot {
    page: Arc<dyn ResidentPage>,
    stamp: u64,
}

impl LruPageReplacementPolicy {
    /// Creates a policy keeping at most `capacity` pages resident.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(LruInner {
                queue: VecDeque::new(),
                pages: HashMap::new(),
                next_stamp: 0,
            }),
        }
    }

    /// The configured resident-page cap.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> Option<std::sync::MutexGuard<'_, LruInner>> {
        match self.inner.lock() {
            Ok(guard) => Some(guard),
            Err(_) => {
                error!("replacement policy lock poisoned; eviction disabled");
                None
            }
        }
    }
}

impl PageReplacementPolicy for LruPageReplacementPolicy {
    fn on_access(&self, page: &Arc<dyn ResidentPage>) {
        let Some(mut inner) = self.lock() else { return };
        let key = page.page_key();
        let stamp = inner.next_stamp;
        inner.next_stamp += 1;
        inner.queue.push_back((key, stamp));
        inner.pages.insert(
            key,
            LruSlot {
                page: Arc::clone(page),
                stamp,
            },
        );
    }

    fn select_victims(&self, limit: usize) -> Vec<Arc<dyn ResidentPage>> {
        let Some(mut inner) = self.lock() else {
            return Vec::new();
        };

        let overflow = inner.pages.len().saturating_sub(self.capacity).min(limit);
        if overflow == 0 {
            return Vec::new();
        }

        let mut victims = Vec::with_capacity(overflow);
        // Bound the sweep to one pass over the live set; dirty or contended
        // candidates are re-stamped to the back and not retried this sweep.
        let mut attempts = inner.pages.len();

        while victims.len() < overflow && attempts > 0 {
            let Some((key, stamp)) = inner.queue.pop_front() else {
                break;
            };
            let Some(slot) = inner.pages.get(&key) else {
                continue; // Stale entry for a removed page.
            };
            if slot.stamp != stamp {
                continue; // Superseded by a more recent access.
            }

            attempts -= 1;
            if slot.page.try_unload() {
                if let Some(slot) = inner.pages.remove(&key) {
                    victims.push(slot.page);
                }
            } else {
                let fresh = inner.next_stamp;
                inner.next_stamp += 1;
                inner.queue.push_back((key, fresh));
                if let Some(slot) = inner.pages.get_mut(&key) {
                    slot.stamp = fresh;
                }
            }
        }

        if !victims.is_empty() {
            debug!(
                evicted = victims.len(),
                resident = inner.pages.len(),
                "lru policy evicted pages"
            );
        }
        victims
    }

    fn on_remove(&self, page_key: u64) {
        let Some(mut inner) = self.lock() else { return };
        inner.pages.remove(&page_key);
        // Queue entries turn stale and are skipped on their way out.
    }

    fn resident_count(&self) -> usize {
        self.lock().map(|inner| inner.pages.len()).unwrap_or(0)
    }
}
