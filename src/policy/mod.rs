//! # Page replacement
//!
//! A [`PageReplacementPolicy`] decides which loaded blocks stay in memory
//! under a configured cap on simultaneously-resident pages. Policies are
//! advisory: the index never depends on them for correctness, only for
//! bounding memory.
//!
//! The index notifies the policy on every block access
//! ([`on_access`](PageReplacementPolicy::on_access)) and runs a victim
//! sweep ([`select_victims`](PageReplacementPolicy::select_victims)) after
//! admitting a freshly-loaded page and again during checkpoint, once dirty
//! blocks have been flushed clean.
//!
//! Eviction coordinates with each block's own lock through
//! [`ResidentPage::try_unload`]: the unload attempt takes the block lock
//! non-blockingly and refuses dirty pages, so a victim sweep can never pull
//! a page out from under an in-flight operation or discard unflushed data.
//!
//! Two interchangeable implementations ship with the crate:
//! - [`RandomPageReplacementPolicy`] — uniformly-random victims; the
//!   reference policy, deliberately insensitive to access patterns so
//!   correctness is stressed independently of them;
//! - [`LruPageReplacementPolicy`] — least-recently-used victims.

#[cfg(test)]
mod tests;

mod lru;
mod random;

pub use lru::LruPageReplacementPolicy;
pub use random::RandomPageReplacementPolicy;

use std::sync::Arc;

// ------------------------------------------------------------------------------------------------
// Resident page handle
// ------------------------------------------------------------------------------------------------

/// A loaded page as seen by a replacement policy.
///
/// Implemented by the index's block type; policies hold these handles and
/// never see block contents.
pub trait ResidentPage: Send + Sync {
    /// Stable identity of the in-memory block instance.
    ///
    /// Distinct from any backing-page identifier: a block keeps its key
    /// across unload/reload cycles, and blocks created by splits get fresh
    /// keys.
    fn page_key(&self) -> u64;

    /// Attempt to discard this page's in-memory contents.
    ///
    /// Takes the block lock non-blockingly; returns `false` on lock
    /// contention or if the page is dirty. Returns `true` once the page is
    /// unloaded (including when it already was).
    fn try_unload(&self) -> bool;
}

// ------------------------------------------------------------------------------------------------
// Policy contract
// ------------------------------------------------------------------------------------------------

/// Strategy deciding which resident pages to keep in memory.
///
/// One policy instance is shared by all blocks of one index; it must be
/// internally synchronized. Its decisions are best-effort — skipping an
/// eviction is always legal, evicting a dirty or locked page never is.
pub trait PageReplacementPolicy: Send + Sync {
    /// Records that `page` was just loaded or touched.
    ///
    /// Admits unknown pages into the resident set; for recency-based
    /// policies, refreshes the page's position.
    fn on_access(&self, page: &Arc<dyn ResidentPage>);

    /// Evicts up to `limit` pages in excess of the configured cap.
    ///
    /// Candidates are chosen by the policy's own ordering rule and unloaded
    /// through [`ResidentPage::try_unload`]; dirty or contended pages are
    /// skipped and stay resident. Returns the pages actually unloaded,
    /// which are no longer tracked.
    fn select_victims(&self, limit: usize) -> Vec<Arc<dyn ResidentPage>>;

    /// Stops tracking a page that left the directory or was unloaded
    /// outside a victim sweep.
    fn on_remove(&self, page_key: u64);

    /// Number of pages currently tracked as resident.
    fn resident_count(&self) -> usize;
}
