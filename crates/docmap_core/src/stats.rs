//! Manager statistics and counters.
//!
//! Counters use relaxed atomics: they are observability data, never used to
//! make decisions.

use std::sync::atomic::{AtomicU64, Ordering};

/// Runtime statistics for a [`crate::Manager`].
///
/// # Example
///
/// ```rust,ignore
/// let stats = manager.stats();
/// println!("Loads: {}", stats.loads);
/// println!("Scans: {}", stats.collection_scans);
/// ```
#[derive(Debug, Default)]
pub struct ManagerStats {
    loads: AtomicU64,
    identity_hits: AtomicU64,
    commits: AtomicU64,
    rejected_commits: AtomicU64,
    documents_written: AtomicU64,
    documents_deleted: AtomicU64,
    collection_scans: AtomicU64,
    index_lookups: AtomicU64,
    intersections: AtomicU64,
}

impl ManagerStats {
    /// Creates zeroed statistics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records documents loaded from the store.
    pub(crate) fn record_loads(&self, count: usize) {
        self.loads.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Records an identity-map hit.
    pub(crate) fn record_identity_hit(&self) {
        self.identity_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a successful commit.
    pub(crate) fn record_commit(&self, written: usize, deleted: usize) {
        self.commits.fetch_add(1, Ordering::Relaxed);
        self.documents_written
            .fetch_add(written as u64, Ordering::Relaxed);
        self.documents_deleted
            .fetch_add(deleted as u64, Ordering::Relaxed);
    }

    /// Records a commit aborted before execution.
    pub(crate) fn record_rejected_commit(&self) {
        self.rejected_commits.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a full collection scan.
    pub(crate) fn record_collection_scan(&self) {
        self.collection_scans.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a single-index lookup.
    pub(crate) fn record_index_lookup(&self) {
        self.index_lookups.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a store-side intersection.
    pub(crate) fn record_intersection(&self) {
        self.intersections.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a snapshot of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            loads: self.loads.load(Ordering::Relaxed),
            identity_hits: self.identity_hits.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            rejected_commits: self.rejected_commits.load(Ordering::Relaxed),
            documents_written: self.documents_written.load(Ordering::Relaxed),
            documents_deleted: self.documents_deleted.load(Ordering::Relaxed),
            collection_scans: self.collection_scans.load(Ordering::Relaxed),
            index_lookups: self.index_lookups.load(Ordering::Relaxed),
            intersections: self.intersections.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of manager statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Documents hydrated from the store.
    pub loads: u64,
    /// Lookups answered by the identity map.
    pub identity_hits: u64,
    /// Successful commits.
    pub commits: u64,
    /// Commits aborted in the plan or check phase.
    pub rejected_commits: u64,
    /// Documents written by commits.
    pub documents_written: u64,
    /// Documents deleted by commits.
    pub documents_deleted: u64,
    /// Full collection scans.
    ///
    /// High scan counts may indicate missing indexes.
    pub collection_scans: u64,
    /// Single-index lookups.
    pub index_lookups: u64,
    /// Store-side index intersections.
    pub intersections: u64,
}
