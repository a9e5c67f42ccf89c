//! Chunked bulk operations.
//!
//! Each helper commits once per chunk and releases clean instances
//! afterwards, so memory stays bounded by the chunk size however many
//! documents are processed.

use crate::document::{DocRef, Document};
use crate::error::CoreResult;
use crate::manager::Manager;
use crate::repository::Criteria;
use std::sync::Arc;

/// Default documents per commit.
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// What a bulk call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BulkReport {
    /// Documents processed.
    pub documents: usize,
    /// Commits issued.
    pub commits: usize,
}

/// Runs persists, deletes and index rebuilds in chunks.
#[derive(Debug, Clone)]
pub struct BulkWriter {
    manager: Arc<Manager>,
    chunk_size: usize,
}

impl BulkWriter {
    /// Creates a writer committing every `chunk_size` documents.
    /// Zero selects [`DEFAULT_CHUNK_SIZE`].
    #[must_use]
    pub fn new(manager: Arc<Manager>, chunk_size: usize) -> Self {
        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };
        Self {
            manager,
            chunk_size,
        }
    }

    /// Documents per commit.
    #[must_use]
    pub const fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Persists every document, committing each full chunk.
    ///
    /// # Errors
    ///
    /// Stops at the first persist or commit error. Chunks committed before
    /// the failure stay written.
    pub fn persist_all<D, I>(&self, docs: I) -> CoreResult<BulkReport>
    where
        D: Document,
        I: IntoIterator<Item = DocRef<D>>,
    {
        let mut report = BulkReport::default();
        let mut staged = 0;
        for doc in docs {
            self.manager.persist(&doc)?;
            staged += 1;
            if staged == self.chunk_size {
                self.flush(&mut report, staged)?;
                staged = 0;
            }
        }
        if staged > 0 {
            self.flush(&mut report, staged)?;
        }
        tracing::debug!(documents = report.documents, commits = report.commits, "bulk persist finished");
        Ok(report)
    }

    /// Deletes every document of type `D` matching `criteria`.
    ///
    /// # Errors
    ///
    /// Stops at the first store or commit error.
    pub fn remove_by<D: Document>(&self, criteria: &Criteria) -> CoreResult<BulkReport> {
        let repository = self.manager.repository::<D>()?;
        let mut report = BulkReport::default();
        repository.for_each_batch(criteria, self.chunk_size, |batch| {
            let staged = batch.len();
            for doc in &batch {
                self.manager.remove(doc)?;
            }
            self.flush(&mut report, staged)
        })?;
        tracing::debug!(documents = report.documents, "bulk remove finished");
        Ok(report)
    }

    /// Rewrites every index entry of every `D` from its current field
    /// values.
    ///
    /// # Errors
    ///
    /// Stops at the first store or commit error.
    pub fn rebuild_indexes<D: Document>(&self) -> CoreResult<BulkReport> {
        let repository = self.manager.repository::<D>()?;
        let mut report = BulkReport::default();
        repository.for_each_batch(&Criteria::new(), self.chunk_size, |batch| {
            let staged = batch.len();
            for doc in &batch {
                self.manager.persist(doc)?;
            }
            self.manager.set_force_rebuild(true);
            self.flush(&mut report, staged)
        })?;
        tracing::debug!(
            collection = repository.metadata().collection(),
            documents = report.documents,
            "index rebuild finished"
        );
        Ok(report)
    }

    fn flush(&self, report: &mut BulkReport, staged: usize) -> CoreResult<()> {
        if staged == 0 {
            return Ok(());
        }
        self.manager.commit()?;
        self.manager.release_clean();
        report.documents += staged;
        report.commits += 1;
        Ok(())
    }
}
