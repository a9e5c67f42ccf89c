//! Typed query entry point for one document type.
//!
//! Candidate ids come from the cheapest access path the criteria allow:
//!
//! - one indexed term: members of that index set
//! - several indexed terms: a store-side intersection into a temporary
//!   key with a bounded TTL, read and dropped in the same pipeline
//! - no indexed term: a cursor scan of the collection's primary keys
//!
//! Remaining terms are checked on the loaded documents.

mod plan;
mod query;
mod range;

pub use plan::{Access, Criteria, Direction, OrderBy, QueryPlan};
pub use query::QueryBuilder;
pub use range::RangeQuery;

use crate::document::{DocRef, Document};
use crate::error::{CoreError, CoreResult};
use crate::manager::Manager;
use crate::metadata::{ClassMetadata, DocumentType};
use crate::page::ResultPage;
use crate::scan::{scan_keys, scan_pages};
use docmap_codec::Value;
use docmap_store::Pipeline;
use plan::{compare_rows, plan_criteria, Residual};
use std::fmt;
use std::sync::Arc;

/// Queries over the documents of type `D`.
pub struct Repository<D> {
    manager: Arc<Manager>,
    doc_type: Arc<DocumentType<D>>,
}

impl<D> Clone for Repository<D> {
    fn clone(&self) -> Self {
        Self {
            manager: Arc::clone(&self.manager),
            doc_type: Arc::clone(&self.doc_type),
        }
    }
}

impl<D> fmt::Debug for Repository<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("collection", &self.doc_type.metadata().collection())
            .finish_non_exhaustive()
    }
}

impl<D: Document> Repository<D> {
    pub(crate) fn new(manager: Arc<Manager>, doc_type: Arc<DocumentType<D>>) -> Self {
        Self { manager, doc_type }
    }

    /// The owning manager.
    #[must_use]
    pub fn manager(&self) -> &Arc<Manager> {
        &self.manager
    }

    /// The descriptor of `D`.
    #[must_use]
    pub fn metadata(&self) -> &Arc<ClassMetadata> {
        self.doc_type.metadata()
    }

    pub(crate) fn doc_type(&self) -> &Arc<DocumentType<D>> {
        &self.doc_type
    }

    /// Finds one document by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read or hydration fails.
    pub fn find(&self, id: &str) -> CoreResult<Option<DocRef<D>>> {
        self.manager.find::<D>(id)
    }

    /// Starts a criteria query.
    #[must_use]
    pub fn query(&self) -> QueryBuilder<D> {
        QueryBuilder::new(self.clone())
    }

    /// Starts a range query over the sorted index on `field`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidQuery` if `field` has no sorted index.
    pub fn range(&self, field: &str) -> CoreResult<RangeQuery<D>> {
        RangeQuery::new(self.clone(), field)
    }

    /// Describes how `criteria` would be served without running anything.
    ///
    /// # Errors
    ///
    /// Returns `InvalidQuery` for unknown fields.
    pub fn explain(&self, criteria: &Criteria) -> CoreResult<QueryPlan> {
        Ok(plan_criteria(self.metadata(), self.manager.hydrator(), criteria)?.plan)
    }

    /// Finds documents matching `criteria`.
    ///
    /// Without residual terms or ordering the page holds ids only and
    /// hydrates on first access. Otherwise every candidate is loaded,
    /// filtered and sorted before slicing; `total` is the filtered count.
    ///
    /// # Errors
    ///
    /// Returns `InvalidQuery` for unknown fields, or store and hydration
    /// errors.
    pub fn find_by(
        &self,
        criteria: &Criteria,
        order_by: &[OrderBy],
        limit: Option<usize>,
        offset: usize,
    ) -> CoreResult<ResultPage<D>> {
        let planned = plan_criteria(self.metadata(), self.manager.hydrator(), criteria)?;
        for order in order_by {
            self.metadata().require_field(order.field())?;
        }
        tracing::debug!(
            collection = self.metadata().collection(),
            plan = %planned.plan,
            "find_by"
        );

        let ids = self.candidates(&planned.plan)?;
        if planned.residual.is_empty() && order_by.is_empty() {
            return Ok(ResultPage::from_ids(self.clone(), ids, offset, limit));
        }

        let docs = self.manager.find_many::<D>(&ids)?;
        let mut docs = self.retain_matching(docs, &planned.residual)?;
        if !order_by.is_empty() {
            self.sort(&mut docs, order_by)?;
        }
        let total = docs.len();
        let page = slice(docs, offset, limit);
        Ok(ResultPage::loaded(self.clone(), page, total, offset, limit))
    }

    /// Finds the first document matching `criteria`, in id order.
    ///
    /// # Errors
    ///
    /// Same as [`find_by`](Self::find_by).
    pub fn find_one_by(&self, criteria: &Criteria) -> CoreResult<Option<DocRef<D>>> {
        let page = self.find_by(criteria, &[], Some(1), 0)?;
        Ok(page.into_results()?.into_iter().next())
    }

    /// Loads every document of the collection.
    ///
    /// # Errors
    ///
    /// Returns store or hydration errors.
    pub fn find_all(&self) -> CoreResult<Vec<DocRef<D>>> {
        self.find_by(&Criteria::new(), &[], None, 0)?.into_results()
    }

    /// Visits every document matching `criteria` in batches of
    /// `batch_size` (the configured default when zero).
    ///
    /// Tracked instances without pending writes are released after each
    /// batch, so the identity map stays bounded by one batch plus whatever
    /// the callback persists. Returns the number of documents visited.
    ///
    /// # Errors
    ///
    /// Stops at the first error from the store or the callback.
    pub fn stream<F>(&self, criteria: &Criteria, batch_size: usize, mut visit: F) -> CoreResult<usize>
    where
        F: FnMut(DocRef<D>) -> CoreResult<()>,
    {
        self.for_each_batch(criteria, batch_size, |batch| {
            batch.into_iter().try_for_each(&mut visit)
        })
    }

    pub(crate) fn for_each_batch<F>(
        &self,
        criteria: &Criteria,
        batch_size: usize,
        mut visit: F,
    ) -> CoreResult<usize>
    where
        F: FnMut(Vec<DocRef<D>>) -> CoreResult<()>,
    {
        let batch_size = match batch_size {
            0 => self.manager.config().stream_batch_size.max(1),
            n => n,
        };
        let planned = plan_criteria(self.metadata(), self.manager.hydrator(), criteria)?;

        let mut visited = 0;
        let mut run = |chunk: &[String]| -> CoreResult<()> {
            let docs = self.manager.find_many::<D>(chunk)?;
            let docs = self.retain_matching(docs, &planned.residual)?;
            visited += docs.len();
            let result = visit(docs);
            self.manager.release_clean();
            result
        };

        if let Access::CollectionScan { pattern } = &planned.plan.access {
            tracing::debug!(
                collection = self.metadata().collection(),
                batch_size,
                "streaming collection scan"
            );
            self.manager.counters().record_collection_scan();
            let space = self.metadata().keys();
            let mut pending: Vec<String> = Vec::new();
            scan_pages(
                self.manager.adapter().as_ref(),
                pattern,
                self.manager.config().scan_batch_size,
                |keys| {
                    pending.extend(
                        keys.iter()
                            .filter_map(|key| space.id_from_primary(key))
                            .map(str::to_string),
                    );
                    while pending.len() >= batch_size {
                        let chunk: Vec<String> = pending.drain(..batch_size).collect();
                        run(&unique_ids(chunk))?;
                    }
                    Ok(())
                },
            )?;
            if !pending.is_empty() {
                run(&unique_ids(pending))?;
            }
        } else {
            let ids = self.candidates(&planned.plan)?;
            tracing::debug!(
                collection = self.metadata().collection(),
                candidates = ids.len(),
                batch_size,
                "streaming"
            );
            for chunk in ids.chunks(batch_size) {
                run(chunk)?;
            }
        }
        Ok(visited)
    }

    /// Counts the collection's primary keys with a cursor scan.
    ///
    /// # Errors
    ///
    /// Returns store errors.
    pub fn count(&self) -> CoreResult<usize> {
        let pattern = self.metadata().keys().collection_pattern();
        self.manager.counters().record_collection_scan();
        let mut total = 0;
        scan_pages(
            self.manager.adapter().as_ref(),
            &pattern,
            self.manager.config().scan_batch_size,
            |keys| {
                total += keys.len();
                Ok(())
            },
        )?;
        Ok(total)
    }

    /// Candidate ids for a plan, sorted ascending.
    pub(crate) fn candidates(&self, plan: &QueryPlan) -> CoreResult<Vec<String>> {
        let manager = &self.manager;
        let mut ids = match &plan.access {
            Access::IndexLookup { key } => {
                manager.counters().record_index_lookup();
                manager.adapter().smembers(key)?
            }
            Access::IndexIntersection { keys } => {
                manager.counters().record_intersection();
                let temp = self.metadata().keys().temporary();
                let mut pipeline = Pipeline::new();
                pipeline
                    .sinterstore(temp.clone(), keys.clone())
                    .expire(temp.clone(), manager.config().intersection_ttl_secs())
                    .smembers(temp.clone())
                    .del(temp);
                let replies = manager.adapter().execute(pipeline)?;
                replies
                    .into_iter()
                    .nth(2)
                    .map(|reply| reply.into_array())
                    .unwrap_or_default()
            }
            Access::CollectionScan { pattern } => {
                manager.counters().record_collection_scan();
                let keys = scan_keys(manager.adapter().as_ref(), pattern, manager.config().scan_batch_size)?;
                let threshold = manager.config().scan_warning_threshold;
                if threshold > 0 && keys.len() > threshold {
                    tracing::warn!(
                        collection = self.metadata().collection(),
                        keys = keys.len(),
                        threshold,
                        "collection scan exceeded warning threshold"
                    );
                }
                let space = self.metadata().keys();
                keys.iter()
                    .filter_map(|key| space.id_from_primary(key))
                    .map(str::to_string)
                    .collect()
            }
        };
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    pub(crate) fn retain_matching(
        &self,
        docs: Vec<DocRef<D>>,
        residual: &[Residual],
    ) -> CoreResult<Vec<DocRef<D>>> {
        if residual.is_empty() {
            return Ok(docs);
        }
        let accessors = self.doc_type.accessors();
        let hydrator = self.manager.hydrator();
        let mut kept = Vec::with_capacity(docs.len());
        for doc in docs {
            let mut matched = true;
            for term in residual {
                let actual = accessors.get(&doc.read(), &term.field)?;
                if !term.matches(hydrator, &actual)? {
                    matched = false;
                    break;
                }
            }
            if matched {
                kept.push(doc);
            }
        }
        Ok(kept)
    }

    /// Stable client-side sort.
    pub(crate) fn sort(&self, docs: &mut Vec<DocRef<D>>, order_by: &[OrderBy]) -> CoreResult<()> {
        let accessors = self.doc_type.accessors();
        let mut rows: Vec<(Vec<Value>, DocRef<D>)> = Vec::with_capacity(docs.len());
        for doc in docs.drain(..) {
            let values = {
                let guard = doc.read();
                order_by
                    .iter()
                    .map(|order| accessors.get(&guard, order.field()))
                    .collect::<CoreResult<Vec<_>>>()?
            };
            rows.push((values, doc));
        }
        rows.sort_by(|(a, _), (b, _)| compare_rows(order_by, a, b));
        docs.extend(rows.into_iter().map(|(_, doc)| doc));
        Ok(())
    }
}

pub(crate) fn slice<T>(items: Vec<T>, offset: usize, limit: Option<usize>) -> Vec<T> {
    items
        .into_iter()
        .skip(offset)
        .take(limit.unwrap_or(usize::MAX))
        .collect()
}

/// Sorts and deduplicates one scan-driven batch; keys may repeat across
/// scan steps.
fn unique_ids(mut ids: Vec<String>) -> Vec<String> {
    ids.sort_unstable();
    ids.dedup();
    ids
}

pub(crate) fn unknown_sorted_index(metadata: &ClassMetadata, field: &str) -> CoreError {
    CoreError::invalid_query(format!(
        "{} has no sorted index on {field:?}",
        metadata.collection()
    ))
}
