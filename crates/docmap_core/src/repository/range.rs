//! Score-range queries over sorted indexes.
//!
//! Bounds and paging are applied by the store (`ZCOUNT` then
//! `ZRANGEBYSCORE .. LIMIT`, in one pipeline). Extra filters run on the
//! returned page only, so the reported total is the range count before
//! filtering.

use super::plan::{residual_terms, Residual};
use super::{unknown_sorted_index, Criteria, Direction, OrderBy, Repository};
use crate::document::Document;
use crate::error::{CoreError, CoreResult};
use crate::metadata::IndexMetadata;
use crate::page::ResultPage;
use docmap_codec::Value;
use docmap_store::{Command, Pipeline, ScoreBound, ScoreLimit};

/// A bounded, paged walk of one sorted index.
///
/// ```rust,ignore
/// let page = repo
///     .range("score")?
///     .min(10, true)
///     .max(1000, true)
///     .limit(20)
///     .execute()?;
/// ```
#[derive(Debug, Clone)]
pub struct RangeQuery<D> {
    repository: Repository<D>,
    field: String,
    index: IndexMetadata,
    min: Option<(Value, bool)>,
    max: Option<(Value, bool)>,
    criteria: Criteria,
    order_by: Vec<OrderBy>,
    limit: Option<usize>,
    offset: usize,
}

impl<D: Document> RangeQuery<D> {
    pub(crate) fn new(repository: Repository<D>, field: &str) -> CoreResult<Self> {
        let index = repository
            .metadata()
            .sorted_index_for(field)
            .cloned()
            .ok_or_else(|| unknown_sorted_index(repository.metadata(), field))?;
        Ok(Self {
            repository,
            field: field.to_string(),
            index,
            min: None,
            max: None,
            criteria: Criteria::new(),
            order_by: Vec::new(),
            limit: None,
            offset: 0,
        })
    }

    /// Sets the lower bound.
    #[must_use]
    pub fn min(mut self, value: impl Into<Value>, inclusive: bool) -> Self {
        self.min = Some((value.into(), inclusive));
        self
    }

    /// Sets the upper bound.
    #[must_use]
    pub fn max(mut self, value: impl Into<Value>, inclusive: bool) -> Self {
        self.max = Some((value.into(), inclusive));
        self
    }

    /// Adds an equality filter applied to the returned page.
    #[must_use]
    pub fn filter(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.criteria = self.criteria.eq(field, value);
        self
    }

    /// Re-sorts the returned page; without it ids follow ascending score.
    #[must_use]
    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by.push(OrderBy::new(field, direction));
        self
    }

    /// Caps the number of ids fetched.
    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips leading ids in score order.
    #[must_use]
    pub const fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    fn bound(&self, bound: Option<&(Value, bool)>) -> CoreResult<ScoreBound> {
        let Some((value, inclusive)) = bound else {
            return Ok(ScoreBound::Unbounded);
        };
        let score = value.as_score().ok_or_else(|| CoreError::InvalidIndexValue {
            collection: self.repository.metadata().collection().to_string(),
            field: self.field.clone(),
            value: value.to_string(),
        })?;
        Ok(ScoreBound::new(score, *inclusive))
    }

    /// Runs the query.
    ///
    /// # Errors
    ///
    /// - `InvalidIndexValue` for a non-numeric bound
    /// - `InvalidQuery` for unknown filter or sort fields
    /// - store and hydration errors
    pub fn execute(self) -> CoreResult<ResultPage<D>> {
        let metadata = self.repository.metadata();
        let manager = self.repository.manager();
        let min = self.bound(self.min.as_ref())?;
        let max = self.bound(self.max.as_ref())?;
        let residual: Vec<Residual> = residual_terms(metadata, manager.hydrator(), &self.criteria)?;
        for order in &self.order_by {
            metadata.require_field(order.field())?;
        }

        let key = metadata.keys().sorted(self.index.name());
        let limit = (self.offset > 0 || self.limit.is_some())
            .then(|| ScoreLimit::new(self.offset, self.limit));
        let mut pipeline = Pipeline::new();
        pipeline
            .push(Command::ZCount {
                key: key.clone(),
                min,
                max,
            })
            .push(Command::ZRangeByScore {
                key: key.clone(),
                min,
                max,
                limit,
            });
        tracing::debug!(key = %key, ?min, ?max, offset = self.offset, limit = ?self.limit, "range query");
        manager.counters().record_index_lookup();

        let mut replies = manager.adapter().execute(pipeline)?.into_iter();
        let total = replies
            .next()
            .and_then(|reply| reply.as_integer())
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(0);
        let ids = replies.next().map(|reply| reply.into_array()).unwrap_or_default();

        if residual.is_empty() && self.order_by.is_empty() {
            return Ok(ResultPage::from_range(
                self.repository.clone(),
                ids,
                total,
                self.offset,
                self.limit,
            ));
        }

        let fetched = ids.len();
        let docs = manager.find_many::<D>(&ids)?;
        let mut docs = self.repository.retain_matching(docs, &residual)?;
        if !self.order_by.is_empty() {
            self.repository.sort(&mut docs, &self.order_by)?;
        }
        Ok(ResultPage::filtered_range(
            self.repository.clone(),
            docs,
            fetched,
            total,
            self.offset,
            self.limit,
            residual.is_empty(),
        ))
    }
}
