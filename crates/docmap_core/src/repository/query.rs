//! Fluent criteria queries.

use super::{Criteria, Direction, OrderBy, QueryPlan, Repository};
use crate::document::{DocRef, Document};
use crate::error::CoreResult;
use crate::page::ResultPage;
use docmap_codec::Value;

/// Builds a [`Repository::find_by`] call.
///
/// ```rust,ignore
/// let page = repo
///     .query()
///     .filter("category", "tech")
///     .order_by("score", Direction::Desc)
///     .limit(10)
///     .execute()?;
/// ```
#[derive(Debug, Clone)]
pub struct QueryBuilder<D> {
    repository: Repository<D>,
    criteria: Criteria,
    order_by: Vec<OrderBy>,
    limit: Option<usize>,
    offset: usize,
}

impl<D: Document> QueryBuilder<D> {
    pub(crate) fn new(repository: Repository<D>) -> Self {
        Self {
            repository,
            criteria: Criteria::new(),
            order_by: Vec::new(),
            limit: None,
            offset: 0,
        }
    }

    /// Adds an equality term.
    #[must_use]
    pub fn filter(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.criteria = self.criteria.eq(field, value);
        self
    }

    /// Adds a sort key; earlier keys take precedence.
    #[must_use]
    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by.push(OrderBy::new(field, direction));
        self
    }

    /// Caps the page size.
    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips leading matches.
    #[must_use]
    pub const fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// The accumulated criteria.
    #[must_use]
    pub const fn criteria(&self) -> &Criteria {
        &self.criteria
    }

    /// Describes the access path without running the query.
    ///
    /// # Errors
    ///
    /// Returns `InvalidQuery` for unknown fields.
    pub fn explain(&self) -> CoreResult<QueryPlan> {
        self.repository.explain(&self.criteria)
    }

    /// Runs the query.
    ///
    /// # Errors
    ///
    /// Same as [`Repository::find_by`].
    pub fn execute(self) -> CoreResult<ResultPage<D>> {
        self.repository
            .find_by(&self.criteria, &self.order_by, self.limit, self.offset)
    }

    /// Runs the query and returns the first match.
    ///
    /// # Errors
    ///
    /// Same as [`Repository::find_by`].
    pub fn first(self) -> CoreResult<Option<DocRef<D>>> {
        let page = self.limit(1).execute()?;
        Ok(page.into_results()?.into_iter().next())
    }

    /// Streams matches in batches; ordering and paging are ignored.
    ///
    /// # Errors
    ///
    /// Same as [`Repository::stream`].
    pub fn stream<F>(self, batch_size: usize, visit: F) -> CoreResult<usize>
    where
        F: FnMut(DocRef<D>) -> CoreResult<()>,
    {
        self.repository.stream(&self.criteria, batch_size, visit)
    }
}
