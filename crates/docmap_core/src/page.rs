//! Result pages with lazy hydration and field projection.

use crate::document::{DocRef, Document};
use crate::error::CoreResult;
use crate::hydrate::RawDocument;
use crate::metadata::{FieldMetadata, StorageEncoding};
use crate::repository::{slice, Repository};
use docmap_codec::decode_document;
use docmap_store::Pipeline;
use std::collections::BTreeMap;
use std::fmt;

/// One projected row: property name to store-form value.
pub type PluckRow = BTreeMap<String, Option<String>>;

/// An ordered page of query results.
///
/// Ids are known up front; documents are loaded on the first call to
/// [`results`](Self::results) and cached.
pub struct ResultPage<D> {
    repository: Repository<D>,
    ids: Vec<String>,
    docs: Option<Vec<DocRef<D>>>,
    total: usize,
    /// Candidates consumed from the source, before client-side filtering.
    consumed: usize,
    offset: usize,
    limit: Option<usize>,
    total_is_exact: bool,
}

impl<D: Document> ResultPage<D> {
    /// Slices an unfiltered id list.
    pub(crate) fn from_ids(
        repository: Repository<D>,
        ids: Vec<String>,
        offset: usize,
        limit: Option<usize>,
    ) -> Self {
        let total = ids.len();
        let ids = slice(ids, offset, limit);
        Self {
            repository,
            consumed: ids.len(),
            ids,
            docs: None,
            total,
            offset,
            limit,
            total_is_exact: true,
        }
    }

    /// Wraps documents already filtered, sorted and sliced.
    pub(crate) fn loaded(
        repository: Repository<D>,
        docs: Vec<DocRef<D>>,
        total: usize,
        offset: usize,
        limit: Option<usize>,
    ) -> Self {
        let ids = ids_of(&repository, &docs);
        Self {
            repository,
            consumed: ids.len(),
            ids,
            docs: Some(docs),
            total,
            offset,
            limit,
            total_is_exact: true,
        }
    }

    /// Wraps ids already paged by the store.
    pub(crate) fn from_range(
        repository: Repository<D>,
        ids: Vec<String>,
        total: usize,
        offset: usize,
        limit: Option<usize>,
    ) -> Self {
        Self {
            repository,
            consumed: ids.len(),
            ids,
            docs: None,
            total,
            offset,
            limit,
            total_is_exact: true,
        }
    }

    /// Wraps a store-paged range whose documents were filtered afterwards.
    pub(crate) fn filtered_range(
        repository: Repository<D>,
        docs: Vec<DocRef<D>>,
        consumed: usize,
        total: usize,
        offset: usize,
        limit: Option<usize>,
        total_is_exact: bool,
    ) -> Self {
        let ids = ids_of(&repository, &docs);
        Self {
            repository,
            ids,
            docs: Some(docs),
            total,
            consumed,
            offset,
            limit,
            total_is_exact,
        }
    }

    /// Ids on this page, in result order.
    #[must_use]
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Matches across all pages.
    ///
    /// For filtered range queries this is the range count before filtering;
    /// see [`total_is_exact`](Self::total_is_exact).
    #[must_use]
    pub const fn total(&self) -> usize {
        self.total
    }

    /// Returns false when [`total`](Self::total) counts documents that a
    /// client-side filter may have rejected.
    #[must_use]
    pub const fn total_is_exact(&self) -> bool {
        self.total_is_exact
    }

    /// Number of ids on this page.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns true if the page is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// The requested offset.
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// The requested limit.
    #[must_use]
    pub const fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Returns true if results remain past this page.
    #[must_use]
    pub fn has_more(&self) -> bool {
        self.offset + self.consumed < self.total
    }

    /// The page's documents, loaded on first call.
    ///
    /// Ids whose records vanished since the page was built are skipped.
    ///
    /// # Errors
    ///
    /// Returns store or hydration errors.
    pub fn results(&mut self) -> CoreResult<&[DocRef<D>]> {
        if self.docs.is_none() {
            let docs = self.repository.manager().find_many::<D>(&self.ids)?;
            self.docs = Some(docs);
        }
        Ok(self.docs.as_deref().unwrap_or_default())
    }

    /// Consumes the page, returning its documents.
    ///
    /// # Errors
    ///
    /// Returns store or hydration errors.
    pub fn into_results(mut self) -> CoreResult<Vec<DocRef<D>>> {
        match self.docs.take() {
            Some(docs) => Ok(docs),
            None => self.repository.manager().find_many::<D>(&self.ids),
        }
    }

    /// Reads `fields` for every id on the page straight from the store,
    /// without hydrating documents.
    ///
    /// Each row always carries the id field. Values are in store form and
    /// missing or null fields are `None`. Ids whose record no longer exists
    /// produce no row.
    ///
    /// # Errors
    ///
    /// Returns `InvalidQuery` for unknown fields, or store errors.
    pub fn pluck(&self, fields: &[&str]) -> CoreResult<Vec<PluckRow>> {
        let metadata = self.repository.metadata();
        let mut wanted: Vec<&FieldMetadata> = vec![metadata.id_field_metadata()];
        for field in fields {
            let meta = metadata.require_field(field)?;
            if !wanted.iter().any(|w| w.name() == meta.name()) {
                wanted.push(meta);
            }
        }
        if self.ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys = metadata.keys();
        let manager = self.repository.manager();
        let mut pipeline = Pipeline::new();
        for id in &self.ids {
            let key = keys.primary(id);
            match metadata.encoding() {
                StorageEncoding::Hash => {
                    let names = wanted.iter().map(|f| f.store_name().to_string()).collect();
                    pipeline.hmget(key, names)
                }
                StorageEncoding::Json => pipeline.get(key),
            };
        }
        let replies = manager.adapter().execute(pipeline)?;

        let mut rows = Vec::with_capacity(replies.len());
        for reply in replies {
            let row = match metadata.encoding() {
                StorageEncoding::Hash => {
                    let values = reply.into_optional_array();
                    if values.first().map_or(true, Option::is_none) {
                        continue;
                    }
                    wanted
                        .iter()
                        .zip(values)
                        .map(|(field, value)| (field.name().to_string(), value))
                        .collect()
                }
                StorageEncoding::Json => {
                    let Some(text) = reply.into_bulk() else {
                        continue;
                    };
                    let raw = RawDocument::Json(decode_document(&text)?);
                    let mut row = PluckRow::new();
                    for field in &wanted {
                        let value = raw.store_value(manager.hydrator(), field)?;
                        row.insert(field.name().to_string(), value);
                    }
                    row
                }
            };
            rows.push(row);
        }
        Ok(rows)
    }
}

fn ids_of<D: Document>(repository: &Repository<D>, docs: &[DocRef<D>]) -> Vec<String> {
    docs.iter()
        .filter_map(|doc| repository.doc_type().current_id(&doc.read()))
        .collect()
}

impl<D> fmt::Debug for ResultPage<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultPage")
            .field("ids", &self.ids)
            .field("total", &self.total)
            .field("offset", &self.offset)
            .field("limit", &self.limit)
            .field("loaded", &self.docs.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::Criteria;
    use crate::test_support::{test_manager, Article, Profile};
    use docmap_store::ClientAdapter;

    #[test]
    fn results_are_loaded_once() {
        let (adapter, manager) = test_manager();
        manager
            .persist(&DocRef::new(Article::new("a1", "t", "tech", 1)))
            .unwrap();
        manager.commit().unwrap();
        manager.clear();

        let repo = manager.repository::<Article>().unwrap();
        let mut page = repo.find_by(&Criteria::new(), &[], None, 0).unwrap();
        adapter.reset_stats();
        let first = page.results().unwrap()[0].clone();
        let second = page.results().unwrap()[0].clone();
        assert!(first.ptr_eq(&second));
        assert_eq!(adapter.stats().pipelines, 1);
    }

    #[test]
    fn pluck_hash_fields_without_hydration() {
        let (_, manager) = test_manager();
        for (id, title) in [("a1", "One"), ("a2", "Two")] {
            manager
                .persist(&DocRef::new(Article::new(id, title, "tech", 1)))
                .unwrap();
        }
        manager.commit().unwrap();
        manager.clear();

        let page = manager
            .repository::<Article>()
            .unwrap()
            .find_by(&Criteria::new().eq("category", "tech"), &[], None, 0)
            .unwrap();
        let rows = page.pluck(&["title"]).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["id"].as_deref(), Some("a1"));
        assert_eq!(rows[1]["title"].as_deref(), Some("Two"));
        assert_eq!(manager.identity_map_len(), 0);
    }

    #[test]
    fn pluck_json_uses_store_names_and_skips_missing() {
        let (adapter, manager) = test_manager();
        for (id, email) in [("p1", "a@x"), ("p2", "b@x")] {
            manager
                .persist(&DocRef::new(Profile::new(id, email, None)))
                .unwrap();
        }
        manager.commit().unwrap();

        let page = manager
            .repository::<Profile>()
            .unwrap()
            .find_by(&Criteria::new(), &[], None, 0)
            .unwrap();
        adapter.del(&["app:profiles:p2".to_string()]).unwrap();

        let rows = page.pluck(&["email", "nickname", "visits"]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["email"].as_deref(), Some("a@x"));
        assert_eq!(rows[0]["nickname"], None);
        assert_eq!(rows[0]["visits"].as_deref(), Some("0"));
    }

    #[test]
    fn pluck_rejects_unknown_fields() {
        let (_, manager) = test_manager();
        let page = manager
            .repository::<Article>()
            .unwrap()
            .find_by(&Criteria::new(), &[], None, 0)
            .unwrap();
        assert!(page.pluck(&["nope"]).is_err());
    }
}
