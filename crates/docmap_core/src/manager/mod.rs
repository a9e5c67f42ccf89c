//! The document manager.
//!
//! [`Manager`] owns the identity map (one instance per loaded id), the unit
//! of work (pending persists and removes) and the commit algorithm that
//! turns the unit of work into one store pipeline.
//!
//! ## Concurrency
//!
//! All methods take `&self`. The identity map and unit of work live behind
//! one short-lived mutex that is never held across store round trips or
//! user callbacks; a second mutex serializes commits.

mod commit;
mod index;
mod tracking;
#[cfg(test)]
mod tests;

pub use commit::CommitSummary;

use crate::config::ManagerConfig;
use crate::document::{DocRef, Document};
use crate::error::{CoreError, CoreResult};
use crate::hydrate::{build_instance, extract_fields, Hydrator, RawDocument, StandardHydrator};
use crate::metadata::{
    ClassMetadata, DocumentType, IdStrategy, IndexMetadata, MetadataRegistry, StorageEncoding,
};
use crate::repository::Repository;
use crate::stats::{ManagerStats, StatsSnapshot};
use commit::{Outcome, PlanEntry, Planner};
use docmap_codec::Value;
use docmap_store::{ClientAdapter, Pipeline};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracking::{IdentityEntry, IdentityMap, PendingWrite, Tracked, UnitOfWork};
use uuid::Uuid;

#[derive(Default)]
struct Tracking {
    identity: IdentityMap,
    work: UnitOfWork,
    force_rebuild: bool,
}

/// Identity map, unit of work and commit over a [`ClientAdapter`].
///
/// # Example
///
/// ```rust,ignore
/// let manager = Arc::new(Manager::new(adapter, registry));
///
/// let article = DocRef::new(Article::new("Rust", "tech"));
/// manager.persist(&article)?;
/// manager.commit()?;
///
/// let again = manager.find::<Article>(&id)?.unwrap();
/// assert!(again.ptr_eq(&article));
/// ```
pub struct Manager {
    adapter: Arc<dyn ClientAdapter>,
    registry: Arc<MetadataRegistry>,
    hydrator: Arc<dyn Hydrator>,
    config: ManagerConfig,
    stats: ManagerStats,
    state: Mutex<Tracking>,
    commit_lock: Mutex<()>,
}

impl Manager {
    /// Creates a manager with the standard hydrator and default config.
    pub fn new(adapter: Arc<dyn ClientAdapter>, registry: Arc<MetadataRegistry>) -> Self {
        Self {
            adapter,
            registry,
            hydrator: Arc::new(StandardHydrator),
            config: ManagerConfig::default(),
            stats: ManagerStats::new(),
            state: Mutex::new(Tracking::default()),
            commit_lock: Mutex::new(()),
        }
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn with_config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the hydrator.
    #[must_use]
    pub fn with_hydrator(mut self, hydrator: Arc<dyn Hydrator>) -> Self {
        self.hydrator = hydrator;
        self
    }

    /// The underlying adapter.
    #[must_use]
    pub fn adapter(&self) -> &Arc<dyn ClientAdapter> {
        &self.adapter
    }

    /// The descriptor registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<MetadataRegistry> {
        &self.registry
    }

    /// The hydrator.
    #[must_use]
    pub fn hydrator(&self) -> &dyn Hydrator {
        self.hydrator.as_ref()
    }

    /// The configuration.
    #[must_use]
    pub const fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// A snapshot of runtime counters.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub(crate) const fn counters(&self) -> &ManagerStats {
        &self.stats
    }

    /// Returns a repository for `D`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownDocumentType` if `D` is not registered.
    pub fn repository<D: Document>(self: &Arc<Self>) -> CoreResult<Repository<D>> {
        Ok(Repository::new(Arc::clone(self), self.doc_type::<D>()?))
    }

    pub(crate) fn doc_type<D: Document>(&self) -> CoreResult<Arc<DocumentType<D>>> {
        self.registry.get::<D>()
    }

    // === Identity map ===

    /// Finds a document by id.
    ///
    /// Returns the identity-mapped instance when one is tracked; otherwise
    /// loads, hydrates and tracks the stored record.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read or hydration fails.
    pub fn find<D: Document>(&self, id: &str) -> CoreResult<Option<DocRef<D>>> {
        let doc_type = self.doc_type::<D>()?;
        let key = doc_type.keys().primary(id);
        if let Some(doc) = self.state.lock().identity.doc::<D>(&key) {
            tracing::trace!(key = %key, "identity map hit");
            self.stats.record_identity_hit();
            return Ok(Some(doc));
        }

        let raw = self.load_raw(doc_type.metadata(), std::slice::from_ref(&key))?;
        match raw.into_iter().next().flatten() {
            Some(raw) => {
                self.stats.record_loads(1);
                self.attach(&doc_type, key, id, &raw).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Finds several documents by id, preserving input order.
    ///
    /// Missing ids are skipped. Ids not in the identity map are fetched in
    /// one pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read or hydration fails.
    pub fn find_many<D: Document>(&self, ids: &[String]) -> CoreResult<Vec<DocRef<D>>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let doc_type = self.doc_type::<D>()?;
        let keys: Vec<String> = ids.iter().map(|id| doc_type.keys().primary(id)).collect();

        let mut found: Vec<Option<DocRef<D>>> = vec![None; ids.len()];
        {
            let state = self.state.lock();
            for (slot, key) in found.iter_mut().zip(&keys) {
                *slot = state.identity.doc::<D>(key);
            }
        }

        let misses: Vec<usize> = (0..ids.len()).filter(|&i| found[i].is_none()).collect();
        let hits = ids.len() - misses.len();
        for _ in 0..hits {
            self.stats.record_identity_hit();
        }
        if !misses.is_empty() {
            let miss_keys: Vec<String> = misses.iter().map(|&i| keys[i].clone()).collect();
            let raws = self.load_raw(doc_type.metadata(), &miss_keys)?;
            let mut loaded = 0;
            for (i, raw) in misses.into_iter().zip(raws) {
                if let Some(raw) = raw {
                    found[i] = Some(self.attach(&doc_type, keys[i].clone(), &ids[i], &raw)?);
                    loaded += 1;
                }
            }
            self.stats.record_loads(loaded);
        }
        Ok(found.into_iter().flatten().collect())
    }

    /// Reads primary records in one pipeline; `None` marks a missing record.
    fn load_raw(&self, metadata: &ClassMetadata, keys: &[String]) -> CoreResult<Vec<Option<RawDocument>>> {
        let mut pipeline = Pipeline::new();
        for key in keys {
            match metadata.encoding() {
                StorageEncoding::Hash => pipeline.hgetall(key),
                StorageEncoding::Json => pipeline.get(key),
            };
        }
        let replies = self.adapter.execute(pipeline)?;
        replies
            .into_iter()
            .map(|reply| match metadata.encoding() {
                StorageEncoding::Hash => Ok(RawDocument::from_hash(reply.into_hash())),
                StorageEncoding::Json => RawDocument::from_json_text(reply.into_bulk()),
            })
            .collect()
    }

    /// Hydrates a raw record and tracks it, unless another thread already
    /// tracked the same key.
    fn attach<D: Document>(
        &self,
        doc_type: &Arc<DocumentType<D>>,
        key: String,
        id: &str,
        raw: &RawDocument,
    ) -> CoreResult<DocRef<D>> {
        let mut doc: D = build_instance(doc_type, self.hydrator.as_ref(), raw)?;
        if doc_type.current_id(&doc).is_none() {
            let id_field = doc_type.metadata().id_field_metadata();
            let value = self.hydrator.to_native(id, id_field.field_type())?;
            doc_type.accessors().set(&mut doc, id_field.name(), value)?;
        }
        let record = extract_fields(doc_type, &doc)?;
        let doc = DocRef::new(doc);

        let mut state = self.state.lock();
        if let Some(existing) = state.identity.doc::<D>(&key) {
            return Ok(existing);
        }
        state.identity.insert(
            key,
            IdentityEntry {
                id: id.to_string(),
                doc: Tracked::new(doc.clone(), Arc::clone(doc_type)),
                original: Some(record),
            },
        );
        Ok(doc)
    }

    // === Unit of work ===

    /// Registers a document for insert or update on the next commit.
    ///
    /// Documents without an id get a generated one under the `Auto`
    /// strategy; the id is written into the instance immediately.
    ///
    /// # Errors
    ///
    /// - `MissingIdentity` if there is no id and the strategy does not
    ///   generate one
    /// - `ImmutableIdentity` if the instance is tracked under another id
    /// - `DuplicateIdentity` if another instance or an existing stored
    ///   record already holds the id
    pub fn persist<D: Document>(&self, doc: &DocRef<D>) -> CoreResult<()> {
        let doc_type = self.doc_type::<D>()?;
        let metadata = doc_type.metadata();

        let current = doc_type.current_id(&doc.read());
        let (id, generated) = match current {
            Some(id) => (id, false),
            None if metadata.id_strategy() == IdStrategy::Auto => {
                let id = Uuid::new_v4().simple().to_string();
                doc_type.assign_id(&mut doc.write(), &id)?;
                (id, true)
            }
            None => return Err(CoreError::missing_identity(metadata.collection())),
        };
        let key = doc_type.keys().primary(&id);

        let owned = ownership(&self.state.lock().identity, metadata, &key, &id, doc.addr())?;
        if !owned && !generated && self.adapter.exists(&key)? {
            return Err(CoreError::duplicate_identity(metadata.collection(), id));
        }

        let mut state = self.state.lock();
        let owned = ownership(&state.identity, metadata, &key, &id, doc.addr())?;
        let existing = if owned {
            state.identity.get(&key).map(|entry| Arc::clone(&entry.doc))
        } else {
            None
        };
        let tracked = match existing {
            Some(tracked) => tracked,
            None => {
                let tracked = Tracked::new(doc.clone(), Arc::clone(&doc_type));
                state.identity.insert(
                    key.clone(),
                    IdentityEntry {
                        id: id.clone(),
                        doc: Arc::clone(&tracked),
                        original: None,
                    },
                );
                tracked
            }
        };
        tracing::debug!(key = %key, "persist registered");
        state
            .work
            .register(key, PendingWrite::Upsert { id, doc: tracked });
        Ok(())
    }

    /// Registers a document for deletion on the next commit.
    ///
    /// A document without an id was never stored; removing it is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `ImmutableIdentity` if a tracked instance's id was changed.
    pub fn remove<D: Document>(&self, doc: &DocRef<D>) -> CoreResult<()> {
        let doc_type = self.doc_type::<D>()?;
        let metadata = doc_type.metadata();
        let current = doc_type.current_id(&doc.read());

        let mut state = self.state.lock();
        let tracked = state
            .identity
            .key_of(doc.addr())
            .and_then(|key| state.identity.get(key).map(|entry| (key.to_string(), entry.id.clone())));
        let (key, id) = match (tracked, current) {
            (Some((key, id)), current) => {
                if current.as_deref() != Some(id.as_str()) {
                    return Err(CoreError::ImmutableIdentity {
                        collection: metadata.collection().to_string(),
                        registered: id,
                        current,
                    });
                }
                (key, id)
            }
            (None, Some(id)) => (doc_type.keys().primary(&id), id),
            (None, None) => return Ok(()),
        };
        tracing::debug!(key = %key, "remove registered");
        state.work.register(
            key,
            PendingWrite::Delete {
                id,
                metadata: Arc::clone(metadata),
            },
        );
        Ok(())
    }

    /// Discards the identity map, unit of work, snapshots and the
    /// force-rebuild flag. The store is not touched.
    pub fn clear(&self) {
        *self.state.lock() = Tracking::default();
    }

    /// Forgets tracked instances that have no pending write.
    pub(crate) fn release_clean(&self) {
        let mut state = self.state.lock();
        let Tracking { identity, work, .. } = &mut *state;
        identity.retain(|key| work.contains(key));
    }

    /// Makes the next commit rewrite every index of every pending document,
    /// changed or not.
    pub fn set_force_rebuild(&self, enabled: bool) {
        self.state.lock().force_rebuild = enabled;
    }

    /// Number of tracked instances.
    #[must_use]
    pub fn identity_map_len(&self) -> usize {
        self.state.lock().identity.len()
    }

    /// Number of pending writes.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.state.lock().work.len()
    }

    /// Returns true if this exact instance is tracked.
    #[must_use]
    pub fn is_tracked<D>(&self, doc: &DocRef<D>) -> bool {
        self.state.lock().identity.key_of(doc.addr()).is_some()
    }

    // === Commit ===

    /// Flushes the unit of work.
    ///
    /// An empty unit of work returns an empty summary without store
    /// traffic. Otherwise the plan and check phases run first; any error
    /// there aborts before the store is written.
    ///
    /// # Errors
    ///
    /// - `UniqueConstraintViolation` if a unique value is owned by another
    ///   document
    /// - `ImmutableIdentity` if a pending instance's id changed
    /// - `InvalidIndexValue` if a sorted index receives a non-numeric value
    /// - store errors; after an execute-phase failure the unit of work is
    ///   kept and the store may be partially written
    pub fn commit(&self) -> CoreResult<CommitSummary> {
        let _commit = self.commit_lock.lock();

        let (entries, force_rebuild) = {
            let state = self.state.lock();
            if state.work.is_empty() {
                return Ok(CommitSummary::default());
            }
            let entries: Vec<PlanEntry> = state
                .work
                .entries()
                .into_iter()
                .map(|(key, write)| {
                    let snapshot = state.identity.get(&key).and_then(|e| e.original.clone());
                    PlanEntry {
                        key,
                        write,
                        snapshot,
                    }
                })
                .collect();
            (entries, state.force_rebuild)
        };

        let planner = Planner {
            adapter: self.adapter.as_ref(),
            hydrator: self.hydrator.as_ref(),
            scan_count: self.config.scan_batch_size,
            force_rebuild,
            now: self.config.generate_timestamps.then(now_secs),
        };
        tracing::debug!(entries = entries.len(), force_rebuild, "planning commit");
        let planned = planner.plan(&entries).and_then(|plan| {
            planner.check(&plan)?;
            Ok(plan)
        });
        let plan = match planned {
            Ok(plan) => plan,
            Err(err) => {
                self.stats.record_rejected_commit();
                tracing::warn!(error = %err, "commit rejected");
                return Err(err);
            }
        };

        let (pipeline, outcomes) = plan.into_parts();
        let commands = pipeline.len();
        tracing::debug!(commands, "executing commit pipeline");
        self.adapter.execute(pipeline)?;

        let mut summary = CommitSummary {
            commands,
            ..CommitSummary::default()
        };
        let mut state = self.state.lock();
        for outcome in outcomes {
            match outcome {
                Outcome::Upserted { key, record } => {
                    state.identity.set_original(&key, record);
                    summary.upserted += 1;
                }
                Outcome::Deleted { key } => {
                    state.identity.remove(&key);
                    summary.deleted += 1;
                }
            }
        }
        for entry in &entries {
            state.work.settle(&entry.key, &entry.write);
        }
        state.force_rebuild = false;
        self.stats.record_commit(summary.upserted, summary.deleted);
        Ok(summary)
    }

    // === Index primitives ===

    /// Adds `id` to the secondary index on `field` for `value`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidQuery` if `field` has no secondary index or `value`
    /// is null.
    pub fn add_to_index<D: Document>(&self, field: &str, value: &Value, id: &str) -> CoreResult<()> {
        let doc_type = self.doc_type::<D>()?;
        let metadata = doc_type.metadata();
        let idx = secondary(metadata, field)?;
        let raw = self.index_value(metadata, field, value)?;
        let mut pipeline = Pipeline::new();
        index::add(&mut pipeline, metadata.keys(), idx, &raw, id);
        self.adapter.execute(pipeline)?;
        Ok(())
    }

    /// Removes `id` from the secondary index on `field` for `value`.
    ///
    /// # Errors
    ///
    /// Same as [`add_to_index`](Self::add_to_index).
    pub fn remove_from_index<D: Document>(&self, field: &str, value: &Value, id: &str) -> CoreResult<()> {
        let doc_type = self.doc_type::<D>()?;
        let metadata = doc_type.metadata();
        let idx = secondary(metadata, field)?;
        let raw = self.index_value(metadata, field, value)?;
        let mut pipeline = Pipeline::new();
        index::remove(&mut pipeline, metadata.keys(), idx, &raw, id);
        self.adapter.execute(pipeline)?;
        Ok(())
    }

    /// Scores `id` in the sorted index on `field`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidQuery` if `field` has no sorted index, or
    /// `InvalidIndexValue` for a non-finite score.
    pub fn add_to_sorted_index<D: Document>(&self, field: &str, score: f64, id: &str) -> CoreResult<()> {
        let doc_type = self.doc_type::<D>()?;
        let metadata = doc_type.metadata();
        let idx = sorted(metadata, field)?;
        if !score.is_finite() {
            return Err(CoreError::InvalidIndexValue {
                collection: metadata.collection().to_string(),
                field: field.to_string(),
                value: score.to_string(),
            });
        }
        let mut pipeline = Pipeline::new();
        index::add_sorted(&mut pipeline, metadata.keys(), idx, score, id);
        self.adapter.execute(pipeline)?;
        Ok(())
    }

    /// Removes `id` from the sorted index on `field`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidQuery` if `field` has no sorted index.
    pub fn remove_from_sorted_index<D: Document>(&self, field: &str, id: &str) -> CoreResult<()> {
        let doc_type = self.doc_type::<D>()?;
        let metadata = doc_type.metadata();
        let idx = sorted(metadata, field)?;
        let mut pipeline = Pipeline::new();
        index::remove_sorted(&mut pipeline, metadata.keys(), idx, id);
        self.adapter.execute(pipeline)?;
        Ok(())
    }

    fn index_value(&self, metadata: &ClassMetadata, field: &str, value: &Value) -> CoreResult<String> {
        let meta = metadata.require_field(field)?;
        self.hydrator
            .to_store(value, meta.field_type())?
            .ok_or_else(|| CoreError::invalid_query(format!("null cannot be indexed on {field:?}")))
    }
}

impl fmt::Debug for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Manager")
            .field("registry", &self.registry)
            .field("hydrator", &self.hydrator)
            .field("config", &self.config)
            .field("tracked", &state.identity.len())
            .field("pending", &state.work.len())
            .finish_non_exhaustive()
    }
}

/// Whether the identity map already owns `key` for this instance.
fn ownership(
    identity: &IdentityMap,
    metadata: &ClassMetadata,
    key: &str,
    id: &str,
    addr: usize,
) -> CoreResult<bool> {
    if let Some(tracked_key) = identity.key_of(addr) {
        if tracked_key != key {
            let registered = identity
                .get(tracked_key)
                .map(|entry| entry.id.clone())
                .unwrap_or_default();
            return Err(CoreError::ImmutableIdentity {
                collection: metadata.collection().to_string(),
                registered,
                current: Some(id.to_string()),
            });
        }
        return Ok(true);
    }
    if identity.get(key).is_some() {
        return Err(CoreError::duplicate_identity(metadata.collection(), id));
    }
    Ok(false)
}

fn secondary<'m>(metadata: &'m ClassMetadata, field: &str) -> CoreResult<&'m IndexMetadata> {
    metadata.index_for(field).ok_or_else(|| {
        CoreError::invalid_query(format!(
            "{} has no secondary index on {field:?}",
            metadata.collection()
        ))
    })
}

fn sorted<'m>(metadata: &'m ClassMetadata, field: &str) -> CoreResult<&'m IndexMetadata> {
    metadata.sorted_index_for(field).ok_or_else(|| {
        CoreError::invalid_query(format!(
            "{} has no sorted index on {field:?}",
            metadata.collection()
        ))
    })
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
}
