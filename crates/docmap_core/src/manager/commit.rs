//! Commit planning and unique-key checks.
//!
//! A commit runs in three phases:
//!
//! 1. **Plan** reads whatever it needs (snapshots, cleanup scans) and stages
//!    every write without mutating the store.
//! 2. **Check** reads the current owner of each unique key being claimed.
//! 3. **Execute** sends the staged writes as one pipeline.
//!
//! Errors in the first two phases leave the store untouched.

use super::index;
use super::tracking::{PendingWrite, TrackedDocument};
use crate::error::{CoreError, CoreResult};
use crate::hydrate::{encode_primary, store_strings, Encoded, Hydrator, Record, StoreRecord};
use crate::metadata::ClassMetadata;
use crate::scan::scan_keys;
use docmap_codec::Value;
use docmap_store::{ClientAdapter, Pipeline};
use std::collections::HashMap;

/// What a successful commit did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommitSummary {
    /// Documents inserted or updated.
    pub upserted: usize,
    /// Documents deleted.
    pub deleted: usize,
    /// Store commands sent in the execute phase.
    pub commands: usize,
}

impl CommitSummary {
    /// Returns true if nothing was written.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.upserted == 0 && self.deleted == 0
    }
}

/// One unit-of-work entry handed to the planner.
pub(crate) struct PlanEntry {
    pub key: String,
    pub write: PendingWrite,
    pub snapshot: Option<Record>,
}

/// State changes to apply once the pipeline succeeds.
pub(crate) enum Outcome {
    Upserted { key: String, record: Record },
    Deleted { key: String },
}

#[derive(Debug)]
struct UniqueClaim {
    key: String,
    claimant: String,
    collection: String,
    field: String,
    value: String,
}

impl UniqueClaim {
    fn violation(&self, owner: &str) -> CoreError {
        CoreError::UniqueConstraintViolation {
            collection: self.collection.clone(),
            field: self.field.clone(),
            value: self.value.clone(),
            owner: owner.to_string(),
        }
    }
}

/// Staged writes of one commit.
#[derive(Default)]
pub(crate) struct CommitPlan {
    releases: Pipeline,
    claims: Pipeline,
    writes: Pipeline,
    pending_claims: Vec<UniqueClaim>,
    /// Unique key → id giving it up in this commit.
    released: HashMap<String, String>,
    outcomes: Vec<Outcome>,
}

impl CommitPlan {
    /// Unique releases first, then claims, then per-entry writes.
    pub fn into_parts(self) -> (Pipeline, Vec<Outcome>) {
        let mut pipeline = self.releases;
        pipeline.extend(self.claims);
        pipeline.extend(self.writes);
        (pipeline, self.outcomes)
    }

    fn release(&mut self, key: String, id: &str) {
        self.releases.del(key.clone());
        self.released.insert(key, id.to_string());
    }
}

pub(crate) struct Planner<'a> {
    pub adapter: &'a dyn ClientAdapter,
    pub hydrator: &'a dyn Hydrator,
    pub scan_count: usize,
    pub force_rebuild: bool,
    /// Timestamp for `HasTimestamps` documents, if stamping is enabled.
    pub now: Option<i64>,
}

impl Planner<'_> {
    /// Plan phase.
    pub fn plan(&self, entries: &[PlanEntry]) -> CoreResult<CommitPlan> {
        let mut plan = CommitPlan::default();
        for entry in entries {
            match &entry.write {
                PendingWrite::Upsert { id, doc } => {
                    self.plan_upsert(&mut plan, &entry.key, id, doc.as_ref(), entry.snapshot.as_ref())?;
                }
                PendingWrite::Delete { id, metadata } => {
                    self.plan_delete(&mut plan, &entry.key, id, metadata, entry.snapshot.as_ref())?;
                }
            }
        }
        Ok(plan)
    }

    fn plan_upsert(
        &self,
        plan: &mut CommitPlan,
        key: &str,
        id: &str,
        doc: &dyn TrackedDocument,
        snapshot: Option<&Record>,
    ) -> CoreResult<()> {
        let metadata = doc.metadata();
        let current = doc.current_id();
        if current.as_deref() != Some(id) {
            return Err(CoreError::ImmutableIdentity {
                collection: metadata.collection().to_string(),
                registered: id.to_string(),
                current,
            });
        }

        let record = doc.prepare(self.now)?;
        // Bad sorted values surface as InvalidIndexValue, ahead of the codec.
        for field in metadata.sorted_indexes().keys() {
            score_of(metadata, field, record.get(field.as_str()))?;
        }
        let strings = store_strings(metadata, self.hydrator, &record)?;
        let old_strings = snapshot
            .map(|s| store_strings(metadata, self.hydrator, s))
            .transpose()?;
        let keys = metadata.keys();
        let changed = |field: &str| -> bool {
            self.force_rebuild
                || old_strings
                    .as_ref()
                    .map_or(true, |old| old.get(field) != strings.get(field))
        };

        for field in metadata.unique_fields() {
            if !changed(field.name()) {
                continue;
            }
            let new = lookup(&strings, field.name());
            let old = old_strings.as_ref().and_then(|o| lookup(o, field.name()));
            if let Some(old) = old.filter(|old| Some(*old) != new) {
                plan.release(keys.unique(field.store_name(), old), id);
            }
            if let Some(new) = new {
                let unique_key = keys.unique(field.store_name(), new);
                plan.claims.set(unique_key.clone(), id);
                plan.pending_claims.push(UniqueClaim {
                    key: unique_key,
                    claimant: id.to_string(),
                    collection: metadata.collection().to_string(),
                    field: field.store_name().to_string(),
                    value: new.to_string(),
                });
            }
        }

        match encode_primary(metadata, self.hydrator, &record, &strings)? {
            Encoded::Hash(fields) => {
                let field_cleared = old_strings.as_ref().is_some_and(|old| {
                    old.iter()
                        .any(|(name, value)| value.is_some() && lookup(&strings, name).is_none())
                });
                if field_cleared {
                    plan.writes.del(key);
                }
                plan.writes.hset_many(key, fields);
            }
            Encoded::Json(text) => {
                plan.writes.set(key, text);
            }
        }
        if let Some(ttl) = doc.record_ttl().or(metadata.ttl()) {
            plan.writes.expire(key, ttl);
        }

        for (field, idx) in metadata.indexes() {
            if !changed(field) {
                continue;
            }
            let new = lookup(&strings, field);
            let old = old_strings.as_ref().and_then(|o| lookup(o, field));
            if let Some(old) = old.filter(|old| Some(*old) != new) {
                index::remove(&mut plan.writes, keys, idx, old, id);
            }
            if let Some(new) = new {
                index::add(&mut plan.writes, keys, idx, new, id);
            }
        }

        for (field, idx) in metadata.sorted_indexes() {
            if !changed(field) {
                continue;
            }
            match score_of(metadata, field, record.get(field.as_str()))? {
                Some(score) => index::add_sorted(&mut plan.writes, keys, idx, score, id),
                None if snapshot.is_some() => index::remove_sorted(&mut plan.writes, keys, idx, id),
                None => {}
            }
        }

        plan.outcomes.push(Outcome::Upserted {
            key: key.to_string(),
            record,
        });
        Ok(())
    }

    fn plan_delete(
        &self,
        plan: &mut CommitPlan,
        key: &str,
        id: &str,
        metadata: &ClassMetadata,
        snapshot: Option<&Record>,
    ) -> CoreResult<()> {
        plan.writes.del(key);
        match snapshot {
            Some(snapshot) => self.release_from_snapshot(plan, id, metadata, snapshot)?,
            None => self.release_by_scan(plan, id, metadata)?,
        }
        plan.outcomes.push(Outcome::Deleted {
            key: key.to_string(),
        });
        Ok(())
    }

    fn release_from_snapshot(
        &self,
        plan: &mut CommitPlan,
        id: &str,
        metadata: &ClassMetadata,
        snapshot: &Record,
    ) -> CoreResult<()> {
        let keys = metadata.keys();
        let strings = store_strings(metadata, self.hydrator, snapshot)?;
        for (field, idx) in metadata.indexes() {
            if let Some(value) = lookup(&strings, field) {
                index::remove(&mut plan.writes, keys, idx, value, id);
            }
        }
        for (field, idx) in metadata.sorted_indexes() {
            if snapshot.get(field).and_then(Value::as_score).is_some() {
                index::remove_sorted(&mut plan.writes, keys, idx, id);
            }
        }
        for field in metadata.unique_fields() {
            if let Some(value) = lookup(&strings, field.name()) {
                plan.release(keys.unique(field.store_name(), value), id);
            }
        }
        Ok(())
    }

    /// Removes `id` from every index without knowing its values.
    fn release_by_scan(&self, plan: &mut CommitPlan, id: &str, metadata: &ClassMetadata) -> CoreResult<()> {
        let keys = metadata.keys();
        tracing::debug!(
            collection = metadata.collection(),
            id,
            "no snapshot for deleted document, scanning index families"
        );

        for idx in metadata.indexes().values() {
            for set_key in scan_keys(self.adapter, &keys.index_pattern(idx.name()), self.scan_count)? {
                plan.writes.srem(set_key.clone(), [id]);
                if let Some(ttl) = idx.ttl_secs() {
                    plan.writes.expire(set_key, ttl);
                }
            }
        }
        for idx in metadata.sorted_indexes().values() {
            index::remove_sorted(&mut plan.writes, keys, idx, id);
        }

        for field in metadata.unique_fields() {
            let claim_keys = scan_keys(self.adapter, &keys.unique_pattern(field.store_name()), self.scan_count)?;
            if claim_keys.is_empty() {
                continue;
            }
            let mut reads = Pipeline::new();
            for claim_key in &claim_keys {
                reads.get(claim_key);
            }
            let owners = self.adapter.execute(reads)?;
            for (claim_key, owner) in claim_keys.into_iter().zip(owners) {
                if owner.into_bulk().as_deref() == Some(id) {
                    plan.release(claim_key, id);
                }
            }
        }
        Ok(())
    }

    /// Check phase.
    pub fn check(&self, plan: &CommitPlan) -> CoreResult<()> {
        if plan.pending_claims.is_empty() {
            return Ok(());
        }

        let mut claimed: HashMap<&str, &str> = HashMap::new();
        for claim in &plan.pending_claims {
            if let Some(other) = claimed.insert(&claim.key, &claim.claimant) {
                if other != claim.claimant {
                    return Err(claim.violation(other));
                }
            }
        }

        let mut reads = Pipeline::new();
        for claim in &plan.pending_claims {
            reads.get(&claim.key);
        }
        let owners = self.adapter.execute(reads)?;
        for (claim, owner) in plan.pending_claims.iter().zip(owners) {
            let Some(owner) = owner.into_bulk() else {
                continue;
            };
            let releasing = plan.released.get(&claim.key) == Some(&owner);
            if owner != claim.claimant && !releasing {
                return Err(claim.violation(&owner));
            }
        }
        Ok(())
    }
}

fn lookup<'r>(strings: &'r StoreRecord, field: &str) -> Option<&'r str> {
    strings.get(field)?.as_deref()
}

fn score_of(metadata: &ClassMetadata, field: &str, value: Option<&Value>) -> CoreResult<Option<f64>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value.as_score().map(Some).ok_or_else(|| CoreError::InvalidIndexValue {
            collection: metadata.collection().to_string(),
            field: field.to_string(),
            value: value.to_string(),
        }),
    }
}
