//! Identity map and unit of work.
//!
//! Both are keyed by primary key, so documents of every type share one
//! map. Instances are stored type-erased behind [`TrackedDocument`] and
//! downcast back to `DocRef<D>` on lookup.

use crate::document::{DocRef, Document};
use crate::error::CoreResult;
use crate::hydrate::{extract_fields, Record};
use crate::metadata::{ClassMetadata, DocumentType};
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Type-erased view of a tracked instance.
pub(crate) trait TrackedDocument: Send + Sync {
    fn metadata(&self) -> &Arc<ClassMetadata>;

    fn current_id(&self) -> Option<String>;

    /// Stamps timestamps when `now` is given, then extracts the record.
    fn prepare(&self, now: Option<i64>) -> CoreResult<Record>;

    fn record_ttl(&self) -> Option<u64>;

    fn addr(&self) -> usize;

    fn as_any(&self) -> &dyn Any;
}

pub(crate) struct Tracked<D> {
    doc: DocRef<D>,
    doc_type: Arc<DocumentType<D>>,
}

impl<D: Document> Tracked<D> {
    pub(crate) fn new(doc: DocRef<D>, doc_type: Arc<DocumentType<D>>) -> Arc<dyn TrackedDocument> {
        Arc::new(Self { doc, doc_type })
    }
}

impl<D: Document> TrackedDocument for Tracked<D> {
    fn metadata(&self) -> &Arc<ClassMetadata> {
        self.doc_type.metadata()
    }

    fn current_id(&self) -> Option<String> {
        self.doc_type.current_id(&self.doc.read())
    }

    fn prepare(&self, now: Option<i64>) -> CoreResult<Record> {
        if let Some(now) = now {
            let mut doc = self.doc.write();
            if let Some(stamps) = doc.timestamps() {
                if stamps.created_at().is_none() {
                    stamps.set_created_at(now);
                }
                stamps.set_updated_at(now);
            }
        }
        extract_fields(&self.doc_type, &self.doc.read())
    }

    fn record_ttl(&self) -> Option<u64> {
        self.doc.read().ttl()
    }

    fn addr(&self) -> usize {
        self.doc.addr()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// One loaded or persisted instance.
pub(crate) struct IdentityEntry {
    pub id: String,
    pub doc: Arc<dyn TrackedDocument>,
    /// Field values as last read from or written to the store.
    pub original: Option<Record>,
}

#[derive(Default)]
pub(crate) struct IdentityMap {
    entries: HashMap<String, IdentityEntry>,
    by_addr: HashMap<usize, String>,
}

impl IdentityMap {
    pub fn get(&self, key: &str) -> Option<&IdentityEntry> {
        self.entries.get(key)
    }

    pub fn doc<D: Document>(&self, key: &str) -> Option<DocRef<D>> {
        let entry = self.entries.get(key)?;
        let tracked = entry.doc.as_any().downcast_ref::<Tracked<D>>()?;
        Some(tracked.doc.clone())
    }

    /// Primary key an instance is tracked under.
    pub fn key_of(&self, addr: usize) -> Option<&str> {
        self.by_addr.get(&addr).map(String::as_str)
    }

    pub fn insert(&mut self, key: String, entry: IdentityEntry) {
        if let Some(old) = self.entries.remove(&key) {
            self.by_addr.remove(&old.doc.addr());
        }
        self.by_addr.insert(entry.doc.addr(), key.clone());
        self.entries.insert(key, entry);
    }

    pub fn remove(&mut self, key: &str) -> Option<IdentityEntry> {
        let entry = self.entries.remove(key)?;
        self.by_addr.remove(&entry.doc.addr());
        Some(entry)
    }

    pub fn set_original(&mut self, key: &str, record: Record) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.original = Some(record);
        }
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        let by_addr = &mut self.by_addr;
        self.entries.retain(|key, entry| {
            let kept = keep(key);
            if !kept {
                by_addr.remove(&entry.doc.addr());
            }
            kept
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// A write waiting for the next commit.
#[derive(Clone)]
pub(crate) enum PendingWrite {
    Upsert {
        id: String,
        doc: Arc<dyn TrackedDocument>,
    },
    Delete {
        id: String,
        metadata: Arc<ClassMetadata>,
    },
}

impl PendingWrite {
    /// Returns true if `other` is the same registration (same instance for
    /// upserts).
    pub fn same_as(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Upsert { doc: a, .. }, Self::Upsert { doc: b, .. }) => a.addr() == b.addr(),
            (Self::Delete { id: a, .. }, Self::Delete { id: b, .. }) => a == b,
            _ => false,
        }
    }
}

/// Pending writes in primary-key order.
#[derive(Default)]
pub(crate) struct UnitOfWork {
    pending: BTreeMap<String, PendingWrite>,
}

impl UnitOfWork {
    pub fn register(&mut self, key: String, write: PendingWrite) {
        self.pending.insert(key, write);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.pending.contains_key(key)
    }

    pub fn entries(&self) -> Vec<(String, PendingWrite)> {
        self.pending
            .iter()
            .map(|(key, write)| (key.clone(), write.clone()))
            .collect()
    }

    /// Drops `key` unless it was re-registered since `committed` was taken.
    pub fn settle(&mut self, key: &str, committed: &PendingWrite) {
        if self
            .pending
            .get(key)
            .is_some_and(|current| current.same_as(committed))
        {
            self.pending.remove(key);
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_registry, Article, Profile};

    fn tracked(article: Article) -> (DocRef<Article>, Arc<dyn TrackedDocument>) {
        let registry = test_registry();
        let doc = DocRef::new(article);
        let erased = Tracked::new(doc.clone(), registry.get::<Article>().unwrap());
        (doc, erased)
    }

    #[test]
    fn identity_map_tracks_instances_by_address() {
        let (doc, erased) = tracked(Article::new("a1", "t", "c", 1));
        let mut map = IdentityMap::default();
        map.insert(
            "articles:a1".into(),
            IdentityEntry {
                id: "a1".into(),
                doc: erased,
                original: None,
            },
        );

        assert_eq!(map.key_of(doc.addr()), Some("articles:a1"));
        assert!(map.doc::<Article>("articles:a1").unwrap().ptr_eq(&doc));
        assert!(map.doc::<Profile>("articles:a1").is_none());

        map.remove("articles:a1");
        assert_eq!(map.key_of(doc.addr()), None);
        assert_eq!(map.len(), 0);
    }

    #[test]
    fn retain_keeps_reverse_index_in_sync() {
        let mut map = IdentityMap::default();
        let mut docs = Vec::new();
        for i in 0..4 {
            let (doc, erased) = tracked(Article::new(&format!("a{i}"), "t", "c", i));
            map.insert(
                format!("articles:a{i}"),
                IdentityEntry {
                    id: format!("a{i}"),
                    doc: erased,
                    original: None,
                },
            );
            docs.push(doc);
        }

        map.retain(|key| key.ends_with('0'));
        assert_eq!(map.len(), 1);
        assert!(map.key_of(docs[0].addr()).is_some());
        assert!(map.key_of(docs[1].addr()).is_none());
    }

    #[test]
    fn settle_ignores_reregistered_entries() {
        let (_, first) = tracked(Article::new("a1", "t", "c", 1));
        let (_, second) = tracked(Article::new("a1", "t", "c", 1));
        let mut work = UnitOfWork::default();

        let committed = PendingWrite::Upsert {
            id: "a1".into(),
            doc: first,
        };
        work.register("articles:a1".into(), committed.clone());
        work.register(
            "articles:a1".into(),
            PendingWrite::Upsert {
                id: "a1".into(),
                doc: second,
            },
        );

        work.settle("articles:a1", &committed);
        assert_eq!(work.len(), 1);
    }

    #[test]
    fn prepare_stamps_timestamps_once() {
        let registry = test_registry();
        let doc = DocRef::new(Profile::new("p1", "a@x", None));
        let erased = Tracked::new(doc.clone(), registry.get::<Profile>().unwrap());

        erased.prepare(Some(100)).unwrap();
        erased.prepare(Some(200)).unwrap();
        assert_eq!(doc.read().created_at, Some(100));
        assert_eq!(doc.read().updated_at, Some(200));

        let record = erased.prepare(None).unwrap();
        assert_eq!(record["updated_at"], docmap_codec::Value::DateTime(200));
    }
}
