//! Per-type descriptor cache.

use crate::document::{Document, FieldAccessors};
use crate::error::{CoreError, CoreResult};
use crate::metadata::{ClassMetadata, KeySpace};
use docmap_codec::Value;
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Everything docmap knows about document type `D`.
pub struct DocumentType<D> {
    metadata: Arc<ClassMetadata>,
    accessors: FieldAccessors<D>,
}

impl<D> DocumentType<D> {
    /// The type descriptor.
    #[must_use]
    pub fn metadata(&self) -> &Arc<ClassMetadata> {
        &self.metadata
    }

    /// The accessor table.
    #[must_use]
    pub fn accessors(&self) -> &FieldAccessors<D> {
        &self.accessors
    }

    /// Key layout of the collection.
    #[must_use]
    pub fn keys(&self) -> &KeySpace {
        self.metadata.keys()
    }
}

impl<D: Document> DocumentType<D> {
    /// Reads the instance's id, if it has one.
    pub fn current_id(&self, doc: &D) -> Option<String> {
        self.accessors
            .get(doc, self.metadata.id_field())
            .ok()
            .and_then(|v| v.to_id_string())
    }

    /// Writes a generated id into the instance.
    pub(crate) fn assign_id(&self, doc: &mut D, id: &str) -> CoreResult<()> {
        self.accessors
            .set(doc, self.metadata.id_field(), Value::Text(id.to_string()))
    }
}

impl<D> fmt::Debug for DocumentType<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentType")
            .field("collection", &self.metadata.collection())
            .field("accessors", &self.accessors)
            .finish()
    }
}

/// Registry of document type descriptors.
///
/// Descriptors are built and validated once per type and shared by every
/// manager holding the registry. Registering is idempotent; looking up a
/// type that was never registered is an `UnknownDocumentType` error.
///
/// # Example
///
/// ```rust,ignore
/// let registry = Arc::new(MetadataRegistry::new());
/// registry.register::<Article>()?;
/// let manager = Manager::new(adapter, registry);
/// ```
#[derive(Default)]
pub struct MetadataRegistry {
    types: RwLock<HashMap<TypeId, Registered>>,
}

struct Registered {
    metadata: Arc<ClassMetadata>,
    doc_type: Arc<dyn Any + Send + Sync>,
}

impl Registered {
    fn downcast<D: Document>(&self) -> Option<Arc<DocumentType<D>>> {
        Arc::clone(&self.doc_type).downcast::<DocumentType<D>>().ok()
    }
}

impl MetadataRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds, validates and caches the descriptor of `D`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidMetadata` if the descriptor is inconsistent, lacks
    /// accessors, or reuses another type's collection key space.
    pub fn register<D: Document>(&self) -> CoreResult<Arc<DocumentType<D>>> {
        if let Ok(existing) = self.get::<D>() {
            return Ok(existing);
        }

        let metadata = D::metadata()?;
        let accessors = D::accessors();
        accessors.validate(&metadata)?;

        let mut types = self.types.write();
        // Another thread may have won the race.
        if let Some(doc_type) = types.get(&TypeId::of::<D>()).and_then(Registered::downcast::<D>) {
            return Ok(doc_type);
        }
        let clash = types.values().any(|other| {
            other.metadata.prefix() == metadata.prefix()
                && other.metadata.collection() == metadata.collection()
        });
        if clash {
            return Err(CoreError::invalid_metadata(format!(
                "collection {} is already registered by another type",
                metadata.collection()
            )));
        }

        tracing::debug!(
            collection = metadata.collection(),
            fields = metadata.fields().len(),
            indexes = metadata.indexes().len(),
            sorted_indexes = metadata.sorted_indexes().len(),
            "registered document type"
        );
        let doc_type = Arc::new(DocumentType {
            metadata: Arc::new(metadata),
            accessors,
        });
        types.insert(
            TypeId::of::<D>(),
            Registered {
                metadata: Arc::clone(&doc_type.metadata),
                doc_type: Arc::clone(&doc_type) as Arc<dyn Any + Send + Sync>,
            },
        );
        Ok(doc_type)
    }

    /// Returns the cached descriptor of `D`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownDocumentType` if `D` was never registered.
    pub fn get<D: Document>(&self) -> CoreResult<Arc<DocumentType<D>>> {
        self.types
            .read()
            .get(&TypeId::of::<D>())
            .and_then(Registered::downcast::<D>)
            .ok_or_else(CoreError::unknown_type::<D>)
    }

    /// Returns true if `D` is registered.
    #[must_use]
    pub fn contains<D: Document>(&self) -> bool {
        self.types.read().contains_key(&TypeId::of::<D>())
    }

    /// Drops the cached descriptor of `D`. Returns true if one was cached.
    pub fn invalidate<D: Document>(&self) -> bool {
        self.types.write().remove(&TypeId::of::<D>()).is_some()
    }

    /// Number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.read().len()
    }

    /// Returns true if no type is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.read().is_empty()
    }
}

impl fmt::Debug for MetadataRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataRegistry")
            .field("types", &self.len())
            .finish()
    }
}
