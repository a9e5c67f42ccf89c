//! Document type descriptors.
//!
//! A [`ClassMetadata`] describes how one document type maps onto the
//! store: its collection, key prefix, encoding, identity, fields and
//! indexes. Descriptors are immutable once built and validated, and the
//! [`MetadataRegistry`] caches one per type.

mod keys;
mod registry;

pub use keys::KeySpace;
pub use registry::{DocumentType, MetadataRegistry};

use crate::error::{CoreError, CoreResult};
use docmap_codec::FieldType;
use std::collections::{BTreeMap, HashSet};

/// Collection names that would collide with index key families.
const RESERVED_COLLECTIONS: [&str; 4] = ["idx", "zidx", "unq", "tmp"];

/// How a document's fields are laid out under its primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageEncoding {
    /// One hash field per document field; null fields are absent.
    #[default]
    Hash,
    /// One JSON object string; null fields are `null`.
    Json,
}

/// How document ids are assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdStrategy {
    /// A UUID v4 (simple form) is generated at first persist.
    #[default]
    Auto,
    /// The caller supplies the id; persisting over an existing record fails.
    Manual,
    /// No generator is attached; ids are caller-supplied and checked like
    /// `Manual` ones.
    None,
}

/// Descriptor of one document field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMetadata {
    name: String,
    store_name: String,
    ty: FieldType,
    nullable: bool,
    unique: bool,
}

impl FieldMetadata {
    /// Creates a non-nullable, non-unique field stored under its own name.
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        let name = name.into();
        Self {
            store_name: name.clone(),
            name,
            ty,
            nullable: false,
            unique: false,
        }
    }

    /// Stores the field under a different name.
    #[must_use]
    pub fn store_as(mut self, store_name: impl Into<String>) -> Self {
        self.store_name = store_name.into();
        self
    }

    /// Allows null values.
    #[must_use]
    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Enforces that at most one document holds each value.
    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Property name used by accessors and queries.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the field in the store.
    #[must_use]
    pub fn store_name(&self) -> &str {
        &self.store_name
    }

    /// Declared semantic type.
    #[must_use]
    pub const fn field_type(&self) -> FieldType {
        self.ty
    }

    /// Whether null is allowed.
    #[must_use]
    pub const fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// Whether values are unique across the collection.
    #[must_use]
    pub const fn is_unique(&self) -> bool {
        self.unique
    }
}

/// A named index, optionally expiring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMetadata {
    name: String,
    ttl: Option<u64>,
}

impl IndexMetadata {
    /// Creates a non-expiring index.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ttl: None,
        }
    }

    /// Refreshes the index structure's TTL on every write.
    #[must_use]
    pub const fn ttl(mut self, seconds: u64) -> Self {
        self.ttl = Some(seconds);
        self
    }

    /// Index name used in keys.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// TTL in seconds, if any.
    #[must_use]
    pub const fn ttl_secs(&self) -> Option<u64> {
        self.ttl
    }
}

impl From<&str> for IndexMetadata {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Descriptor of one document type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassMetadata {
    collection: String,
    prefix: Option<String>,
    encoding: StorageEncoding,
    id_field: String,
    id_position: usize,
    id_strategy: IdStrategy,
    ttl: Option<u64>,
    fields: Vec<FieldMetadata>,
    indexes: BTreeMap<String, IndexMetadata>,
    sorted_indexes: BTreeMap<String, IndexMetadata>,
    keys: KeySpace,
}

impl ClassMetadata {
    /// Starts a descriptor for `collection`.
    pub fn builder(collection: impl Into<String>) -> ClassMetadataBuilder {
        ClassMetadataBuilder {
            collection: collection.into(),
            prefix: None,
            encoding: StorageEncoding::default(),
            id: None,
            ttl: None,
            fields: Vec::new(),
            indexes: Vec::new(),
            sorted_indexes: Vec::new(),
        }
    }

    /// Collection name.
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Key prefix, if any.
    #[must_use]
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Storage encoding.
    #[must_use]
    pub const fn encoding(&self) -> StorageEncoding {
        self.encoding
    }

    /// Property name of the id field.
    #[must_use]
    pub fn id_field(&self) -> &str {
        &self.id_field
    }

    /// Descriptor of the id field.
    #[must_use]
    pub fn id_field_metadata(&self) -> &FieldMetadata {
        &self.fields[self.id_position]
    }

    /// Id generation strategy.
    #[must_use]
    pub const fn id_strategy(&self) -> IdStrategy {
        self.id_strategy
    }

    /// Default record TTL in seconds.
    #[must_use]
    pub const fn ttl(&self) -> Option<u64> {
        self.ttl
    }

    /// Fields in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[FieldMetadata] {
        &self.fields
    }

    /// Looks up a field by property name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldMetadata> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Looks up a field, failing with `InvalidQuery` when absent.
    pub fn require_field(&self, name: &str) -> CoreResult<&FieldMetadata> {
        self.field(name).ok_or_else(|| {
            CoreError::invalid_query(format!(
                "collection {} has no field {name:?}",
                self.collection
            ))
        })
    }

    /// Secondary indexes keyed by field property name.
    #[must_use]
    pub fn indexes(&self) -> &BTreeMap<String, IndexMetadata> {
        &self.indexes
    }

    /// Secondary index on `field`, if any.
    #[must_use]
    pub fn index_for(&self, field: &str) -> Option<&IndexMetadata> {
        self.indexes.get(field)
    }

    /// Sorted indexes keyed by field property name.
    #[must_use]
    pub fn sorted_indexes(&self) -> &BTreeMap<String, IndexMetadata> {
        &self.sorted_indexes
    }

    /// Sorted index on `field`, if any.
    #[must_use]
    pub fn sorted_index_for(&self, field: &str) -> Option<&IndexMetadata> {
        self.sorted_indexes.get(field)
    }

    /// Fields carrying a unique constraint.
    pub fn unique_fields(&self) -> impl Iterator<Item = &FieldMetadata> {
        self.fields.iter().filter(|f| f.unique)
    }

    /// Key layout for this collection.
    #[must_use]
    pub const fn keys(&self) -> &KeySpace {
        &self.keys
    }
}

/// Builder for [`ClassMetadata`].
///
/// # Example
///
/// ```rust
/// use docmap_codec::FieldType;
/// use docmap_core::{ClassMetadata, FieldMetadata, IdStrategy, IndexMetadata};
///
/// let meta = ClassMetadata::builder("articles")
///     .prefix("blog")
///     .id("id", IdStrategy::Auto)
///     .field(FieldMetadata::new("id", FieldType::String))
///     .field(FieldMetadata::new("category", FieldType::String))
///     .field(FieldMetadata::new("score", FieldType::Integer))
///     .index("category", "by_category")
///     .sorted_index("score", IndexMetadata::new("by_score").ttl(3600))
///     .build()
///     .unwrap();
///
/// assert_eq!(meta.keys().primary("1"), "blog:articles:1");
/// ```
#[derive(Debug, Clone)]
#[must_use]
pub struct ClassMetadataBuilder {
    collection: String,
    prefix: Option<String>,
    encoding: StorageEncoding,
    id: Option<(String, IdStrategy)>,
    ttl: Option<u64>,
    fields: Vec<FieldMetadata>,
    indexes: Vec<(String, IndexMetadata)>,
    sorted_indexes: Vec<(String, IndexMetadata)>,
}

impl ClassMetadataBuilder {
    /// Sets the key prefix.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Sets the storage encoding.
    pub const fn encoding(mut self, encoding: StorageEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Declares the id field and its generation strategy.
    pub fn id(mut self, field: impl Into<String>, strategy: IdStrategy) -> Self {
        self.id = Some((field.into(), strategy));
        self
    }

    /// Sets the default record TTL.
    pub const fn ttl(mut self, seconds: u64) -> Self {
        self.ttl = Some(seconds);
        self
    }

    /// Appends a field.
    pub fn field(mut self, field: FieldMetadata) -> Self {
        self.fields.push(field);
        self
    }

    /// Adds a secondary index on `field`.
    pub fn index(mut self, field: impl Into<String>, index: impl Into<IndexMetadata>) -> Self {
        self.indexes.push((field.into(), index.into()));
        self
    }

    /// Adds a sorted index on a numeric or datetime `field`.
    pub fn sorted_index(
        mut self,
        field: impl Into<String>,
        index: impl Into<IndexMetadata>,
    ) -> Self {
        self.sorted_indexes.push((field.into(), index.into()));
        self
    }

    /// Validates and builds the descriptor.
    ///
    /// # Errors
    ///
    /// Returns `InvalidMetadata` when the descriptor is inconsistent.
    pub fn build(self) -> CoreResult<ClassMetadata> {
        let invalid = |msg: String| CoreError::invalid_metadata(format!("{}: {msg}", self.collection));

        if self.collection.is_empty() || self.collection.contains([':', '*', '?', '[']) {
            return Err(invalid("collection name must be non-empty and free of ':' and glob characters".into()));
        }
        if RESERVED_COLLECTIONS.contains(&self.collection.as_str()) {
            return Err(invalid("collection name is reserved".into()));
        }
        if self.prefix.as_deref() == Some("") {
            return Err(invalid("prefix must not be empty".into()));
        }
        if self.ttl == Some(0) {
            return Err(invalid("ttl must be positive".into()));
        }

        let mut names = HashSet::new();
        let mut store_names = HashSet::new();
        for field in &self.fields {
            if !names.insert(field.name.as_str()) {
                return Err(invalid(format!("duplicate field {:?}", field.name)));
            }
            if !store_names.insert(field.store_name.as_str()) {
                return Err(invalid(format!("duplicate store field {:?}", field.store_name)));
            }
        }

        let (id_field, id_strategy) = self
            .id
            .clone()
            .ok_or_else(|| invalid("no id field declared".into()))?;
        let id_position = self
            .fields
            .iter()
            .position(|f| f.name == id_field)
            .ok_or_else(|| invalid(format!("id field {id_field:?} is not a declared field")))?;
        match (self.fields[id_position].ty, id_strategy) {
            (FieldType::String, _) | (FieldType::Integer, IdStrategy::Manual | IdStrategy::None) => {}
            (FieldType::Integer, IdStrategy::Auto) => {
                return Err(invalid("auto-generated ids require a string id field".into()));
            }
            (ty, _) => return Err(invalid(format!("id field cannot have type {ty}"))),
        }

        let mut index_names = HashSet::new();
        let mut indexes = BTreeMap::new();
        for (field, index) in self.indexes.iter().cloned() {
            self.check_index_target(&field, &index, &mut index_names)?;
            if indexes.insert(field.clone(), index).is_some() {
                return Err(invalid(format!("field {field:?} has two secondary indexes")));
            }
        }

        let mut sorted_names = HashSet::new();
        let mut sorted_indexes = BTreeMap::new();
        for (field, index) in self.sorted_indexes.iter().cloned() {
            let ty = self.check_index_target(&field, &index, &mut sorted_names)?;
            if !ty.is_numeric() {
                return Err(invalid(format!(
                    "sorted index {:?} needs a numeric or datetime field, {field:?} is {ty}",
                    index.name
                )));
            }
            if sorted_indexes.insert(field.clone(), index).is_some() {
                return Err(invalid(format!("field {field:?} has two sorted indexes")));
            }
        }

        let keys = KeySpace::new(self.prefix.as_deref(), &self.collection);
        Ok(ClassMetadata {
            collection: self.collection,
            prefix: self.prefix,
            encoding: self.encoding,
            id_field,
            id_position,
            id_strategy,
            ttl: self.ttl,
            fields: self.fields,
            indexes,
            sorted_indexes,
            keys,
        })
    }

    fn check_index_target(
        &self,
        field: &str,
        index: &IndexMetadata,
        seen: &mut HashSet<String>,
    ) -> CoreResult<FieldType> {
        let meta = self.fields.iter().find(|f| f.name == field).ok_or_else(|| {
            CoreError::invalid_metadata(format!(
                "{}: index {:?} targets unknown field {field:?}",
                self.collection, index.name
            ))
        })?;
        if index.name.is_empty() || index.name.contains(':') || !seen.insert(index.name.clone()) {
            return Err(CoreError::invalid_metadata(format!(
                "{}: index name {:?} is empty, contains ':' or is declared twice",
                self.collection, index.name
            )));
        }
        if index.ttl == Some(0) {
            return Err(CoreError::invalid_metadata(format!(
                "{}: index {:?} ttl must be positive",
                self.collection, index.name
            )));
        }
        Ok(meta.ty)
    }
}
