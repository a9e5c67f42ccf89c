//! The document capability interface and shared instance handles.

use crate::error::{CoreError, CoreResult};
use crate::metadata::ClassMetadata;
use docmap_codec::{CodecResult, Value};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A type that can be mapped onto the store.
///
/// Implementors describe themselves once through [`Document::metadata`] and
/// [`Document::accessors`]; the registry caches both.
///
/// # Example
///
/// ```rust
/// use docmap_codec::FieldType;
/// use docmap_core::{ClassMetadata, CoreResult, Document, FieldAccessors, FieldMetadata, IdStrategy};
///
/// #[derive(Default)]
/// struct Tag {
///     id: Option<String>,
///     label: String,
/// }
///
/// impl Document for Tag {
///     fn metadata() -> CoreResult<ClassMetadata> {
///         ClassMetadata::builder("tags")
///             .id("id", IdStrategy::Auto)
///             .field(FieldMetadata::new("id", FieldType::String))
///             .field(FieldMetadata::new("label", FieldType::String))
///             .build()
///     }
///
///     fn accessors() -> FieldAccessors<Self> {
///         FieldAccessors::<Self>::new()
///             .field("id", |t: &Tag| t.id.clone().into(), |t, v| {
///                 t.id = v.into_opt()?;
///                 Ok(())
///             })
///             .field("label", |t: &Tag| t.label.clone().into(), |t, v| {
///                 t.label = v.try_into()?;
///                 Ok(())
///             })
///     }
/// }
/// ```
pub trait Document: Default + Send + Sync + 'static {
    /// Builds the type descriptor.
    fn metadata() -> CoreResult<ClassMetadata>;

    /// Builds the per-field accessor table.
    fn accessors() -> FieldAccessors<Self>;

    /// Exposes creation/update timestamps, if the type keeps them.
    fn timestamps(&mut self) -> Option<&mut dyn HasTimestamps> {
        None
    }

    /// Record TTL for this instance, overriding the descriptor default.
    fn ttl(&self) -> Option<u64> {
        None
    }
}

/// Documents that carry creation and update timestamps (epoch seconds).
pub trait HasTimestamps {
    /// Creation time, if already set.
    fn created_at(&self) -> Option<i64>;

    /// Sets the creation time.
    fn set_created_at(&mut self, at: i64);

    /// Sets the last-update time.
    fn set_updated_at(&mut self, at: i64);
}

/// Shared handle to a document instance.
///
/// The identity map and every caller holding a `DocRef` observe the same
/// instance; equality is identity.
pub struct DocRef<D>(Arc<RwLock<D>>);

impl<D> DocRef<D> {
    /// Wraps a new instance.
    pub fn new(doc: D) -> Self {
        Self(Arc::new(RwLock::new(doc)))
    }

    /// Locks the instance for reading.
    pub fn read(&self) -> RwLockReadGuard<'_, D> {
        self.0.read()
    }

    /// Locks the instance for writing.
    pub fn write(&self) -> RwLockWriteGuard<'_, D> {
        self.0.write()
    }

    /// Returns true if both handles point at the same instance.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Address of the shared instance, stable while any handle lives.
    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl<D> Clone for DocRef<D> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<D> PartialEq for DocRef<D> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<D> Eq for DocRef<D> {}

impl<D: fmt::Debug> fmt::Debug for DocRef<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DocRef").field(&*self.0.read()).finish()
    }
}

type Getter<D> = Box<dyn Fn(&D) -> Value + Send + Sync>;
type Setter<D> = Box<dyn Fn(&mut D, Value) -> CodecResult<()> + Send + Sync>;

struct FieldAccessor<D> {
    get: Getter<D>,
    set: Setter<D>,
}

/// Typed get/set closures for every mapped field of `D`, keyed by property
/// name.
pub struct FieldAccessors<D> {
    entries: HashMap<String, FieldAccessor<D>>,
}

impl<D> FieldAccessors<D> {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Registers the accessors of one field.
    #[must_use]
    pub fn field<G, S>(mut self, name: impl Into<String>, get: G, set: S) -> Self
    where
        G: Fn(&D) -> Value + Send + Sync + 'static,
        S: Fn(&mut D, Value) -> CodecResult<()> + Send + Sync + 'static,
    {
        self.entries.insert(
            name.into(),
            FieldAccessor {
                get: Box::new(get),
                set: Box::new(set),
            },
        );
        self
    }

    /// Returns true if `name` has accessors.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Number of fields with accessors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no field has accessors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reads a field.
    pub fn get(&self, doc: &D, name: &str) -> CoreResult<Value> {
        let accessor = self.entry(name)?;
        Ok((accessor.get)(doc))
    }

    /// Writes a field.
    pub fn set(&self, doc: &mut D, name: &str, value: Value) -> CoreResult<()> {
        let accessor = self.entry(name)?;
        (accessor.set)(doc, value)?;
        Ok(())
    }

    fn entry(&self, name: &str) -> CoreResult<&FieldAccessor<D>> {
        self.entries
            .get(name)
            .ok_or_else(|| CoreError::invalid_query(format!("no accessor for field {name:?}")))
    }

    /// Checks that every field of `metadata` has accessors.
    pub(crate) fn validate(&self, metadata: &ClassMetadata) -> CoreResult<()> {
        match metadata.fields().iter().find(|f| !self.contains(f.name())) {
            Some(field) => Err(CoreError::invalid_metadata(format!(
                "{}: field {:?} has no accessors",
                metadata.collection(),
                field.name()
            ))),
            None => Ok(()),
        }
    }
}

impl<D> Default for FieldAccessors<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> fmt::Debug for FieldAccessors<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.entries.keys().collect();
        names.sort();
        f.debug_struct("FieldAccessors").field("fields", &names).finish()
    }
}
