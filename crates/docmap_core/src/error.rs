//! Error types for docmap core.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in docmap core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Key-value adapter error.
    #[error("store error: {0}")]
    Store(#[from] docmap_store::StoreError),

    /// Field conversion error.
    #[error("codec error: {0}")]
    Codec(#[from] docmap_codec::CodecError),

    /// Another instance already owns this identity, in memory or in the store.
    #[error("duplicate identity {id:?} in collection {collection}")]
    DuplicateIdentity {
        /// The collection.
        collection: String,
        /// The contested id.
        id: String,
    },

    /// A tracked instance's id changed after it was registered.
    #[error("identity of tracked {collection} document changed from {registered:?} to {current:?}")]
    ImmutableIdentity {
        /// The collection.
        collection: String,
        /// The id the instance was registered under.
        registered: String,
        /// The id the instance carries now.
        current: Option<String>,
    },

    /// A unique field value is already owned by another document.
    #[error("unique constraint violated on {collection}.{field} = {value:?} (owned by {owner:?})")]
    UniqueConstraintViolation {
        /// The collection.
        collection: String,
        /// The store field name.
        field: String,
        /// The contested store-encoded value.
        value: String,
        /// The id that owns the value.
        owner: String,
    },

    /// A value offered to a sorted index is not numeric.
    #[error("invalid value {value} for sorted index on {collection}.{field}")]
    InvalidIndexValue {
        /// The collection.
        collection: String,
        /// The indexed field.
        field: String,
        /// Rendering of the offending value.
        value: String,
    },

    /// A document with no id was persisted under a non-generating strategy.
    #[error("document in collection {collection} has no identity")]
    MissingIdentity {
        /// The collection.
        collection: String,
    },

    /// The document type was never registered.
    #[error("unknown document type: {type_name}")]
    UnknownDocumentType {
        /// Rust type name.
        type_name: &'static str,
    },

    /// A document type descriptor is inconsistent.
    #[error("invalid metadata: {message}")]
    InvalidMetadata {
        /// Description of the problem.
        message: String,
    },

    /// A query refers to unknown fields or indexes.
    #[error("invalid query: {message}")]
    InvalidQuery {
        /// Description of the problem.
        message: String,
    },
}

impl CoreError {
    /// Creates a duplicate-identity error.
    pub fn duplicate_identity(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self::DuplicateIdentity {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// Creates a missing-identity error.
    pub fn missing_identity(collection: impl Into<String>) -> Self {
        Self::MissingIdentity {
            collection: collection.into(),
        }
    }

    /// Creates an invalid-metadata error.
    pub fn invalid_metadata(message: impl Into<String>) -> Self {
        Self::InvalidMetadata {
            message: message.into(),
        }
    }

    /// Creates an invalid-query error.
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery {
            message: message.into(),
        }
    }

    /// Creates an unknown-document-type error for `D`.
    #[must_use]
    pub fn unknown_type<D: 'static>() -> Self {
        Self::UnknownDocumentType {
            type_name: std::any::type_name::<D>(),
        }
    }

    /// Returns true for errors raised before any store mutation.
    ///
    /// Store errors are excluded: they may come from the execute phase.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        !matches!(self, Self::Store(_))
    }
}
