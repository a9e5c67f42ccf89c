//! Error types for the codec crate.

use crate::value::FieldType;
use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while converting field values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// A value's variant does not fit the declared field type.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Declared field type.
        expected: FieldType,
        /// Variant name of the offending value.
        found: &'static str,
    },

    /// A store string could not be parsed as the declared type.
    #[error("invalid {ty} value: {raw:?}")]
    InvalidValue {
        /// Declared field type.
        ty: FieldType,
        /// The raw text that failed to parse.
        raw: String,
    },

    /// Floats must be finite to be stored.
    #[error("non-finite float cannot be stored")]
    NonFiniteFloat,

    /// JSON encoding or decoding failed.
    #[error("JSON error: {message}")]
    Json {
        /// Description of the JSON error.
        message: String,
    },

    /// A required value was null.
    #[error("unexpected null for {ty} field")]
    UnexpectedNull {
        /// Declared field type.
        ty: FieldType,
    },
}

impl CodecError {
    /// Creates a type-mismatch error.
    #[must_use]
    pub const fn type_mismatch(expected: FieldType, found: &'static str) -> Self {
        Self::TypeMismatch { expected, found }
    }

    /// Creates an invalid-value error.
    pub fn invalid_value(ty: FieldType, raw: impl Into<String>) -> Self {
        Self::InvalidValue {
            ty,
            raw: raw.into(),
        }
    }
}

impl From<serde_json::Error> for CodecError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json {
            message: err.to_string(),
        }
    }
}
