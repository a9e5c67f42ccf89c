//! # docmap Codec
//!
//! Typed field values and their store-native encodings.
//!
//! Key-value stores only hold strings. This crate defines the typed
//! [`Value`] a document field carries, the semantic [`FieldType`] declared
//! for it, and the deterministic conversions between the two worlds:
//!
//! - **store strings**, used for hash fields, index keys and unique keys
//! - **JSON values**, used for documents stored with JSON encoding
//!
//! ## Store-native formats
//!
//! | type       | store string                     | JSON          |
//! |------------|----------------------------------|---------------|
//! | `String`   | verbatim                         | string        |
//! | `Integer`  | decimal                          | number        |
//! | `Float`    | shortest round-trip decimal      | number        |
//! | `Boolean`  | `1` / `0`                        | bool          |
//! | `DateTime` | epoch seconds                    | number        |
//! | `Json`     | compact JSON text                | nested value  |
//!
//! Nothing is silently coerced: a value whose variant does not fit the
//! declared type is a [`CodecError::TypeMismatch`].
//!
//! ## Usage
//!
//! ```
//! use docmap_codec::{from_store, to_store, FieldType, Value};
//!
//! let raw = to_store(&Value::Bool(true), FieldType::Boolean).unwrap();
//! assert_eq!(raw.as_deref(), Some("1"));
//!
//! let back = from_store("1", FieldType::Boolean).unwrap();
//! assert_eq!(back, Value::Bool(true));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod error;
mod value;

pub use decoder::{decode_document, from_json, from_store};
pub use encoder::{encode_document, to_json, to_store};
pub use error::{CodecError, CodecResult};
pub use value::{FieldType, Value};
