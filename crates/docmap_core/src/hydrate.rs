//! Conversion between document instances and store records.

use crate::document::Document;
use crate::error::CoreResult;
use crate::metadata::{ClassMetadata, DocumentType, FieldMetadata, StorageEncoding};
use docmap_codec::{CodecError, CodecResult, FieldType, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Typed field values of one document, keyed by property name.
pub type Record = BTreeMap<String, Value>;

/// Store strings of one document, keyed by property name; `None` is null.
pub(crate) type StoreRecord = BTreeMap<String, Option<String>>;

/// Converts between typed values and store-native representations.
///
/// The manager goes through its hydrator for every field it reads or
/// writes, so a custom implementation can change store formats for the
/// whole mapper.
pub trait Hydrator: Send + Sync + fmt::Debug {
    /// Decodes a store string as type `ty`.
    fn to_native(&self, raw: &str, ty: FieldType) -> CodecResult<Value>;

    /// Encodes a value as a store string; null yields `None`.
    fn to_store(&self, value: &Value, ty: FieldType) -> CodecResult<Option<String>>;

    /// Encodes a value for a JSON-encoded document.
    fn to_json(&self, value: &Value, ty: FieldType) -> CodecResult<serde_json::Value> {
        docmap_codec::to_json(value, ty)
    }

    /// Decodes a value from a JSON-encoded document.
    fn from_json(&self, json: &serde_json::Value, ty: FieldType) -> CodecResult<Value> {
        docmap_codec::from_json(json, ty)
    }
}

/// The default hydrator, backed by `docmap_codec`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardHydrator;

impl Hydrator for StandardHydrator {
    fn to_native(&self, raw: &str, ty: FieldType) -> CodecResult<Value> {
        docmap_codec::from_store(raw, ty)
    }

    fn to_store(&self, value: &Value, ty: FieldType) -> CodecResult<Option<String>> {
        docmap_codec::to_store(value, ty)
    }
}

/// A document as read from the store.
#[derive(Debug, Clone, PartialEq)]
pub enum RawDocument {
    /// Hash fields keyed by store name.
    Hash(HashMap<String, String>),
    /// Decoded JSON object keyed by store name.
    Json(serde_json::Map<String, serde_json::Value>),
}

impl RawDocument {
    /// Decodes the reply to a primary-key read.
    ///
    /// Returns `None` when the record does not exist.
    pub(crate) fn from_hash(fields: HashMap<String, String>) -> Option<Self> {
        (!fields.is_empty()).then_some(Self::Hash(fields))
    }

    pub(crate) fn from_json_text(text: Option<String>) -> CoreResult<Option<Self>> {
        match text {
            Some(text) => Ok(Some(Self::Json(docmap_codec::decode_document(&text)?))),
            None => Ok(None),
        }
    }

    fn value(&self, hydrator: &dyn Hydrator, store_name: &str, ty: FieldType) -> CodecResult<Value> {
        let value = match self {
            Self::Hash(fields) => fields.get(store_name).map(|raw| hydrator.to_native(raw, ty)),
            Self::Json(object) => object.get(store_name).map(|json| hydrator.from_json(json, ty)),
        };
        value.transpose().map(Option::unwrap_or_default)
    }

    /// One field in store form; absent and null are both `None`.
    pub(crate) fn store_value(
        &self,
        hydrator: &dyn Hydrator,
        field: &FieldMetadata,
    ) -> CoreResult<Option<String>> {
        let value = self.value(hydrator, field.store_name(), field.field_type())?;
        Ok(hydrator.to_store(&value, field.field_type())?)
    }
}

/// Reads every mapped field of `doc` through the accessor table.
pub fn extract_fields<D: Document>(doc_type: &DocumentType<D>, doc: &D) -> CoreResult<Record> {
    doc_type
        .metadata()
        .fields()
        .iter()
        .map(|field| {
            let value = doc_type.accessors().get(doc, field.name())?;
            Ok((field.name().to_string(), value))
        })
        .collect()
}

/// Builds a fresh instance from a raw store record.
///
/// Absent non-nullable fields keep the type's default.
pub fn build_instance<D: Document>(
    doc_type: &DocumentType<D>,
    hydrator: &dyn Hydrator,
    raw: &RawDocument,
) -> CoreResult<D> {
    let mut doc = D::default();
    for field in doc_type.metadata().fields() {
        let value = raw.value(hydrator, field.store_name(), field.field_type())?;
        if !value.is_null() || field.is_nullable() {
            doc_type.accessors().set(&mut doc, field.name(), value)?;
        }
    }
    Ok(doc)
}

/// Encodes every field of a record as a store string.
pub(crate) fn store_strings(
    metadata: &ClassMetadata,
    hydrator: &dyn Hydrator,
    record: &Record,
) -> CoreResult<StoreRecord> {
    let null = Value::Null;
    metadata
        .fields()
        .iter()
        .map(|field| {
            let value = record.get(field.name()).unwrap_or(&null);
            if value.is_null() && !field.is_nullable() {
                return Err(CodecError::UnexpectedNull {
                    ty: field.field_type(),
                }
                .into());
            }
            let raw = hydrator.to_store(value, field.field_type())?;
            Ok((field.name().to_string(), raw))
        })
        .collect()
}

/// The primary-record payload of one document.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Encoded {
    /// Non-null hash fields as (store name, value).
    Hash(Vec<(String, String)>),
    /// The encoded JSON object.
    Json(String),
}

pub(crate) fn encode_primary(
    metadata: &ClassMetadata,
    hydrator: &dyn Hydrator,
    record: &Record,
    strings: &StoreRecord,
) -> CoreResult<Encoded> {
    match metadata.encoding() {
        StorageEncoding::Hash => Ok(Encoded::Hash(
            metadata
                .fields()
                .iter()
                .filter_map(|field| {
                    let raw = strings.get(field.name())?.as_ref()?;
                    Some((field.store_name().to_string(), raw.clone()))
                })
                .collect(),
        )),
        StorageEncoding::Json => {
            let null = Value::Null;
            let fields = metadata
                .fields()
                .iter()
                .map(|field| {
                    let value = record.get(field.name()).unwrap_or(&null);
                    let json = hydrator.to_json(value, field.field_type())?;
                    Ok((field.store_name().to_string(), json))
                })
                .collect::<CodecResult<Vec<_>>>()?;
            Ok(Encoded::Json(docmap_codec::encode_document(&fields)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_registry, Article, Profile};

    #[test]
    fn hash_roundtrip() {
        let registry = test_registry();
        let doc_type = registry.get::<Article>().unwrap();
        let article = Article::new("a1", "Rust", "tech", 42);

        let record = extract_fields(&doc_type, &article).unwrap();
        let strings = store_strings(doc_type.metadata(), &StandardHydrator, &record).unwrap();
        let Encoded::Hash(fields) =
            encode_primary(doc_type.metadata(), &StandardHydrator, &record, &strings).unwrap()
        else {
            panic!("articles are hash-encoded");
        };

        let raw = RawDocument::Hash(fields.into_iter().collect());
        let rebuilt: Article = build_instance(&doc_type, &StandardHydrator, &raw).unwrap();
        assert_eq!(rebuilt, article);
    }

    #[test]
    fn null_fields_are_absent_from_hashes() {
        let registry = test_registry();
        let doc_type = registry.get::<Article>().unwrap();
        let mut article = Article::new("a1", "Rust", "tech", 42);
        article.summary = None;

        let record = extract_fields(&doc_type, &article).unwrap();
        let strings = store_strings(doc_type.metadata(), &StandardHydrator, &record).unwrap();
        let encoded = encode_primary(doc_type.metadata(), &StandardHydrator, &record, &strings).unwrap();
        let Encoded::Hash(fields) = encoded else {
            panic!("articles are hash-encoded");
        };
        assert!(fields.iter().all(|(name, _)| name != "summary"));
    }

    #[test]
    fn json_roundtrip_keeps_nulls() {
        let registry = test_registry();
        let doc_type = registry.get::<Profile>().unwrap();
        let profile = Profile::new("p1", "a@example.com", None);

        let record = extract_fields(&doc_type, &profile).unwrap();
        let strings = store_strings(doc_type.metadata(), &StandardHydrator, &record).unwrap();
        let Encoded::Json(text) =
            encode_primary(doc_type.metadata(), &StandardHydrator, &record, &strings).unwrap()
        else {
            panic!("profiles are JSON-encoded");
        };
        assert!(text.contains("\"nickname\":null"));

        let raw = RawDocument::from_json_text(Some(text)).unwrap().unwrap();
        let rebuilt: Profile = build_instance(&doc_type, &StandardHydrator, &raw).unwrap();
        assert_eq!(rebuilt, profile);
    }

    #[test]
    fn missing_records_decode_to_none() {
        assert!(RawDocument::from_hash(HashMap::new()).is_none());
        assert!(RawDocument::from_json_text(None).unwrap().is_none());
        assert!(RawDocument::from_json_text(Some("[]".into())).is_err());
    }

    #[test]
    fn bad_store_values_fail_hydration() {
        let registry = test_registry();
        let doc_type = registry.get::<Article>().unwrap();
        let raw = RawDocument::Hash(HashMap::from([
            ("id".to_string(), "a1".to_string()),
            ("score".to_string(), "lots".to_string()),
        ]));
        assert!(build_instance::<Article>(&doc_type, &StandardHydrator, &raw).is_err());
    }
}
