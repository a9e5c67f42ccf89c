//! Typed value → store encoding.

use crate::error::{CodecError, CodecResult};
use crate::value::{FieldType, Value};

/// Encodes a value as a store-native string.
///
/// Returns `None` for null: null fields are never written as strings.
///
/// # Errors
///
/// Returns [`CodecError::TypeMismatch`] if the value's variant does not fit
/// `ty`, or [`CodecError::NonFiniteFloat`] for NaN/infinite floats.
pub fn to_store(value: &Value, ty: FieldType) -> CodecResult<Option<String>> {
    let raw = match (ty, value) {
        (_, Value::Null) => return Ok(None),
        (FieldType::String, Value::Text(s)) => s.clone(),
        (FieldType::Integer, Value::Integer(n)) | (FieldType::DateTime, Value::DateTime(n)) => {
            n.to_string()
        }
        (FieldType::Float, Value::Float(x)) => {
            if !x.is_finite() {
                return Err(CodecError::NonFiniteFloat);
            }
            x.to_string()
        }
        // Widening an integer into a float field is lossless for the stored text.
        (FieldType::Float, Value::Integer(n)) => n.to_string(),
        (FieldType::Boolean, Value::Bool(b)) => String::from(if *b { "1" } else { "0" }),
        (FieldType::Json, Value::Json(j)) => serde_json::to_string(j)?,
        (ty, other) => return Err(CodecError::type_mismatch(ty, other.kind())),
    };
    Ok(Some(raw))
}

/// Encodes a value as a JSON value for JSON-encoded documents.
///
/// # Errors
///
/// Same conditions as [`to_store`].
pub fn to_json(value: &Value, ty: FieldType) -> CodecResult<serde_json::Value> {
    use serde_json::Value as Json;

    Ok(match (ty, value) {
        (_, Value::Null) => Json::Null,
        (FieldType::String, Value::Text(s)) => Json::String(s.clone()),
        (FieldType::Integer, Value::Integer(n)) | (FieldType::DateTime, Value::DateTime(n)) => {
            Json::from(*n)
        }
        (FieldType::Float, Value::Float(x)) => serde_json::Number::from_f64(*x)
            .map(Json::Number)
            .ok_or(CodecError::NonFiniteFloat)?,
        (FieldType::Float, Value::Integer(n)) => Json::from(*n),
        (FieldType::Boolean, Value::Bool(b)) => Json::Bool(*b),
        (FieldType::Json, Value::Json(j)) => j.clone(),
        (ty, other) => return Err(CodecError::type_mismatch(ty, other.kind())),
    })
}

/// Encodes named JSON fields as one compact JSON object.
///
/// Keys are emitted in sorted order, so equal documents encode identically.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode_document(fields: &[(String, serde_json::Value)]) -> CodecResult<String> {
    let mut object = serde_json::Map::with_capacity(fields.len());
    for (name, value) in fields {
        object.insert(name.clone(), value.clone());
    }
    Ok(serde_json::to_string(&serde_json::Value::Object(object))?)
}
