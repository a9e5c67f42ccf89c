//! Store → typed value decoding.

use crate::error::{CodecError, CodecResult};
use crate::value::{FieldType, Value};

/// Decodes a store-native string as a value of type `ty`.
///
/// Booleans accept `1`/`0` as written by [`crate::to_store`], and also
/// `true`/`false` for data written by other clients.
///
/// # Errors
///
/// Returns [`CodecError::InvalidValue`] if `raw` does not parse as `ty`.
pub fn from_store(raw: &str, ty: FieldType) -> CodecResult<Value> {
    let invalid = || CodecError::invalid_value(ty, raw);
    Ok(match ty {
        FieldType::String => Value::Text(raw.to_string()),
        FieldType::Integer => Value::Integer(raw.trim().parse().map_err(|_| invalid())?),
        FieldType::Float => {
            let x: f64 = raw.trim().parse().map_err(|_| invalid())?;
            if !x.is_finite() {
                return Err(invalid());
            }
            Value::Float(x)
        }
        FieldType::Boolean => match raw.trim() {
            "1" | "true" => Value::Bool(true),
            "0" | "false" | "" => Value::Bool(false),
            _ => return Err(invalid()),
        },
        FieldType::DateTime => Value::DateTime(raw.trim().parse().map_err(|_| invalid())?),
        FieldType::Json => Value::Json(serde_json::from_str(raw)?),
    })
}

/// Decodes a JSON value as a value of type `ty`.
///
/// Strings are accepted for scalar types and parsed like store strings.
///
/// # Errors
///
/// Returns an error if the JSON value cannot represent `ty`.
pub fn from_json(json: &serde_json::Value, ty: FieldType) -> CodecResult<Value> {
    use serde_json::Value as Json;

    let mismatch = || CodecError::invalid_value(ty, json.to_string());
    Ok(match (ty, json) {
        (_, Json::Null) => Value::Null,
        (FieldType::Json, other) => Value::Json(other.clone()),
        (FieldType::String, Json::String(s)) => Value::Text(s.clone()),
        (_, Json::String(s)) => return from_store(s, ty),
        (FieldType::Integer, Json::Number(n)) => Value::Integer(n.as_i64().ok_or_else(mismatch)?),
        (FieldType::DateTime, Json::Number(n)) => {
            Value::DateTime(n.as_i64().ok_or_else(mismatch)?)
        }
        (FieldType::Float, Json::Number(n)) => Value::Float(n.as_f64().ok_or_else(mismatch)?),
        (FieldType::Boolean, Json::Bool(b)) => Value::Bool(*b),
        _ => return Err(mismatch()),
    })
}

/// Decodes a JSON-encoded document into its top-level object.
///
/// # Errors
///
/// Returns an error if `text` is not a JSON object.
pub fn decode_document(text: &str) -> CodecResult<serde_json::Map<String, serde_json::Value>> {
    match serde_json::from_str(text)? {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(CodecError::Json {
            message: format!("expected object, found {other}"),
        }),
    }
}
