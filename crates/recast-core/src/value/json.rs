//! Bridge between the dynamic value graph and `serde_json::Value`
//!
//! Used by the string (de)serialization entry points. Decoding never infers
//! containers the input does not spell out: a JSON object with numeric keys
//! stays an object, it is never promoted to an array.

use serde_json::{Map as JsonMap, Number, Value as JsonValue};

use super::Value;

/// Convert a dynamic value to plain JSON.
///
/// Insertion order is preserved for objects and maps, sets flatten to
/// arrays, dates render as RFC 3339 strings and byte buffers as number
/// arrays. `Undefined` fields are omitted; thunks are forced; values not
/// representable in JSON (NaN, still-pending results) become null.
pub fn to_json(value: &Value) -> JsonValue {
    match value {
        Value::Undefined | Value::Null => JsonValue::Null,
        Value::Bool(b) => JsonValue::Bool(*b),
        Value::Number(n) => Number::from_f64(*n).map_or(JsonValue::Null, JsonValue::Number),
        Value::BigInt(n) => match i64::try_from(*n) {
            Ok(small) => JsonValue::Number(small.into()),
            Err(_) => JsonValue::String(n.to_string()),
        },
        Value::String(s) => JsonValue::String(s.clone()),
        Value::Date(d) => JsonValue::String(d.to_rfc3339()),
        Value::Bytes(b) => JsonValue::Array(b.iter().map(|byte| JsonValue::from(*byte)).collect()),
        Value::Array(handle) => JsonValue::Array(handle.items().iter().map(to_json).collect()),
        Value::Set(handle) => JsonValue::Array(handle.items().iter().map(to_json).collect()),
        Value::Map(handle) => {
            let mut out = JsonMap::new();
            for (key, entry) in handle.entries() {
                if !entry.is_undefined() {
                    out.insert(key, to_json(&entry));
                }
            }
            JsonValue::Object(out)
        }
        Value::Object(handle) => {
            let mut out = JsonMap::new();
            for (key, field) in handle.entries() {
                if !field.is_undefined() {
                    out.insert(key, to_json(&field));
                }
            }
            JsonValue::Object(out)
        }
        Value::Thunk(thunk) => to_json(&thunk.call()),
        Value::Pending(_) => JsonValue::Null,
    }
}

/// Convert parsed JSON into a dynamic value. Objects decode as plain
/// (model-less) objects, arrays as arrays, numbers as doubles.
pub fn from_json(value: &JsonValue) -> Value {
    match value {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(b) => Value::Bool(*b),
        JsonValue::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        JsonValue::String(s) => Value::String(s.clone()),
        JsonValue::Array(items) => Value::array(items.iter().map(from_json)),
        JsonValue::Object(entries) => {
            Value::object(entries.iter().map(|(k, v)| (k.clone(), from_json(v))))
        }
    }
}
