use crate::pagination::DATA_WRAPPER_KEYS;
use crate::schema::ColumnType;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Picks the record a schema should be inferred from
///
/// A non-empty array yields its first element; an object with a wrapper key
/// holding an array is searched recursively; any other object is the record
/// itself.
pub fn sample_record(sample: &Value) -> Option<&Map<String, Value>> {
    match sample {
        Value::Array(items) => items.first().and_then(sample_record),
        Value::Object(map) => {
            let wrapped = DATA_WRAPPER_KEYS
                .iter()
                .find_map(|key| map.get(*key).filter(|v| v.is_array()));
            match wrapped {
                Some(inner) => sample_record(inner),
                None => Some(map),
            }
        }
        _ => None,
    }
}

/// Infers a column name to type mapping from one sample response
///
/// Only one record is inspected; later records with a different shape are
/// not reconciled. Nested objects and arrays become TEXT holding their JSON
/// encoding, booleans become INTEGER 0/1.
///
/// # Example
///
/// ```
/// use api_harvest::schema::{infer_schema, ColumnType};
/// use serde_json::json;
///
/// let schema = infer_schema(&json!({"data": [{"id": 1, "price": 9.5}]}));
/// assert_eq!(schema["id"], ColumnType::Integer);
/// assert_eq!(schema["price"], ColumnType::Real);
/// ```
pub fn infer_schema(sample: &Value) -> BTreeMap<String, ColumnType> {
    let Some(record) = sample_record(sample) else {
        return BTreeMap::new();
    };

    record
        .iter()
        .map(|(name, value)| (name.clone(), column_type(value)))
        .collect()
}

fn column_type(value: &Value) -> ColumnType {
    match value {
        Value::Bool(_) => ColumnType::Integer,
        Value::Number(n) if n.is_f64() => ColumnType::Real,
        Value::Number(_) => ColumnType::Integer,
        Value::Null | Value::String(_) | Value::Array(_) | Value::Object(_) => ColumnType::Text,
    }
}
