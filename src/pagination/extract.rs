use serde_json::Value;

/// Keys that commonly wrap the record array of a response, in lookup order
pub const DATA_WRAPPER_KEYS: &[&str] = &["data", "results", "items", "records", "entries", "list"];

/// Extracts the main record array from a response
///
/// A top-level array is returned as is; otherwise the first wrapper key
/// holding an array wins. Anything else yields an empty slice.
pub fn extract_data_array(response: &Value) -> &[Value] {
    match response {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => DATA_WRAPPER_KEYS
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_array))
            .map(Vec::as_slice)
            .unwrap_or(&[]),
        _ => &[],
    }
}

/// Looks up a dotted field path (`pagination.next_cursor`) in a JSON object
pub fn value_at_path<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(data, |current, key| current.as_object()?.get(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_top_level_array() {
        let data = json!([{"id": 1}, {"id": 2}]);
        assert_eq!(extract_data_array(&data).len(), 2);
    }

    #[test]
    fn test_wrapper_order() {
        let data = json!({"items": [1, 2, 3], "data": [1]});
        assert_eq!(extract_data_array(&data), &[json!(1)]);

        let data = json!({"data": {"nested": true}, "entries": [1, 2]});
        assert_eq!(extract_data_array(&data).len(), 2);
    }

    #[test]
    fn test_nothing_to_extract() {
        assert!(extract_data_array(&json!({"id": 1})).is_empty());
        assert!(extract_data_array(&json!("text")).is_empty());
    }

    #[test]
    fn test_value_at_path() {
        let data = json!({"meta": {"paging": {"next": "t2"}}, "top": 1});
        assert_eq!(value_at_path(&data, "top"), Some(&json!(1)));
        assert_eq!(value_at_path(&data, "meta.paging.next"), Some(&json!("t2")));
        assert_eq!(value_at_path(&data, "meta.missing"), None);
        assert_eq!(value_at_path(&data, "top.deeper"), None);
    }
}
