//! Canonical JSON serialization (spec §4.1: "stable serialization (sorted
//! keys) so that identical writes hash identically"). `serde_json`'s
//! `preserve_order` feature only preserves *insertion* order — attribute maps
//! are `HashMap`s, so two logically-identical writes built in different
//! insertion orders would otherwise serialize differently. This sorts every
//! object's keys recursively before serializing.

use serde::Serialize;
use serde_json::Value;

use crate::error::{BrainyError, Result};

pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let raw = serde_json::to_value(value)
        .map_err(|e| BrainyError::Internal(anyhow::anyhow!(e)))?;
    let sorted = sort_keys(raw);
    serde_json::to_vec(&sorted).map_err(|e| BrainyError::Internal(anyhow::anyhow!(e)))
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> =
                map.into_iter().map(|(k, v)| (k, sort_keys(v))).collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            let mut sorted = serde_json::Map::new();
            for (k, v) in entries {
                sorted.insert(k, v);
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identical_logical_content_serializes_identically_regardless_of_insertion_order() {
        let mut a = serde_json::Map::new();
        a.insert("z".to_string(), json!(1));
        a.insert("a".to_string(), json!(2));

        let mut b = serde_json::Map::new();
        b.insert("a".to_string(), json!(2));
        b.insert("z".to_string(), json!(1));

        let bytes_a = to_canonical_bytes(&Value::Object(a)).unwrap();
        let bytes_b = to_canonical_bytes(&Value::Object(b)).unwrap();
        assert_eq!(bytes_a, bytes_b);
    }

    #[test]
    fn nested_objects_are_sorted_recursively() {
        let value = json!({ "outer_z": 1, "outer_a": { "inner_z": 1, "inner_a": 2 } });
        let bytes = to_canonical_bytes(&value).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let a_pos = text.find("outer_a").unwrap();
        let z_pos = text.find("outer_z").unwrap();
        assert!(a_pos < z_pos);
        let inner_a = text.find("inner_a").unwrap();
        let inner_z = text.find("inner_z").unwrap();
        assert!(inner_a < inner_z);
    }
}
