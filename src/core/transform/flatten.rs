//! Property flattening
//!
//! Converts nested property objects into a single level of dotted keys:
//! `{"plan": {"tier": "pro"}}` becomes `{"plan.tier": "pro"}`. Arrays and
//! scalars are kept as leaf values.

use serde_json::{Map, Value};

/// Flatten nested objects into dotted keys
///
/// Non-object input is returned unchanged. An empty nested object is kept as
/// an empty object under its own key so the key is not lost.
pub fn flatten_properties(properties: &Value) -> Value {
    match properties {
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, value) in map {
                flatten_into(&mut out, key.clone(), value);
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

fn flatten_into(out: &mut Map<String, Value>, prefix: String, value: &Value) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                flatten_into(out, format!("{prefix}.{key}"), child);
            }
        }
        _ => {
            out.insert(prefix, value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flatten_nested_objects() {
        let flat = flatten_properties(&json!({
            "browser": "Firefox",
            "utm": {"source": "newsletter", "campaign": {"id": 7}},
        }));

        assert_eq!(flat["browser"], "Firefox");
        assert_eq!(flat["utm.source"], "newsletter");
        assert_eq!(flat["utm.campaign.id"], 7);
        assert!(flat.get("utm").is_none());
    }

    #[test]
    fn test_flatten_keeps_arrays_and_empty_objects() {
        let flat = flatten_properties(&json!({
            "tags": ["a", "b"],
            "extra": {},
        }));

        assert_eq!(flat["tags"], json!(["a", "b"]));
        assert_eq!(flat["extra"], json!({}));
    }

    #[test]
    fn test_flatten_non_object_is_unchanged() {
        assert_eq!(flatten_properties(&json!(3)), json!(3));
    }
}
