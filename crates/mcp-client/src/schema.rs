//! The narrow `$schema`-key-stripping utility (spec.md §8). Full translation
//! of tool schemas into third-party LLM-vendor shapes is out of scope
//! (spec.md §1); only the one invariant spec.md actually pins down for
//! those vendor wrappers is implemented.

use serde_json::Value;

/// Recursively remove every `$schema` key at any depth, including inside
/// arrays.
pub fn strip_schema_keys(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.remove("$schema");
            for v in map.values_mut() {
                strip_schema_keys(v);
            }
        }
        Value::Array(items) => {
            for item in items {
                strip_schema_keys(item);
            }
        }
        _ => {}
    }
}

/// Apply [`strip_schema_keys`] to a copy of `schema`, for vendors that
/// reject an explicit JSON Schema dialect declaration.
#[must_use]
pub fn to_openai_schema(schema: &Value) -> Value {
    let mut out = schema.clone();
    strip_schema_keys(&mut out);
    out
}

#[must_use]
pub fn to_anthropic_schema(schema: &Value) -> Value {
    let mut out = schema.clone();
    strip_schema_keys(&mut out);
    out
}

#[must_use]
pub fn to_google_schema(schema: &Value) -> Value {
    let mut out = schema.clone();
    strip_schema_keys(&mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_schema_key_at_every_depth_including_arrays() {
        let mut value = serde_json::json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "type": "object",
            "properties": {
                "items": {
                    "$schema": "nested",
                    "type": "array",
                    "items": [
                        {"$schema": "in-array", "type": "string"},
                        {"type": "number"}
                    ]
                }
            }
        });

        strip_schema_keys(&mut value);

        assert!(value.get("$schema").is_none());
        assert!(value["properties"]["items"].get("$schema").is_none());
        assert!(value["properties"]["items"]["items"][0].get("$schema").is_none());
    }

    #[test]
    fn vendor_wrappers_apply_the_same_stripping() {
        let schema = serde_json::json!({"$schema": "x", "type": "object"});
        assert!(to_openai_schema(&schema).get("$schema").is_none());
        assert!(to_anthropic_schema(&schema).get("$schema").is_none());
        assert!(to_google_schema(&schema).get("$schema").is_none());
    }

    proptest::proptest! {
        #[test]
        fn stripping_is_idempotent(depth in 0..4usize) {
            let mut value = serde_json::json!({"$schema": "x"});
            for _ in 0..depth {
                value = serde_json::json!({"$schema": "x", "nested": value});
            }
            strip_schema_keys(&mut value);
            let mut twice = value.clone();
            strip_schema_keys(&mut twice);
            prop_assert_eq!(value, twice);
        }
    }
}
