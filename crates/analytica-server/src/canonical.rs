//! Deterministic parameter canonicalization.
//!
//! Cache keys must collapse equivalent parameter structures to the same
//! string regardless of map ordering, so objects are serialized with sorted
//! keys and numbers through `serde_json::Number`'s stable formatting.
//! Array order is significant and preserved.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Renders a value with sorted object keys and stable scalar formatting.
pub fn canonical_string(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => {
            // serde_json's escaping keeps the representation unambiguous.
            out.push_str(&serde_json::to_string(s).unwrap_or_else(|_| String::from("\"\"")));
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key).unwrap_or_else(|_| String::from("\"\"")));
                out.push(':');
                if let Some(inner) = map.get(*key) {
                    write_canonical(inner, out);
                }
            }
            out.push('}');
        }
    }
}

/// Hex SHA-256 of the canonical rendering.
pub fn hash_params(value: &Value) -> String {
    let digest = Sha256::digest(canonical_string(value).as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Cache key within a tool's namespace: `<tool>:<hash(params)>`.
pub fn tool_cache_key(tool: &str, params: &Value) -> String {
    format!("{tool}:{}", hash_params(params))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn object_key_order_does_not_matter() {
        let a = json!({"b": 1, "a": [1, 2, {"y": true, "x": null}]});
        let b = json!({"a": [1, 2, {"x": null, "y": true}], "b": 1});
        assert_eq!(canonical_string(&a), canonical_string(&b));
        assert_eq!(hash_params(&a), hash_params(&b));
    }

    #[test]
    fn array_order_matters() {
        assert_ne!(hash_params(&json!([1, 2])), hash_params(&json!([2, 1])));
    }

    #[test]
    fn numeric_formatting_is_stable() {
        let a = json!({"n": 1.5});
        let b = json!({"n": 1.5});
        assert_eq!(canonical_string(&a), canonical_string(&b));
        // Integers and floats with equal value are distinct inputs.
        assert_ne!(hash_params(&json!(1)), hash_params(&json!(1.0)));
    }

    #[test]
    fn keys_embed_tool_name_and_hash() {
        let key = tool_cache_key("analyze_dataset", &json!({"data": [1, 2]}));
        assert!(key.starts_with("analyze_dataset:"));
        assert_eq!(key.len(), "analyze_dataset:".len() + 64);
    }
}
