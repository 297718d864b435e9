//! Structured node configuration
//!
//! The structured config is a version-tagged JSON document:
//!
//! ```json
//! {
//!   "version": "1.0.0",
//!   "global": { "registries": { "quay.io": { "username": "bot" } } },
//!   "node-a": { "registries": { "quay.io": { "password": "s3cret" } } }
//! }
//! ```
//!
//! The `global` section is deep-merged with the section named after the
//! current node, node values winning at every depth.

use serde_json::{Map, Value};
use tracing::warn;

/// The only structured config version understood
pub const SUPPORTED_VERSION: &str = "1.0.0";

/// Merges the global and per-node sections of a structured config.
///
/// Unknown or missing versions yield an empty mapping and a warning rather
/// than an error.
pub fn merge_node_config(document: &Value, node_name: Option<&str>) -> Map<String, Value> {
    let version = document.get("version").and_then(Value::as_str);
    if version != Some(SUPPORTED_VERSION) {
        warn!(
            "Unsupported structured config version {:?}, expected {}",
            version, SUPPORTED_VERSION
        );
        return Map::new();
    }

    let mut merged = Value::Object(Map::new());
    if let Some(global) = document.get("global") {
        deep_merge(&mut merged, global);
    }
    if let Some(node) = node_name.and_then(|name| document.get(name)) {
        deep_merge(&mut merged, node);
    }

    match merged {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Recursively merges `overlay` into `base`.
///
/// Objects merge key by key; any other overlay value replaces the base value.
pub fn deep_merge(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_node_overrides_global_at_depth() {
        let doc = json!({
            "version": "1.0.0",
            "global": {"a": {"b": {"c": 1, "keep": true}}, "only_global": "g"},
            "node1": {"a": {"b": {"c": 2}}, "only_node": "n"}
        });

        let merged = merge_node_config(&doc, Some("node1"));
        assert_eq!(merged["a"]["b"]["c"], json!(2));
        assert_eq!(merged["a"]["b"]["keep"], json!(true));
        assert_eq!(merged["only_global"], json!("g"));
        assert_eq!(merged["only_node"], json!("n"));
    }

    #[test]
    fn test_unknown_node_uses_global() {
        let doc = json!({"version": "1.0.0", "global": {"x": 1}});
        let merged = merge_node_config(&doc, Some("missing"));
        assert_eq!(merged.get("x"), Some(&json!(1)));
    }

    #[test]
    fn test_unsupported_version_is_empty() {
        let doc = json!({"version": "2.0.0", "global": {"x": 1}});
        assert!(merge_node_config(&doc, None).is_empty());

        let doc = json!({"global": {"x": 1}});
        assert!(merge_node_config(&doc, None).is_empty());
    }

    #[test]
    fn test_scalar_replaces_object() {
        let mut base = json!({"a": {"b": 1}});
        deep_merge(&mut base, &json!({"a": "flat"}));
        assert_eq!(base, json!({"a": "flat"}));
    }
}
