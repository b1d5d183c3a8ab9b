//! Encryption-subtree extractor.
//!
//! ARCHITECTURE: a second pass over the already-built rules tree (not the
//! YAML source) that pulls every `.encrypt` entry, together with the path of
//! keys leading to it, into a parallel tree — then deletes `.encrypt` from
//! the rules tree in place. Grounded on the same "walk a decoded JSON
//! document, build a sibling document" shape as `tree.rs` itself and the
//! reference's own `transform/json.rs` skeleton-extraction walk.

use serde_json::{Map as JsonMap, Value as JsonValue};

/// Strips every `.encrypt` entry out of `rules` (mutating it in place) and
/// returns the parallel firecrypt tree holding only those entries and the
/// path of keys leading to each, or `None` if no node carried `.encrypt`.
pub fn extract_encryption(rules: &mut JsonMap<String, JsonValue>) -> Option<JsonValue> {
    extract_node(rules).map(JsonValue::Object)
}

fn extract_node(node: &mut JsonMap<String, JsonValue>) -> Option<JsonMap<String, JsonValue>> {
    let mut out = JsonMap::new();

    if let Some(encrypt) = node.remove(".encrypt") {
        out.insert(".encrypt".to_string(), encrypt);
    }

    let child_keys: Vec<String> = node
        .keys()
        .filter(|k| !k.starts_with('.'))
        .cloned()
        .collect();

    for key in child_keys {
        let extracted = node
            .get_mut(&key)
            .and_then(JsonValue::as_object_mut)
            .and_then(extract_node);
        if let Some(child_out) = extracted {
            out.insert(key, JsonValue::Object(child_out));
        }
    }

    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}
