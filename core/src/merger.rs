//! The Merger (spec §4.6): deterministic deep-merge of JSON payloads with
//! identity-keyed array union, used by `enrich`/`smartInsert` and by tiered
//! reads that combine a tenant-level and domain-level document.

use serde_json::{Map, Value};

/// Deep-merge `patch` into `base`, returning the combined document.
///
/// Rules:
/// - Objects merge key-by-key, recursing into nested objects.
/// - Arrays always union: `base`'s elements come first, in order, followed
///   by any elements from `patch` not already covered. Objects carrying an
///   `id` or `_id` field are unioned by that identity key — an element in
///   `patch` sharing a base element's key is recursively merged into it in
///   place rather than appended. Everything else (primitives, and objects
///   without an identity key) is deduplicated by equality: a `patch`
///   element already present in `base` is not appended again.
/// - Any other type mismatch, or a scalar replacing a scalar, takes
///   `patch`'s value.
pub fn deep_merge(base: &Value, patch: &Value) -> Value {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            Value::Object(merge_objects(base_map, patch_map))
        }
        (Value::Array(base_arr), Value::Array(patch_arr)) => merge_arrays(base_arr, patch_arr),
        (_, patch_value) => patch_value.clone(),
    }
}

fn merge_objects(base: &Map<String, Value>, patch: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = base.clone();
    for (key, patch_value) in patch {
        match merged.get(key) {
            Some(base_value) => {
                merged.insert(key.clone(), deep_merge(base_value, patch_value));
            }
            None => {
                merged.insert(key.clone(), patch_value.clone());
            }
        }
    }
    merged
}

fn identity_key(value: &Value) -> Option<&Value> {
    let obj = value.as_object()?;
    obj.get("id").or_else(|| obj.get("_id"))
}

fn merge_arrays(base: &[Value], patch: &[Value]) -> Value {
    let mut merged: Vec<Value> = base.to_vec();

    for patch_item in patch {
        if let Some(key) = identity_key(patch_item) {
            let key = key.clone();
            if let Some(existing) = merged.iter_mut().find(|m| identity_key(m) == Some(&key)) {
                *existing = deep_merge(existing, patch_item);
                continue;
            }
            merged.push(patch_item.clone());
        } else if !merged.contains(patch_item) {
            merged.push(patch_item.clone());
        }
    }

    Value::Array(merged)
}
