//! Deep-merge semantics for the session `data` bag.
//!
//! Applied key by key from an incoming partial map:
//! - a `null` value is the delete sentinel: the key is removed (or the
//!   delete is a no-op if absent) — stored data never contains nulls;
//! - map into map recurses with the same rule;
//! - list into list appends only elements not already structurally
//!   present, preserving order of first appearance;
//! - anything else replaces the existing value.

use serde_json::{Map, Value};

/// Merge `incoming` into `existing`, returning the merged map.
pub fn merge_data(existing: &Map<String, Value>, incoming: &Map<String, Value>) -> Map<String, Value> {
    let mut result = existing.clone();

    for (key, value) in incoming {
        match value {
            Value::Null => {
                // Delete sentinel. Removing an absent key is a no-op.
                result.remove(key);
            }
            Value::Object(incoming_map) => {
                let base = match result.get(key) {
                    Some(Value::Object(existing_map)) => existing_map.clone(),
                    // Merging into an empty map scrubs any nested delete
                    // sentinels, keeping the no-nulls invariant.
                    _ => Map::new(),
                };
                let merged = merge_data(&base, incoming_map);
                result.insert(key.clone(), Value::Object(merged));
            }
            Value::Array(incoming_list) => match result.get(key) {
                Some(Value::Array(existing_list)) => {
                    let merged = append_unique(existing_list, incoming_list);
                    result.insert(key.clone(), Value::Array(merged));
                }
                _ => {
                    result.insert(key.clone(), value.clone());
                }
            },
            _ => {
                result.insert(key.clone(), value.clone());
            }
        }
    }

    result
}

/// Existing list followed by incoming elements not already structurally
/// present.
pub fn append_unique(existing: &[Value], incoming: &[Value]) -> Vec<Value> {
    let mut result: Vec<Value> = existing.to_vec();
    for item in incoming {
        if !result.iter().any(|present| values_equal(present, item)) {
            result.push(item.clone());
        }
    }
    result
}

/// Recursive structural equality: maps by sorted key/value pairs, lists
/// by element sequence, scalars by value (numbers compare numerically,
/// so `1` equals `1.0`).
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Object(ma), Value::Object(mb)) => {
            if ma.len() != mb.len() {
                return false;
            }
            let mut keys_a: Vec<&String> = ma.keys().collect();
            let mut keys_b: Vec<&String> = mb.keys().collect();
            keys_a.sort();
            keys_b.sort();
            if keys_a != keys_b {
                return false;
            }
            keys_a
                .iter()
                .all(|k| values_equal(&ma[k.as_str()], &mb[k.as_str()]))
        }
        (Value::Array(la), Value::Array(lb)) => {
            la.len() == lb.len()
                && la.iter().zip(lb.iter()).all(|(x, y)| values_equal(x, y))
        }
        (Value::Number(na), Value::Number(nb)) => {
            match (na.as_f64(), nb.as_f64()) {
                (Some(x), Some(y)) => x == y,
                _ => na == nb,
            }
        }
        _ => a == b,
    }
}
