//! Records are untyped JSON objects returned by the API.
//!
//! Storage back ends report identity as `_id` or `pk` and attach a `_rev`
//! revision. `normalize` folds these into a single `id` so a fetched record
//! can be passed straight back to `save`. It is never applied by the loader.

use serde_json::{Map, Value};

pub type Record = Map<String, Value>;

/// Fields dropped by `normalize`.
const STRIPPED: [&str; 3] = ["_rev", "pk", "_id"];

/// Rewrite identifier fields into `id`, in place. Idempotent.
///
/// A record without `id` takes the value of `pk`. `_rev`, `pk` and `_id` are
/// always removed; `_id` is never promoted.
pub fn normalize(record: &mut Record) {
    if !record.contains_key("id") {
        if let Some(pk) = record.get("pk").cloned() {
            record.insert("id".to_string(), pk);
        }
    }
    for key in STRIPPED {
        record.remove(key);
    }
}

/// Apply `normalize` to a loaded value: a single record or an array of them.
/// Non-object values are left untouched.
pub fn normalize_value(value: &mut Value) {
    match value {
        Value::Object(record) => normalize(record),
        Value::Array(items) => {
            for item in items {
                if let Value::Object(record) = item {
                    normalize(record);
                }
            }
        }
        _ => {}
    }
}

/// The `id` of a record rendered for use in a URL.
pub fn record_id(record: &Record) -> Option<String> {
    match record.get("id")? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
