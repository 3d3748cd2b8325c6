//! Dotted-path lookup into JSON values.

use serde_json::Value;

/// Resolve a dotted path like `"state.spentToday"` against `value`.
///
/// Returns `None` if any segment is missing or any intermediate value is
/// `null`. A terminal `null` is returned as `Some(&Value::Null)` so callers
/// can tell "present but null" from "absent".
pub fn lookup_path<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
    let mut current = value;
    for segment in path.split('.') {
        if current.is_null() {
            return None;
        }
        current = match current {
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            other => other.get(segment)?,
        };
    }
    Some(current)
}

/// Return true if `path` resolves to a present, non-null value.
pub fn is_present(value: &Value, path: &str) -> bool {
    matches!(lookup_path(value, path), Some(v) if !v.is_null())
}
