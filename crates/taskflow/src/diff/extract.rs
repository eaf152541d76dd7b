//! Pulling detection lists out of audit payloads
//!
//! Audit producers nest their payload differently: some return a bare list,
//! some wrap it under a field such as `missing` or `recommendations`.

use serde_json::{Map, Value};

/// Audit results keyed by audit key
pub type AuditResults = Map<String, Value>;

/// Extract the detection list stored under `key`
///
/// A missing key or `null` payload yields an empty list. When `list_field`
/// names a field present on an object payload, that field holds the list;
/// otherwise the payload itself is coerced to a list.
pub fn extract_detections(
    audit: &AuditResults,
    key: &str,
    list_field: Option<&str>,
) -> Vec<Value> {
    let Some(payload) = audit.get(key) else {
        log::debug!("No audit results for '{key}'");
        return Vec::new();
    };

    let nested = list_field
        .and_then(|field| payload.as_object().and_then(|obj| get_ignore_case(obj, field)));

    coerce_to_list(nested.unwrap_or(payload))
}

/// Coerce any value to a list: arrays as-is, `null` to empty, anything else wrapped
pub fn coerce_to_list(value: &Value) -> Vec<Value> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items.iter().filter(|v| !v.is_null()).cloned().collect(),
        other => vec![other.clone()],
    }
}

/// Matching key of a detection item
///
/// Strings are their own key. Objects use `field` (case-insensitive),
/// falling back to `name`. Other values have no key.
pub fn item_key<'a>(item: &'a Value, field: &str) -> Option<&'a str> {
    match item {
        Value::String(s) => Some(s.as_str()),
        Value::Object(obj) => get_ignore_case(obj, field)
            .or_else(|| get_ignore_case(obj, "name"))
            .and_then(Value::as_str),
        _ => None,
    }
}

pub(crate) fn get_ignore_case<'a>(obj: &'a Map<String, Value>, field: &str) -> Option<&'a Value> {
    obj.get(field).or_else(|| {
        obj.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(field))
            .map(|(_, v)| v)
    })
}
