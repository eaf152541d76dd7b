//! Configuration document consumed by the diff engine
//!
//! Configuration is a nested key-value document with defaults merged in.
//! Lookups never fail: a missing section resolves to `null`, which every
//! strategy treats as its benign default.

use serde::de::DeserializeOwned;
use serde_json::Value;

static NULL: Value = Value::Null;

/// Nested key-value configuration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigDocument {
    root: Value,
}

impl ConfigDocument {
    pub fn new(root: Value) -> Self {
        Self { root }
    }

    /// Build from a defaults document with user overrides merged on top
    pub fn with_defaults(defaults: Value, overrides: Value) -> Self {
        Self {
            root: merge_defaults(defaults, overrides),
        }
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    /// Resolve a dotted path such as `"diff.startup"`
    pub fn section(&self, path: &str) -> &Value {
        if path.is_empty() {
            return &self.root;
        }
        path.split('.')
            .try_fold(&self.root, |value, key| value.as_object()?.get(key))
            .unwrap_or(&NULL)
    }

    /// Read a boolean flag, falling back to `default` when absent or not a bool
    pub fn flag(&self, path: &str, default: bool) -> bool {
        self.section(path).as_bool().unwrap_or(default)
    }

    /// Deserialize a section, using `T::default()` when it is absent or malformed
    pub fn typed_section<T: DeserializeOwned + Default>(&self, path: &str) -> T {
        typed(self.section(path), path)
    }
}

/// Deserialize a section value, falling back to the default
pub(crate) fn typed<T: DeserializeOwned + Default>(value: &Value, path: &str) -> T {
    if value.is_null() {
        return T::default();
    }
    match serde_json::from_value(value.clone()) {
        Ok(parsed) => parsed,
        Err(e) => {
            log::warn!("Ignoring malformed config section '{path}': {e}");
            T::default()
        }
    }
}

/// Deep-merge `overrides` onto `defaults`
///
/// Objects merge key by key; arrays and scalars in `overrides` replace the
/// default wholesale. A `null` override keeps the default.
pub fn merge_defaults(defaults: Value, overrides: Value) -> Value {
    match (defaults, overrides) {
        (Value::Object(mut base), Value::Object(over)) => {
            for (key, value) in over {
                let merged = match base.remove(&key) {
                    Some(existing) => merge_defaults(existing, value),
                    None => value,
                };
                base.insert(key, merged);
            }
            Value::Object(base)
        }
        (base, Value::Null) => base,
        (_, over) => over,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct Gate {
        #[serde(default)]
        enabled: bool,
    }

    #[test]
    fn test_section_resolves_dotted_paths() {
        let doc = ConfigDocument::new(json!({"diff": {"startup": {"safe": ["a*"]}}}));
        assert_eq!(doc.section("diff.startup.safe"), &json!(["a*"]));
        assert_eq!(doc.section("diff.missing"), &Value::Null);
        assert_eq!(doc.section("diff.startup.safe.deeper"), &Value::Null);
        assert_eq!(doc.section(""), doc.root());
    }

    #[test]
    fn test_flag_defaults() {
        let doc = ConfigDocument::new(json!({"skip": {"updates": true, "odd": "yes"}}));
        assert!(doc.flag("skip.updates", false));
        assert!(!doc.flag("skip.bloatware", false));
        assert!(doc.flag("skip.odd", true));
    }

    #[test]
    fn test_typed_section_falls_back_to_default() {
        let doc = ConfigDocument::new(json!({"gate": {"enabled": "not-a-bool"}}));
        assert_eq!(doc.typed_section::<Gate>("gate"), Gate::default());
        assert_eq!(doc.typed_section::<Gate>("absent"), Gate::default());
    }

    #[test]
    fn test_merge_defaults() {
        let defaults = json!({
            "execution": {"jobs": 1, "force": false},
            "diff": {"startup": {"safe": ["a"], "default_pass": false}}
        });
        let overrides = json!({
            "execution": {"jobs": 4},
            "diff": {"startup": {"safe": ["b", "c"]}},
            "extra": null
        });
        let merged = merge_defaults(defaults, overrides);
        assert_eq!(merged["execution"]["jobs"], json!(4));
        assert_eq!(merged["execution"]["force"], json!(false));
        assert_eq!(merged["diff"]["startup"]["safe"], json!(["b", "c"]));
        assert_eq!(merged["diff"]["startup"]["default_pass"], json!(false));
        assert_eq!(merged["extra"], Value::Null);
    }
}
