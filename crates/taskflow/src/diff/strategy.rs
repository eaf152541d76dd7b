//! Diff strategies
//!
//! Every strategy is a pure function of the detections and one configuration
//! section. Strategies only drop or keep detections; they never add items.

use super::extract::{coerce_to_list, get_ignore_case, item_key};
use super::pattern::PatternSet;
use super::plan::Strategy;
use crate::config::typed;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

fn default_true() -> bool {
    true
}

/// Section for [`Strategy::PolicyGate`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyGateConfig {
    /// Master switch; `false` empties the list
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Per item-type switches, keyed by the item's `type` field
    #[serde(default)]
    pub types: BTreeMap<String, bool>,
}

impl Default for PolicyGateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            types: BTreeMap::new(),
        }
    }
}

/// Section for [`Strategy::PatternExclude`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternExcludeConfig {
    /// Items matching these are dropped
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Items matching these are dropped even when they also match `safe`
    #[serde(default)]
    pub never_touch: Vec<String>,

    /// Items matching these are kept
    #[serde(default)]
    pub safe: Vec<String>,

    /// Whether items matching no pattern at all are kept
    #[serde(default = "default_true")]
    pub default_pass: bool,
}

impl Default for PatternExcludeConfig {
    fn default() -> Self {
        Self {
            exclude: Vec::new(),
            never_touch: Vec::new(),
            safe: Vec::new(),
            default_pass: true,
        }
    }
}

/// Section for [`Strategy::Passthrough`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassthroughConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for PassthroughConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Run `strategy` over `detections` with its configuration section
pub fn apply(
    strategy: Strategy,
    detections: &[Value],
    section: &Value,
    match_field: &str,
) -> Vec<Value> {
    match strategy {
        Strategy::DetectedVsConfig => detected_vs_config(detections, section, match_field),
        Strategy::PolicyGate => policy_gate(detections, &typed(section, "policy_gate")),
        Strategy::PatternExclude => {
            pattern_exclude(detections, &typed(section, "pattern_exclude"), match_field)
        }
        Strategy::Passthrough => passthrough(detections, &typed(section, "passthrough")),
    }
}

/// Keep detections that match an entry of the reference list
///
/// The section is either a list or an object with an `items` list. Reference
/// entries may be strings or objects; matching is case-insensitive on
/// `match_field`. Detection order is preserved.
pub fn detected_vs_config(detections: &[Value], section: &Value, match_field: &str) -> Vec<Value> {
    let references = match section {
        Value::Object(obj) => get_ignore_case(obj, "items")
            .map(coerce_to_list)
            .unwrap_or_default(),
        other => coerce_to_list(other),
    };

    let approved: HashSet<String> = references
        .iter()
        .filter_map(|r| item_key(r, match_field))
        .map(str::to_lowercase)
        .collect();

    detections
        .iter()
        .filter(|item| {
            item_key(item, match_field).is_some_and(|k| approved.contains(&k.to_lowercase()))
        })
        .cloned()
        .collect()
}

/// Pass everything through unless disabled; drop item types switched off
pub fn policy_gate(detections: &[Value], config: &PolicyGateConfig) -> Vec<Value> {
    if !config.enabled {
        return Vec::new();
    }

    let disabled: HashSet<String> = config
        .types
        .iter()
        .filter(|(_, on)| !**on)
        .map(|(t, _)| t.to_lowercase())
        .collect();

    detections
        .iter()
        .filter(|item| match item_type(item) {
            Some(t) => !disabled.contains(&t.to_lowercase()),
            None => true,
        })
        .cloned()
        .collect()
}

fn item_type(item: &Value) -> Option<&str> {
    let obj = item.as_object()?;
    get_ignore_case(obj, "type")
        .or_else(|| get_ignore_case(obj, "category"))
        .and_then(Value::as_str)
}

/// Drop detections matching exclusion or never-touch patterns
///
/// Precedence: never-touch, then exclude, then safe; anything unmatched is
/// kept only when `default_pass` is set. Items without a key are dropped.
pub fn pattern_exclude(
    detections: &[Value],
    config: &PatternExcludeConfig,
    match_field: &str,
) -> Vec<Value> {
    let never_touch = PatternSet::new(&config.never_touch);
    let exclude = PatternSet::new(&config.exclude);
    let safe = PatternSet::new(&config.safe);

    detections
        .iter()
        .filter(|item| {
            let Some(name) = item_key(item, match_field) else {
                return false;
            };
            if never_touch.is_match(name) || exclude.is_match(name) {
                return false;
            }
            safe.is_match(name) || config.default_pass
        })
        .cloned()
        .collect()
}

/// Identity, unless the master switch is off
pub fn passthrough(detections: &[Value], config: &PassthroughConfig) -> Vec<Value> {
    if config.enabled {
        detections.to_vec()
    } else {
        Vec::new()
    }
}
