//! Static diff plan: which audit key and strategy feed each task

use crate::config::ConfigDocument;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::fmt;

/// How raw detections are narrowed into an actionable list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Keep detections that match an entry of a reference list
    DetectedVsConfig,
    /// All-or-nothing on an `enabled` flag, with per-type sub-flags
    PolicyGate,
    /// Drop detections matching exclusion globs
    PatternExclude,
    /// Identity, unless a master switch is off
    Passthrough,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::DetectedVsConfig => "detected_vs_config",
            Self::PolicyGate => "policy_gate",
            Self::PatternExclude => "pattern_exclude",
            Self::Passthrough => "passthrough",
        };
        f.write_str(name)
    }
}

fn default_match_field() -> String {
    "name".to_string()
}

/// One row of the diff plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffPlanEntry {
    /// Task (or task category) the actionable list is for
    pub task: String,

    /// Key in the audit results holding the raw detections
    pub audit_key: String,

    /// Nested field of the audit payload that holds the list
    #[serde(default)]
    pub list_field: Option<String>,

    pub strategy: Strategy,

    /// Configuration section (dotted path) feeding the strategy
    pub config_section: String,

    /// Item field used to match detections against configuration
    #[serde(default = "default_match_field")]
    pub match_field: String,

    /// Key under `[skip]` that disables this row
    #[serde(default)]
    pub skip_flag: Option<String>,

    /// `default_pass` for pattern rows whose section leaves it unset
    #[serde(default)]
    pub default_pass: Option<bool>,

    /// Derived from the skip flag when the plan is built
    #[serde(skip, default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl DiffPlanEntry {
    pub fn new(
        task: &str,
        audit_key: &str,
        list_field: Option<&str>,
        strategy: Strategy,
        config_section: &str,
        skip_flag: Option<&str>,
    ) -> Self {
        Self {
            task: task.to_string(),
            audit_key: audit_key.to_string(),
            list_field: list_field.map(String::from),
            strategy,
            config_section: config_section.to_string(),
            match_field: default_match_field(),
            skip_flag: skip_flag.map(String::from),
            default_pass: None,
            enabled: true,
        }
    }

    pub fn with_default_pass(mut self, pass: bool) -> Self {
        self.default_pass = Some(pass);
        self
    }

    /// The configuration section with this row's defaults filled in
    pub fn resolve_section<'a>(&self, section: &'a Value) -> Cow<'a, Value> {
        let Some(pass) = self.default_pass else {
            return Cow::Borrowed(section);
        };
        if self.strategy != Strategy::PatternExclude {
            return Cow::Borrowed(section);
        }

        match section {
            Value::Object(obj) if obj.contains_key("default_pass") => Cow::Borrowed(section),
            Value::Object(obj) => {
                let mut obj = obj.clone();
                obj.insert("default_pass".to_string(), Value::Bool(pass));
                Cow::Owned(Value::Object(obj))
            }
            Value::Null => {
                let mut obj = Map::new();
                obj.insert("default_pass".to_string(), Value::Bool(pass));
                Cow::Owned(Value::Object(obj))
            }
            _ => Cow::Borrowed(section),
        }
    }
}

/// Ordered diff plan with each row's enablement resolved
#[derive(Debug, Clone, Default)]
pub struct DiffPlan {
    entries: Vec<DiffPlanEntry>,
}

impl DiffPlan {
    /// Resolve each row's `enabled` flag from the `[skip]` section
    pub fn build(rows: Vec<DiffPlanEntry>, config: &ConfigDocument) -> Self {
        let entries = rows
            .into_iter()
            .map(|mut row| {
                row.enabled = match &row.skip_flag {
                    Some(flag) => !config.flag(&format!("skip.{flag}"), false),
                    None => true,
                };
                if !row.enabled {
                    log::info!(
                        "Diff plan: '{}' disabled by skip.{}",
                        row.task,
                        row.skip_flag.as_deref().unwrap_or_default()
                    );
                }
                row
            })
            .collect();
        Self { entries }
    }

    /// The hand-declared default table
    ///
    /// Startup entries and services are only acted on when a pattern marks
    /// them safe.
    pub fn standard_rows() -> Vec<DiffPlanEntry> {
        vec![
            DiffPlanEntry::new(
                "bloatware-removal",
                "bloatware",
                Some("detected"),
                Strategy::DetectedVsConfig,
                "diff.bloatware",
                Some("bloatware"),
            ),
            DiffPlanEntry::new(
                "essential-apps",
                "essential-apps",
                Some("missing"),
                Strategy::DetectedVsConfig,
                "diff.essential_apps",
                Some("essential_apps"),
            ),
            DiffPlanEntry::new(
                "privacy-hardening",
                "privacy",
                Some("findings"),
                Strategy::PolicyGate,
                "diff.privacy",
                Some("privacy"),
            ),
            DiffPlanEntry::new(
                "startup-optimization",
                "startup",
                Some("recommendations"),
                Strategy::PatternExclude,
                "diff.startup",
                Some("optimization"),
            )
            .with_default_pass(false),
            DiffPlanEntry::new(
                "service-optimization",
                "services",
                Some("recommendations"),
                Strategy::PatternExclude,
                "diff.services",
                Some("optimization"),
            )
            .with_default_pass(false),
            DiffPlanEntry::new(
                "temp-cleanup",
                "temp-files",
                Some("items"),
                Strategy::PatternExclude,
                "diff.temp_files",
                Some("cleanup"),
            ),
            DiffPlanEntry::new(
                "system-updates",
                "updates",
                Some("pending"),
                Strategy::Passthrough,
                "diff.updates",
                Some("updates"),
            ),
        ]
    }

    /// Every row, enabled or not
    pub fn entries(&self) -> &[DiffPlanEntry] {
        &self.entries
    }

    /// Rows that survive their skip flag, in declared order
    pub fn enabled_entries(&self) -> impl Iterator<Item = &DiffPlanEntry> {
        self.entries.iter().filter(|e| e.enabled)
    }

    /// Tasks whose rows were switched off
    pub fn disabled_tasks(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|e| !e.enabled)
            .map(|e| e.task.as_str())
    }
}
