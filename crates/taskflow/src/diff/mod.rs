//! Diff engine - turns raw audit output plus policy into per-task work lists
//!
//! The diff engine decides *what* a task acts on, not *whether* it runs: a task
//! with an empty actionable list is still dispatched.

pub mod extract;
pub mod pattern;
pub mod plan;
pub mod strategy;

use crate::config::ConfigDocument;
use crate::context::DiffSink;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub use extract::{AuditResults, extract_detections, item_key};
pub use pattern::PatternSet;
pub use plan::{DiffPlan, DiffPlanEntry, Strategy};

/// Filtered work list for one task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffResult {
    pub task: String,
    pub strategy: Strategy,
    /// Size of the raw detection list
    pub detected_count: usize,
    /// Detections the task should act on, in detection order
    pub actionable: Vec<Value>,
    /// "N detected, M actionable"
    pub reason: String,
    /// Where the actionable list was persisted, if it was
    pub location: Option<String>,
}

impl DiffResult {
    pub fn actionable_count(&self) -> usize {
        self.actionable.len()
    }

    pub fn has_work(&self) -> bool {
        !self.actionable.is_empty()
    }
}

/// Diff results for a run, keyed by task
#[derive(Debug, Clone, Default)]
pub struct DiffSet {
    results: BTreeMap<String, DiffResult>,
}

impl DiffSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, result: DiffResult) {
        self.results.insert(result.task.clone(), result);
    }

    pub fn get(&self, task: &str) -> Option<&DiffResult> {
        self.results.get(task)
    }

    /// Diff applicable to a task: by task name first, then by category
    pub fn lookup(&self, task: &str, category: &str) -> Option<&DiffResult> {
        self.results.get(task).or_else(|| self.results.get(category))
    }

    pub fn iter(&self) -> impl Iterator<Item = &DiffResult> {
        self.results.values()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Compute one task's diff without persisting it
pub fn compute_entry(
    entry: &DiffPlanEntry,
    audit: &AuditResults,
    config: &ConfigDocument,
) -> DiffResult {
    let detections = extract_detections(audit, &entry.audit_key, entry.list_field.as_deref());
    let section = entry.resolve_section(config.section(&entry.config_section));
    let actionable = strategy::apply(entry.strategy, &detections, &section, &entry.match_field);

    DiffResult {
        task: entry.task.clone(),
        strategy: entry.strategy,
        detected_count: detections.len(),
        reason: format!("{} detected, {} actionable", detections.len(), actionable.len()),
        actionable,
        location: None,
    }
}

/// Build the diff set for every enabled plan row, persisting each list
///
/// A persistence failure is logged and leaves the result without a location;
/// it does not stop the remaining rows.
pub fn build_diff_set(
    plan: &DiffPlan,
    audit: &AuditResults,
    config: &ConfigDocument,
    sink: &dyn DiffSink,
) -> DiffSet {
    let mut set = DiffSet::new();

    for entry in plan.enabled_entries() {
        let mut result = compute_entry(entry, audit, config);

        match sink.persist(&entry.task, &result.actionable) {
            Ok(location) => result.location = location,
            Err(e) => log::warn!("Failed to persist diff list for '{}': {e:#}", entry.task),
        }

        log::info!(
            "Diff '{}' ({}): {}",
            entry.task,
            entry.strategy,
            result.reason
        );
        set.insert(result);
    }

    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{MemorySink, NoPersist};
    use serde_json::json;

    fn audit() -> AuditResults {
        json!({
            "bloatware": {"detected": [{"name": "CandyCrush"}, {"name": "Solitaire"}, {"name": "Calculator"}]},
            "updates": {"pending": ["KB1", "KB2"]},
            "startup": {"recommendations": [{"name": "OneDrive"}, {"name": "SecurityHealth"}]}
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    fn config() -> ConfigDocument {
        ConfigDocument::new(json!({
            "diff": {
                "bloatware": ["CandyCrush", "Solitaire"],
                "startup": {"never_touch": ["security*"], "default_pass": true}
            },
            "skip": {"privacy": true}
        }))
    }

    #[test]
    fn test_build_diff_set() {
        let config = config();
        let plan = DiffPlan::build(DiffPlan::standard_rows(), &config);
        let sink = MemorySink::default();
        let set = build_diff_set(&plan, &audit(), &config, &sink);

        let bloat = set.get("bloatware-removal").unwrap();
        assert_eq!(bloat.detected_count, 3);
        assert_eq!(bloat.actionable_count(), 2);
        assert_eq!(bloat.reason, "3 detected, 2 actionable");
        assert_eq!(bloat.location.as_deref(), Some("memory://bloatware-removal"));

        let startup = set.get("startup-optimization").unwrap();
        assert_eq!(startup.actionable, vec![json!({"name": "OneDrive"})]);

        let updates = set.get("system-updates").unwrap();
        assert_eq!(updates.actionable.len(), 2);

        // Rows without audit data still produce an (empty) entry
        let apps = set.get("essential-apps").unwrap();
        assert_eq!(apps.detected_count, 0);
        assert!(!apps.has_work());

        // Skipped rows produce nothing
        assert!(set.get("privacy-hardening").is_none());

        assert_eq!(sink.stored("bloatware-removal").unwrap().len(), 2);
    }

    struct BrokenSink;

    impl DiffSink for BrokenSink {
        fn persist(&self, _task: &str, _items: &[Value]) -> anyhow::Result<Option<String>> {
            anyhow::bail!("disk full")
        }
    }

    #[test]
    fn test_persistence_failure_is_not_fatal() {
        let config = config();
        let plan = DiffPlan::build(DiffPlan::standard_rows(), &config);
        let set = build_diff_set(&plan, &audit(), &config, &BrokenSink);
        let bloat = set.get("bloatware-removal").unwrap();
        assert_eq!(bloat.location, None);
        assert_eq!(bloat.actionable_count(), 2);
    }

    #[test]
    fn test_startup_row_requires_safe_match() {
        let audit = json!({"startup": {"recommendations": ["a", "b", "ab"]}})
            .as_object()
            .cloned()
            .unwrap();
        let config = ConfigDocument::new(json!({
            "diff": {"startup": {"never_touch": ["a*"], "safe": ["a", "ab"]}}
        }));
        let plan = DiffPlan::build(DiffPlan::standard_rows(), &config);
        let set = build_diff_set(&plan, &audit, &config, &NoPersist);

        let startup = set.get("startup-optimization").unwrap();
        assert_eq!(startup.detected_count, 3);
        assert!(startup.actionable.is_empty());
        assert_eq!(startup.reason, "3 detected, 0 actionable");
    }

    #[test]
    fn test_unconfigured_service_row_acts_on_nothing() {
        let audit = json!({"services": {"recommendations": ["Fax", "XblGameSave"]}})
            .as_object()
            .cloned()
            .unwrap();
        let config = ConfigDocument::new(json!({}));
        let plan = DiffPlan::build(DiffPlan::standard_rows(), &config);
        let set = build_diff_set(&plan, &audit, &config, &NoPersist);
        assert!(set.get("service-optimization").unwrap().actionable.is_empty());

        let config = ConfigDocument::new(json!({"diff": {"services": {"safe": ["fax"]}}}));
        let set = build_diff_set(&plan, &audit, &config, &NoPersist);
        assert_eq!(
            set.get("service-optimization").unwrap().actionable,
            vec![json!("Fax")]
        );
    }

    #[test]
    fn test_lookup_falls_back_to_category() {
        let config = config();
        let plan = DiffPlan::build(DiffPlan::standard_rows(), &config);
        let set = build_diff_set(&plan, &audit(), &config, &NoPersist);
        assert!(set.lookup("remove-appx", "bloatware-removal").is_some());
        assert!(set.lookup("system-updates", "other").is_some());
        assert!(set.lookup("unrelated", "other").is_none());
    }
}
