//! Task descriptors and entry points
//!
//! A task is a named unit of audit or action work. Discovery produces raw
//! [`TaskSpec`]s; registration validates them into immutable
//! [`TaskDescriptor`]s holding a resolved [`TaskEntry`].

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Everything a task receives when it is invoked
#[derive(Debug, Clone)]
pub struct TaskInvocation {
    /// Name of the task being run
    pub task: String,
    /// Parameters declared on the descriptor
    pub parameters: Map<String, Value>,
    /// Items the diff engine selected for this task, if the task has a diff entry
    pub actionable: Option<Vec<Value>>,
    /// Side effects must be suppressed
    pub dry_run: bool,
    /// Identifier shared by every task of the run
    pub correlation_id: String,
    /// Whether the process holds elevated privileges
    pub elevated: bool,
}

impl TaskInvocation {
    /// Get a string parameter
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(Value::as_str)
    }

    /// Get an integer parameter
    pub fn param_i64(&self, key: &str) -> Option<i64> {
        self.parameters.get(key).and_then(Value::as_i64)
    }

    /// Actionable items, empty when the task has no diff entry
    pub fn actionable_items(&self) -> &[Value] {
        self.actionable.as_deref().unwrap_or(&[])
    }
}

/// What a task reports back on successful return
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskOutcome {
    /// Opaque task output (audit payload, summary, ...)
    pub output: Value,
    /// Whether the task changed anything on the machine
    pub mutated: bool,
    /// Non-fatal remarks surfaced in the result
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl TaskOutcome {
    /// Outcome of a task that changed the machine
    pub fn changed(output: Value) -> Self {
        Self {
            output,
            mutated: true,
            warnings: Vec::new(),
        }
    }

    /// Outcome of a task that left the machine untouched
    pub fn unchanged(output: Value) -> Self {
        Self {
            output,
            mutated: false,
            warnings: Vec::new(),
        }
    }

    /// Attach a warning
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

/// Callable behind a task
///
/// Entry points are resolved once when the catalog is discovered and stored on
/// the descriptor; the engine calls them by reference.
pub trait TaskEntry: Send + Sync {
    /// Run the task
    fn run(&self, invocation: &TaskInvocation) -> anyhow::Result<TaskOutcome>;
}

/// Entry point backed by a closure
pub struct FnEntry<F>(pub F);

impl<F> TaskEntry for FnEntry<F>
where
    F: Fn(&TaskInvocation) -> anyhow::Result<TaskOutcome> + Send + Sync,
{
    fn run(&self, invocation: &TaskInvocation) -> anyhow::Result<TaskOutcome> {
        (self.0)(invocation)
    }
}

/// Shared handle to an entry point
pub type SharedEntry = Arc<dyn TaskEntry>;

fn default_category() -> String {
    "action".to_string()
}

/// Raw task declaration as produced by discovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Unique task name
    pub name: String,

    /// Grouping tag used for diff lookup and display
    #[serde(default = "default_category")]
    pub category: String,

    /// Direct dependencies; must be present, may be empty
    #[serde(default)]
    pub depends_on: Option<Vec<String>>,

    /// Task needs administrator/root rights
    #[serde(default)]
    pub requires_elevation: bool,

    /// Time bound in seconds; the run default applies when absent
    #[serde(default)]
    pub timeout_secs: Option<i64>,

    /// Audit key this task produces or consumes
    #[serde(default)]
    pub audit_key: Option<String>,

    /// Name of the entry point to resolve
    pub entry: String,

    /// Parameters passed through to the entry point
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

/// Validated, immutable definition of a runnable unit
#[derive(Clone)]
pub struct TaskDescriptor {
    name: String,
    category: String,
    depends_on: BTreeSet<String>,
    requires_elevation: bool,
    timeout: Duration,
    audit_key: Option<String>,
    parameters: Map<String, Value>,
    entry_name: String,
    entry: SharedEntry,
}

impl TaskDescriptor {
    /// Validate a raw spec and bind it to its resolved entry point
    pub fn from_spec(spec: TaskSpec, entry: SharedEntry, default_timeout_secs: i64) -> Result<Self> {
        let name = spec.name.trim().to_string();
        if name.is_empty() {
            return Err(Error::configuration("task name cannot be empty"));
        }

        let Some(depends_on) = spec.depends_on else {
            return Err(Error::configuration(format!(
                "task '{name}' is missing its depends_on list"
            )));
        };
        let depends_on: BTreeSet<String> = depends_on.into_iter().collect();
        if depends_on.contains(&name) {
            return Err(Error::configuration(format!(
                "task '{name}' depends on itself"
            )));
        }

        let timeout_secs = spec.timeout_secs.unwrap_or(default_timeout_secs);
        if timeout_secs <= 0 {
            return Err(Error::configuration(format!(
                "task '{name}' timeout must be greater than 0 (got {timeout_secs})"
            )));
        }

        Ok(Self {
            name,
            category: spec.category,
            depends_on,
            requires_elevation: spec.requires_elevation,
            timeout: Duration::from_secs(timeout_secs.unsigned_abs()),
            audit_key: spec.audit_key,
            parameters: spec.parameters,
            entry_name: spec.entry,
            entry,
        })
    }

    /// Start a descriptor for a closure entry point (no dependencies, 60s bound)
    pub fn builder(name: impl Into<String>, entry: SharedEntry) -> DescriptorBuilder {
        DescriptorBuilder {
            spec: TaskSpec {
                name: name.into(),
                category: default_category(),
                depends_on: Some(Vec::new()),
                requires_elevation: false,
                timeout_secs: Some(60),
                audit_key: None,
                entry: "inline".to_string(),
                parameters: Map::new(),
            },
            entry,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn depends_on(&self) -> &BTreeSet<String> {
        &self.depends_on
    }

    pub fn requires_elevation(&self) -> bool {
        self.requires_elevation
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn audit_key(&self) -> Option<&str> {
        self.audit_key.as_deref()
    }

    pub fn parameters(&self) -> &Map<String, Value> {
        &self.parameters
    }

    /// Name of the entry point this descriptor was resolved from
    pub fn entry_name(&self) -> &str {
        &self.entry_name
    }

    pub fn entry(&self) -> SharedEntry {
        Arc::clone(&self.entry)
    }
}

impl fmt::Debug for TaskDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDescriptor")
            .field("name", &self.name)
            .field("category", &self.category)
            .field("depends_on", &self.depends_on)
            .field("requires_elevation", &self.requires_elevation)
            .field("timeout", &self.timeout)
            .field("entry", &self.entry_name)
            .finish_non_exhaustive()
    }
}

/// Fluent construction of descriptors, mostly for tests and embedders
pub struct DescriptorBuilder {
    spec: TaskSpec,
    entry: SharedEntry,
}

impl DescriptorBuilder {
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.spec.category = category.into();
        self
    }

    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.spec.depends_on = Some(deps.into_iter().map(Into::into).collect());
        self
    }

    pub fn requires_elevation(mut self, required: bool) -> Self {
        self.spec.requires_elevation = required;
        self
    }

    pub fn timeout_secs(mut self, secs: i64) -> Self {
        self.spec.timeout_secs = Some(secs);
        self
    }

    pub fn audit_key(mut self, key: impl Into<String>) -> Self {
        self.spec.audit_key = Some(key.into());
        self
    }

    pub fn parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.spec.parameters.insert(key.into(), value);
        self
    }

    /// Validate and build
    pub fn build(self) -> Result<TaskDescriptor> {
        let default_timeout = self.spec.timeout_secs.unwrap_or(60);
        TaskDescriptor::from_spec(self.spec, self.entry, default_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn noop() -> SharedEntry {
        Arc::new(FnEntry(|_: &TaskInvocation| Ok(TaskOutcome::unchanged(Value::Null))))
    }

    fn spec(name: &str, deps: Option<Vec<&str>>) -> TaskSpec {
        TaskSpec {
            name: name.to_string(),
            category: "action".to_string(),
            depends_on: deps.map(|d| d.into_iter().map(String::from).collect()),
            requires_elevation: false,
            timeout_secs: None,
            audit_key: None,
            entry: "noop".to_string(),
            parameters: Map::new(),
        }
    }

    #[test]
    fn test_missing_depends_on_is_configuration_error() {
        let err = TaskDescriptor::from_spec(spec("a", None), noop(), 60).unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
        assert!(err.to_string().contains("depends_on"));
    }

    #[test]
    fn test_empty_depends_on_is_valid() {
        let desc = TaskDescriptor::from_spec(spec("a", Some(vec![])), noop(), 60).unwrap();
        assert!(desc.depends_on().is_empty());
        assert_eq!(desc.timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_self_dependency_rejected() {
        let err = TaskDescriptor::from_spec(spec("a", Some(vec!["a"])), noop(), 60).unwrap_err();
        assert!(err.to_string().contains("depends on itself"));
    }

    #[test]
    fn test_non_positive_timeout_rejected() {
        let mut raw = spec("a", Some(vec![]));
        raw.timeout_secs = Some(0);
        assert!(TaskDescriptor::from_spec(raw, noop(), 60).is_err());

        let mut raw = spec("a", Some(vec![]));
        raw.timeout_secs = Some(-5);
        assert!(TaskDescriptor::from_spec(raw, noop(), 60).is_err());

        assert!(TaskDescriptor::from_spec(spec("a", Some(vec![])), noop(), 0).is_err());
    }

    #[test]
    fn test_spec_deserializes_with_defaults() {
        let raw: TaskSpec = serde_json::from_value(json!({
            "name": "cleanup",
            "entry": "noop",
            "depends_on": ["scan"]
        }))
        .unwrap();
        assert_eq!(raw.category, "action");
        assert!(!raw.requires_elevation);
        assert_eq!(raw.depends_on, Some(vec!["scan".to_string()]));
    }

    #[test]
    fn test_invocation_params() {
        let mut parameters = Map::new();
        parameters.insert("path".into(), json!("/tmp"));
        parameters.insert("days".into(), json!(7));
        let inv = TaskInvocation {
            task: "t".into(),
            parameters,
            actionable: None,
            dry_run: false,
            correlation_id: "c".into(),
            elevated: false,
        };
        assert_eq!(inv.param_str("path"), Some("/tmp"));
        assert_eq!(inv.param_i64("days"), Some(7));
        assert!(inv.actionable_items().is_empty());
    }
}
