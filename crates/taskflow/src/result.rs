//! Standardized per-task results

use crate::error::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::time::Instant;
use uuid::Uuid;

/// Lifecycle state of a task within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    Running,
    /// Completed normally
    Success,
    /// Completed, but ran without privileges it declared it needs
    PartialSuccess,
    /// Task logic raised an error, or a precondition failed
    Failed,
    /// Switched off by configuration
    Skipped,
    /// Completed in dry-run mode without mutating anything
    DryRun,
    /// Did not finish within its time bound
    Timeout,
    /// Never dispatched because the run was cancelled
    Cancelled,
    /// Never dispatched because a prerequisite did not succeed
    DependencyFailure,
}

impl Status {
    /// Whether no further transition can happen
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }

    /// Whether dependents may run after this status
    pub fn is_successful(self) -> bool {
        matches!(self, Self::Success | Self::PartialSuccess | Self::DryRun)
    }

    /// Whether a result in this status carries an error message
    pub fn carries_error(self) -> bool {
        !matches!(self, Self::Success | Self::DryRun)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::PartialSuccess => "partial_success",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::DryRun => "dry_run",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::DependencyFailure => "dependency_failure",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse classification of failure messages for reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorTag {
    Privilege,
    NotFound,
    Timeout,
}

impl ErrorTag {
    /// Classify a failure message by keyword, case-insensitively
    pub fn classify(message: &str) -> BTreeSet<Self> {
        let lower = message.to_lowercase();
        let mut tags = BTreeSet::new();

        if lower.contains("privilege")
            || lower.contains("permission denied")
            || lower.contains("access is denied")
            || lower.contains("access denied")
            || lower.contains("administrator")
            || lower.contains("operation not permitted")
            || lower.contains("elevat")
        {
            tags.insert(Self::Privilege);
        }

        if lower.contains("not found")
            || lower.contains("no such file")
            || lower.contains("cannot find")
            || lower.contains("does not exist")
            || lower.contains("not recognized")
        {
            tags.insert(Self::NotFound);
        }

        if lower.contains("timed out") || lower.contains("timeout") {
            tags.insert(Self::Timeout);
        }

        tags
    }
}

/// Identifier shared by every result of one run
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Short form for file names and log lines
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A dispatched task whose result has not been finalized yet
#[derive(Debug)]
pub struct PendingResult {
    task: String,
    correlation_id: String,
    sequence: u64,
    started_at: DateTime<Utc>,
    started: Instant,
    warnings: Vec<String>,
}

impl PendingResult {
    /// Record dispatch of a task
    pub fn dispatch(task: impl Into<String>, correlation_id: &CorrelationId, sequence: u64) -> Self {
        Self {
            task: task.into(),
            correlation_id: correlation_id.to_string(),
            sequence,
            started_at: Utc::now(),
            started: Instant::now(),
            warnings: Vec::new(),
        }
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    /// Restart the clock when the entry point is actually invoked
    ///
    /// Tasks queued behind busy workers are timed from here, not from dispatch.
    pub fn start(&mut self) {
        self.started_at = Utc::now();
        self.started = Instant::now();
    }

    pub fn warn(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// Finalize with a terminal status
    ///
    /// The error message is dropped for statuses that carry none and filled in
    /// with a generic message for those that must carry one.
    pub fn finish(self, status: Status, output: Value, error: Option<String>) -> ExecutionResult {
        self.finish_with(status, output, error, Vec::new())
    }

    /// Finalize as a dependency failure naming the prerequisites responsible
    pub fn dependency_failure(self, failed: Vec<String>) -> ExecutionResult {
        let message = Error::DependencyFailure {
            task: self.task.clone(),
            failed: failed.clone(),
        }
        .to_string();
        self.finish_with(Status::DependencyFailure, Value::Null, Some(message), failed)
    }

    fn finish_with(
        self,
        status: Status,
        output: Value,
        error: Option<String>,
        failed_dependencies: Vec<String>,
    ) -> ExecutionResult {
        debug_assert!(status.is_terminal(), "results finish in a terminal status");

        let error = if status.carries_error() {
            Some(error.unwrap_or_else(|| format!("task ended with status {status}")))
        } else {
            None
        };
        let mut error_tags = error.as_deref().map(ErrorTag::classify).unwrap_or_default();
        if status == Status::Timeout {
            error_tags.insert(ErrorTag::Timeout);
        }

        let finished_at = Utc::now();
        ExecutionResult {
            task: self.task,
            correlation_id: self.correlation_id,
            sequence: self.sequence,
            status,
            started_at: self.started_at,
            finished_at,
            duration_secs: self.started.elapsed().as_secs_f64(),
            output,
            error,
            error_tags,
            warnings: self.warnings,
            failed_dependencies,
        }
    }
}

/// Final, immutable result of one task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    task: String,
    correlation_id: String,
    sequence: u64,
    status: Status,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    duration_secs: f64,
    output: Value,
    error: Option<String>,
    #[serde(default)]
    error_tags: BTreeSet<ErrorTag>,
    #[serde(default)]
    warnings: Vec<String>,
    #[serde(default)]
    failed_dependencies: Vec<String>,
}

impl ExecutionResult {
    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> DateTime<Utc> {
        self.finished_at
    }

    /// Wall-clock seconds from dispatch to the terminal transition
    pub fn duration_secs(&self) -> f64 {
        self.duration_secs
    }

    pub fn output(&self) -> &Value {
        &self.output
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn error_tags(&self) -> &BTreeSet<ErrorTag> {
        &self.error_tags
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Prerequisites that caused a dependency failure
    pub fn failed_dependencies(&self) -> &[String] {
        &self.failed_dependencies
    }

    pub fn is_successful(&self) -> bool {
        self.status.is_successful()
    }
}

/// Counts of results per terminal status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub success: usize,
    pub partial_success: usize,
    pub dry_run: usize,
    pub failed: usize,
    pub skipped: usize,
    pub timeout: usize,
    pub cancelled: usize,
    pub dependency_failure: usize,
}

impl RunSummary {
    pub fn from_results(results: &[ExecutionResult]) -> Self {
        let mut summary = Self::default();
        for result in results {
            summary.add_result(result);
        }
        summary
    }

    pub fn add_result(&mut self, result: &ExecutionResult) {
        match result.status() {
            Status::Success => self.success += 1,
            Status::PartialSuccess => self.partial_success += 1,
            Status::DryRun => self.dry_run += 1,
            Status::Failed => self.failed += 1,
            Status::Skipped => self.skipped += 1,
            Status::Timeout => self.timeout += 1,
            Status::Cancelled => self.cancelled += 1,
            Status::DependencyFailure => self.dependency_failure += 1,
            Status::Pending | Status::Running => {}
        }
    }

    pub fn total(&self) -> usize {
        self.success
            + self.partial_success
            + self.dry_run
            + self.failed
            + self.skipped
            + self.timeout
            + self.cancelled
            + self.dependency_failure
    }

    /// Number of results that did not succeed
    pub fn problems(&self) -> usize {
        self.failed + self.timeout + self.cancelled + self.dependency_failure
    }

    /// No task failed, timed out, was cancelled or lost a dependency
    pub fn is_success(&self) -> bool {
        self.problems() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pending(task: &str) -> PendingResult {
        PendingResult::dispatch(task, &CorrelationId::new(), 1)
    }

    #[test]
    fn test_status_classes() {
        assert!(!Status::Pending.is_terminal());
        assert!(!Status::Running.is_terminal());
        assert!(Status::DependencyFailure.is_terminal());
        assert!(Status::DryRun.is_successful());
        assert!(Status::PartialSuccess.is_successful());
        assert!(!Status::Skipped.is_successful());
        assert!(!Status::Success.carries_error());
        assert!(Status::PartialSuccess.carries_error());
    }

    #[test]
    fn test_success_drops_error() {
        let result = pending("a").finish(Status::Success, json!({"ok": 1}), Some("ignored".into()));
        assert_eq!(result.status(), Status::Success);
        assert_eq!(result.error(), None);
        assert!(result.error_tags().is_empty());
        assert!(result.duration_secs() >= 0.0);
        assert!(result.finished_at() >= result.started_at());
    }

    #[test]
    fn test_failure_always_has_message() {
        let result = pending("a").finish(Status::Cancelled, Value::Null, None);
        assert_eq!(result.error(), Some("task ended with status cancelled"));
    }

    #[test]
    fn test_failure_message_is_classified() {
        let result = pending("a").finish(
            Status::Failed,
            Value::Null,
            Some("Access is denied: winget not found".into()),
        );
        assert!(result.error_tags().contains(&ErrorTag::Privilege));
        assert!(result.error_tags().contains(&ErrorTag::NotFound));
        assert!(!result.error_tags().contains(&ErrorTag::Timeout));
    }

    #[test]
    fn test_timeout_always_tagged() {
        let result = pending("a").finish(Status::Timeout, Value::Null, Some("gave up".into()));
        assert!(result.error_tags().contains(&ErrorTag::Timeout));
    }

    #[test]
    fn test_dependency_failure_records_causes() {
        let result = pending("b").dependency_failure(vec!["a".into()]);
        assert_eq!(result.status(), Status::DependencyFailure);
        assert_eq!(result.failed_dependencies(), ["a".to_string()]);
        assert!(result.error().unwrap().contains("a"));
    }

    #[test]
    fn test_warnings_carried() {
        let mut p = pending("a");
        p.warn("ran without elevation");
        let result = p.finish(Status::PartialSuccess, Value::Null, None);
        assert_eq!(result.warnings(), ["ran without elevation".to_string()]);
    }

    #[test]
    fn test_result_serializes() {
        let result = pending("a").finish(Status::DryRun, json!([1, 2]), None);
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["status"], json!("dry_run"));
        assert_eq!(value["task"], json!("a"));
        let back: ExecutionResult = serde_json::from_value(value).unwrap();
        assert_eq!(back, result);
    }

    #[test]
    fn test_summary() {
        let results = vec![
            pending("a").finish(Status::Success, Value::Null, None),
            pending("b").finish(Status::Failed, Value::Null, Some("boom".into())),
            pending("c").dependency_failure(vec!["b".into()]),
        ];
        let summary = RunSummary::from_results(&results);
        assert_eq!(summary.total(), 3);
        assert_eq!(summary.problems(), 2);
        assert!(!summary.is_success());
    }

    #[test]
    fn test_correlation_id_short() {
        let id = CorrelationId::new();
        assert_eq!(id.short().len(), 8);
        assert!(id.to_string().starts_with(&id.short()));
    }
}
