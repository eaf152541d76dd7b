//! Run context and collaborator traits
//!
//! These traits allow the core to be used without depending on a specific
//! privilege check, progress display, persistence layer or report format.

use crate::result::{CorrelationId, ExecutionResult};
use anyhow::Result;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Tells whether the current process holds elevated privileges
pub trait PrivilegeProbe: Send + Sync {
    fn is_elevated(&self) -> bool;
}

/// Probe that always reports elevation
pub struct AssumeElevated;

impl PrivilegeProbe for AssumeElevated {
    fn is_elevated(&self) -> bool {
        true
    }
}

/// Probe that never reports elevation
pub struct AssumeUnelevated;

impl PrivilegeProbe for AssumeUnelevated {
    fn is_elevated(&self) -> bool {
        false
    }
}

/// Progress callback for execution
///
/// Called from the thread driving the run only, never from worker threads.
pub trait ProgressCallback: Send {
    /// Called once with the number of tasks that will be dispatched
    fn on_run_start(&mut self, total: usize);

    /// Called when a level begins
    fn on_level_start(&mut self, index: usize, size: usize);

    /// Called before a task is invoked; under parallel dispatch, when the
    /// task is handed to the worker pool
    fn on_task_start(&mut self, task: &str);

    /// Called when a task reaches a terminal state
    fn on_task_complete(&mut self, result: &ExecutionResult);

    /// Called after the last level drained
    fn on_run_complete(&mut self);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_run_start(&mut self, _total: usize) {}
    fn on_level_start(&mut self, _index: usize, _size: usize) {}
    fn on_task_start(&mut self, _task: &str) {}
    fn on_task_complete(&mut self, _result: &ExecutionResult) {}
    fn on_run_complete(&mut self) {}
}

/// Persistence for actionable lists
pub trait DiffSink: Send + Sync {
    /// Store `items` for `task`, returning where they were written (if anywhere)
    fn persist(&self, task: &str, items: &[Value]) -> Result<Option<String>>;
}

/// Sink that stores nothing
pub struct NoPersist;

impl DiffSink for NoPersist {
    fn persist(&self, _task: &str, _items: &[Value]) -> Result<Option<String>> {
        Ok(None)
    }
}

/// In-memory sink, handy for embedding and tests
#[derive(Default)]
pub struct MemorySink {
    lists: Mutex<BTreeMap<String, Vec<Value>>>,
}

impl MemorySink {
    /// Items stored for a task
    pub fn stored(&self, task: &str) -> Option<Vec<Value>> {
        match self.lists.lock() {
            Ok(lists) => lists.get(task).cloned(),
            Err(poisoned) => poisoned.into_inner().get(task).cloned(),
        }
    }
}

impl DiffSink for MemorySink {
    fn persist(&self, task: &str, items: &[Value]) -> Result<Option<String>> {
        match self.lists.lock() {
            Ok(mut lists) => lists.insert(task.to_string(), items.to_vec()),
            Err(poisoned) => poisoned
                .into_inner()
                .insert(task.to_string(), items.to_vec()),
        };
        Ok(Some(format!("memory://{task}")))
    }
}

/// Consumer of the ordered result list once a run completes
pub trait ResultSink {
    fn publish(&mut self, results: &[ExecutionResult]) -> Result<()>;
}

/// Sink that drops results
pub struct NoResults;

impl ResultSink for NoResults {
    fn publish(&mut self, _results: &[ExecutionResult]) -> Result<()> {
        Ok(())
    }
}

/// Run-level cancellation flag
///
/// Cancelling stops dispatch of tasks that have not started; in-flight tasks
/// finish or hit their own timeout.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// The shared flag, for wiring into signal handlers
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }
}

/// Everything a run needs besides the tasks themselves
pub struct RunContext {
    /// Shared by every result of the run
    pub correlation_id: CorrelationId,
    /// Ask tasks to suppress side effects
    pub dry_run: bool,
    /// Run privileged tasks without elevation, recording a warning
    pub best_effort: bool,
    /// Worker threads per level; 1 dispatches sequentially
    pub jobs: usize,
    /// Tasks switched off by configuration
    pub skip: HashSet<String>,
    pub cancel: CancelToken,
    pub privilege: Arc<dyn PrivilegeProbe>,
}

impl RunContext {
    /// Sequential, non-dry-run context with a fresh correlation id
    pub fn new(privilege: Arc<dyn PrivilegeProbe>) -> Self {
        Self {
            correlation_id: CorrelationId::new(),
            dry_run: false,
            best_effort: false,
            jobs: 1,
            skip: HashSet::new(),
            cancel: CancelToken::new(),
            privilege,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn best_effort(mut self, best_effort: bool) -> Self {
        self.best_effort = best_effort;
        self
    }

    pub fn jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn skip<I, S>(mut self, tasks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skip.extend(tasks.into_iter().map(Into::into));
        self
    }

    pub fn cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
        assert!(token.flag().load(Ordering::SeqCst));
    }

    #[test]
    fn test_memory_sink_round_trip() {
        let sink = MemorySink::default();
        let location = sink.persist("t", &[json!("a")]).unwrap();
        assert_eq!(location.as_deref(), Some("memory://t"));
        assert_eq!(sink.stored("t"), Some(vec![json!("a")]));
        assert_eq!(sink.stored("other"), None);
    }

    #[test]
    fn test_run_context_jobs_never_zero() {
        let ctx = RunContext::new(Arc::new(AssumeElevated)).jobs(0);
        assert_eq!(ctx.jobs, 1);
    }
}
