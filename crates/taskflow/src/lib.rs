//! # Taskflow
//!
//! Orchestration core for running maintenance tasks against a single host.
//!
//! Tasks declare their dependencies; the crate turns them into a validated
//! graph, filters each task's work list against prior audit results, and runs
//! the tasks level by level while isolating failures.
//!
//! ## Core Concepts
//!
//! - **TaskDescriptor**: Immutable definition of a task and its entry point
//! - **DependencyGraph**: Cycle detection and topological leveling
//! - **DiffPlan / DiffSet**: Which detections each task should act on
//! - **Engine**: Runs tasks with timeouts, privilege checks and dependency
//!   failure propagation
//! - **ExecutionResult**: One immutable, correlated result per dispatched task
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use taskflow::{
//!     AssumeElevated, DiffSet, Engine, FnEntry, NoProgress, RunContext,
//!     TaskDescriptor, TaskOutcome,
//! };
//!
//! let mut engine = Engine::new();
//! engine.register_task(
//!     TaskDescriptor::builder("audit", Arc::new(FnEntry(|_inv: &_| {
//!         Ok(TaskOutcome::unchanged(serde_json::json!({"items": []})))
//!     })))
//!     .category("detection")
//!     .build()?,
//! )?;
//!
//! let ctx = RunContext::new(Arc::new(AssumeElevated)).dry_run(true);
//! let results = engine.execute(None, &DiffSet::new(), &ctx, &mut NoProgress)?;
//! ```
//!
//! ## Collaborator Traits
//!
//! - [`PrivilegeProbe`]: Reports whether the process is elevated
//! - [`DiffSink`]: Persists actionable lists
//! - [`ResultSink`]: Receives the ordered results of a run
//! - [`ProgressCallback`]: Receives progress updates
//!
//! These keep the core free of any particular UI, storage or platform.

pub mod config;
pub mod context;
pub mod diff;
pub mod error;
pub mod executor;
pub mod graph;
pub mod result;
pub mod task;

// Re-export main types at crate root
pub use config::{ConfigDocument, merge_defaults};
pub use context::{
    AssumeElevated, AssumeUnelevated, CancelToken, DiffSink, MemorySink, NoPersist, NoProgress,
    NoResults, PrivilegeProbe, ProgressCallback, ResultSink, RunContext,
};
pub use diff::{
    AuditResults, DiffPlan, DiffPlanEntry, DiffResult, DiffSet, Strategy, build_diff_set,
    compute_entry,
};
pub use error::{Error, Result};
pub use executor::Engine;
pub use graph::{DependencyGraph, ExecutionLevel, ReferenceViolation};
pub use result::{CorrelationId, ErrorTag, ExecutionResult, PendingResult, RunSummary, Status};
pub use task::{
    FnEntry, SharedEntry, TaskDescriptor, TaskEntry, TaskInvocation, TaskOutcome, TaskSpec,
};
