//! Execution engine - runs tasks level by level with timeouts, privilege checks
//! and dependency failure propagation

use crate::context::{ProgressCallback, ResultSink, RunContext};
use crate::diff::DiffSet;
use crate::error::{Error, Result};
use crate::graph::{DependencyGraph, ExecutionLevel};
use crate::result::{ExecutionResult, PendingResult, Status};
use crate::task::{TaskDescriptor, TaskInvocation, TaskOutcome};
use anyhow::Context as _;
use rayon::prelude::*;
use serde_json::Value;
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;

/// Registry of tasks plus the logic to run them
#[derive(Debug, Default)]
pub struct Engine {
    descriptors: Vec<TaskDescriptor>,
    index: HashMap<String, usize>,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task; order is not computed until a run starts
    pub fn register_task(&mut self, descriptor: TaskDescriptor) -> Result<()> {
        if self.index.contains_key(descriptor.name()) {
            return Err(Error::configuration(format!(
                "task '{}' is registered twice",
                descriptor.name()
            )));
        }
        log::debug!("Registered task '{}'", descriptor.name());
        self.index
            .insert(descriptor.name().to_string(), self.descriptors.len());
        self.descriptors.push(descriptor);
        Ok(())
    }

    pub fn descriptors(&self) -> &[TaskDescriptor] {
        &self.descriptors
    }

    pub fn descriptor(&self, name: &str) -> Option<&TaskDescriptor> {
        self.index.get(name).map(|&i| &self.descriptors[i])
    }

    /// Fresh dependency graph over the registered tasks
    pub fn graph(&self) -> Result<DependencyGraph> {
        DependencyGraph::from_descriptors(&self.descriptors)
    }

    /// Validated execution levels
    pub fn levels(&self) -> Result<Vec<ExecutionLevel>> {
        let graph = self.graph()?;
        graph.validate_acyclic()?;
        graph.compute_levels()
    }

    /// Run the selected tasks (all when `selection` is `None`)
    ///
    /// Graph construction and cycle errors abort the run before anything is
    /// dispatched. Every other failure ends up in the affected task's result.
    /// The returned list holds one result per dispatched task, in dispatch
    /// order.
    ///
    /// Timeouts bound the engine's wait only: a timed-out entry point keeps
    /// running on its detached thread until it returns on its own.
    pub fn execute<P>(
        &self,
        selection: Option<&[String]>,
        diffs: &DiffSet,
        ctx: &RunContext,
        progress: &mut P,
    ) -> Result<Vec<ExecutionResult>>
    where
        P: ProgressCallback + ?Sized,
    {
        let levels = self.dispatch_levels(selection)?;
        let total: usize = levels.iter().map(Vec::len).sum();
        let elevated = ctx.privilege.is_elevated();

        log::info!(
            "Run {} starting: {total} tasks in {} levels (dry_run={}, jobs={}, elevated={elevated})",
            ctx.correlation_id,
            levels.len(),
            ctx.dry_run,
            ctx.jobs
        );
        progress.on_run_start(total);

        let pool = if ctx.jobs > 1 {
            Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(ctx.jobs)
                    .thread_name(|i| format!("taskflow-worker-{i}"))
                    .build()
                    .map_err(|e| {
                        Error::configuration(format!("failed to create thread pool: {e}"))
                    })?,
            )
        } else {
            None
        };

        let run = Dispatch {
            diffs,
            ctx,
            elevated,
        };
        let mut ledger = ResultLedger::default();
        let mut sequence = 0u64;

        for (index, level) in levels.iter().enumerate() {
            log::info!("Level {index}: {} tasks", level.len());
            progress.on_level_start(index, level.len());

            match &pool {
                Some(pool) if level.len() > 1 => {
                    let mut prepared = Vec::with_capacity(level.len());
                    for descriptor in level {
                        sequence += 1;
                        let task = run.prepare(descriptor, &ledger, sequence);
                        if matches!(task, Prepared::Ready { .. }) {
                            progress.on_task_start(descriptor.name());
                        }
                        prepared.push(task);
                    }

                    // The level drains completely before results are recorded
                    let results: Vec<ExecutionResult> = pool.install(|| {
                        prepared
                            .into_par_iter()
                            .map(|p| run.complete(p))
                            .collect()
                    });

                    for result in results {
                        progress.on_task_complete(&result);
                        ledger.record(result)?;
                    }
                }
                _ => {
                    for descriptor in level {
                        sequence += 1;
                        let prepared = run.prepare(descriptor, &ledger, sequence);
                        if matches!(prepared, Prepared::Ready { .. }) {
                            progress.on_task_start(descriptor.name());
                        }
                        let result = run.complete(prepared);
                        progress.on_task_complete(&result);
                        ledger.record(result)?;
                    }
                }
            }
        }

        progress.on_run_complete();
        let results = ledger.into_results();
        log::info!(
            "Run {} finished: {} results",
            ctx.correlation_id,
            results.len()
        );
        Ok(results)
    }

    /// [`execute`](Self::execute), then hand the ordered results to `sink`
    pub fn execute_and_publish<P>(
        &self,
        selection: Option<&[String]>,
        diffs: &DiffSet,
        ctx: &RunContext,
        progress: &mut P,
        sink: &mut dyn ResultSink,
    ) -> anyhow::Result<Vec<ExecutionResult>>
    where
        P: ProgressCallback + ?Sized,
    {
        let results = self.execute(selection, diffs, ctx, progress)?;
        sink.publish(&results)
            .context("Failed to publish run results")?;
        Ok(results)
    }

    /// Validated levels restricted to declared, selected tasks
    fn dispatch_levels(&self, selection: Option<&[String]>) -> Result<Vec<Vec<&TaskDescriptor>>> {
        let levels = self.levels()?;

        let selected: Option<HashSet<&str>> = selection.map(|names| {
            for name in names {
                if !self.index.contains_key(name) {
                    log::warn!("Ignoring unknown task '{name}' in selection");
                }
            }
            names.iter().map(String::as_str).collect()
        });

        Ok(levels
            .iter()
            .map(|level| {
                level
                    .iter()
                    .filter(|name| selected.as_ref().is_none_or(|s| s.contains(name.as_str())))
                    // Auto-generated nodes have no descriptor and are never dispatched
                    .filter_map(|name| self.descriptor(name))
                    .collect::<Vec<_>>()
            })
            .filter(|level| !level.is_empty())
            .collect())
    }
}

/// A task either finished before dispatch or is ready to invoke
enum Prepared<'a> {
    Done(ExecutionResult),
    Ready {
        descriptor: &'a TaskDescriptor,
        pending: PendingResult,
        invocation: TaskInvocation,
        unprivileged: bool,
    },
}

/// Read-only state shared by every task of a run
struct Dispatch<'a> {
    diffs: &'a DiffSet,
    ctx: &'a RunContext,
    elevated: bool,
}

impl Dispatch<'_> {
    /// Checks that happen on the driving thread before invocation
    fn prepare<'d>(
        &self,
        descriptor: &'d TaskDescriptor,
        ledger: &ResultLedger,
        sequence: u64,
    ) -> Prepared<'d> {
        let name = descriptor.name();
        let mut pending = PendingResult::dispatch(name, &self.ctx.correlation_id, sequence);

        if self.ctx.cancel.is_cancelled() {
            log::info!("Task '{name}' cancelled before dispatch");
            return Prepared::Done(pending.finish(
                Status::Cancelled,
                Value::Null,
                Some("run was cancelled".to_string()),
            ));
        }

        if self.ctx.skip.contains(name) {
            log::info!("Task '{name}' skipped by configuration");
            return Prepared::Done(pending.finish(
                Status::Skipped,
                Value::Null,
                Some("disabled by configuration".to_string()),
            ));
        }

        let failed: Vec<String> = descriptor
            .depends_on()
            .iter()
            .filter(|dep| !ledger.get(dep).is_some_and(ExecutionResult::is_successful))
            .cloned()
            .collect();
        if !failed.is_empty() {
            log::warn!(
                "Task '{name}' not run: dependencies did not succeed: {}",
                failed.join(", ")
            );
            return Prepared::Done(pending.dependency_failure(failed));
        }

        let mut unprivileged = false;
        if descriptor.requires_elevation() && !self.elevated {
            let err = Error::Privilege {
                task: name.to_string(),
            };
            if !self.ctx.best_effort {
                log::warn!("{err}");
                return Prepared::Done(pending.finish(
                    Status::Failed,
                    Value::Null,
                    Some(err.to_string()),
                ));
            }
            log::warn!("{err}; running best-effort without elevation");
            pending.warn("ran without elevated privileges; changes may be incomplete");
            unprivileged = true;
        }

        let actionable = self
            .diffs
            .lookup(name, descriptor.category())
            .map(|diff| diff.actionable.clone());

        let invocation = TaskInvocation {
            task: name.to_string(),
            parameters: descriptor.parameters().clone(),
            actionable,
            dry_run: self.ctx.dry_run,
            correlation_id: self.ctx.correlation_id.to_string(),
            elevated: self.elevated,
        };

        Prepared::Ready {
            descriptor,
            pending,
            invocation,
            unprivileged,
        }
    }

    /// Invoke a ready task and classify how it ended
    fn complete(&self, prepared: Prepared<'_>) -> ExecutionResult {
        let (descriptor, mut pending, invocation, unprivileged) = match prepared {
            Prepared::Done(result) => return result,
            Prepared::Ready {
                descriptor,
                pending,
                invocation,
                unprivileged,
            } => (descriptor, pending, invocation, unprivileged),
        };
        let name = descriptor.name();

        // Last chance to honour a cancellation raised while the level was queued
        if self.ctx.cancel.is_cancelled() {
            log::info!("Task '{name}' cancelled before dispatch");
            return pending.finish(
                Status::Cancelled,
                Value::Null,
                Some("run was cancelled".to_string()),
            );
        }

        log::info!("Dispatching '{name}'");
        pending.start();
        let result = match invoke(descriptor, invocation) {
            Completion::Returned(Ok(outcome)) => {
                let TaskOutcome {
                    output,
                    mutated,
                    warnings,
                } = outcome;
                for warning in warnings {
                    pending.warn(warning);
                }

                if self.ctx.dry_run && !mutated {
                    pending.finish(Status::DryRun, output, None)
                } else {
                    if self.ctx.dry_run {
                        log::warn!("Task '{name}' reported changes during a dry run");
                    }
                    if unprivileged {
                        let err = Error::Privilege {
                            task: name.to_string(),
                        };
                        pending.finish(
                            Status::PartialSuccess,
                            output,
                            Some(format!("{err}; completed best-effort")),
                        )
                    } else {
                        pending.finish(Status::Success, output, None)
                    }
                }
            }
            Completion::Returned(Err(e)) => {
                let err = Error::TaskRuntime {
                    task: name.to_string(),
                    message: format!("{e:#}"),
                };
                log::warn!("{err}");
                pending.finish(Status::Failed, Value::Null, Some(err.to_string()))
            }
            Completion::TimedOut => {
                let err = Error::Timeout {
                    task: name.to_string(),
                    seconds: descriptor.timeout().as_secs(),
                };
                log::warn!("{err}; leaving it running detached");
                pending.finish(Status::Timeout, Value::Null, Some(err.to_string()))
            }
            Completion::Panicked(message) => {
                let err = Error::TaskRuntime {
                    task: name.to_string(),
                    message: format!("panicked: {message}"),
                };
                log::error!("{err}");
                pending.finish(Status::Failed, Value::Null, Some(err.to_string()))
            }
        };

        log::info!(
            "Task '{name}' finished: {} in {:.2}s",
            result.status(),
            result.duration_secs()
        );
        result
    }
}

/// How an entry point invocation ended
enum Completion {
    Returned(anyhow::Result<TaskOutcome>),
    TimedOut,
    Panicked(String),
}

/// Run the entry point on its own thread and wait at most its timeout
fn invoke(descriptor: &TaskDescriptor, invocation: TaskInvocation) -> Completion {
    let entry = descriptor.entry();
    let (tx, rx) = mpsc::channel();

    let spawned = thread::Builder::new()
        .name(format!("task-{}", descriptor.name()))
        .spawn(move || {
            let outcome = entry.run(&invocation);
            // The receiver is gone when the wait already timed out
            let _ = tx.send(outcome);
        });

    let handle = match spawned {
        Ok(handle) => handle,
        Err(e) => {
            return Completion::Returned(Err(
                anyhow::Error::new(e).context("failed to spawn task thread")
            ));
        }
    };

    match rx.recv_timeout(descriptor.timeout()) {
        Ok(outcome) => Completion::Returned(outcome),
        Err(RecvTimeoutError::Timeout) => Completion::TimedOut,
        Err(RecvTimeoutError::Disconnected) => match handle.join() {
            Err(payload) => Completion::Panicked(panic_message(payload.as_ref())),
            Ok(()) => Completion::Panicked("task thread exited without a result".to_string()),
        },
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Write-once record of a run's results, in dispatch order
#[derive(Debug, Default)]
struct ResultLedger {
    by_task: HashMap<String, usize>,
    ordered: Vec<ExecutionResult>,
}

impl ResultLedger {
    fn record(&mut self, result: ExecutionResult) -> Result<()> {
        if self.by_task.contains_key(result.task()) {
            return Err(Error::DuplicateResult {
                task: result.task().to_string(),
            });
        }
        self.by_task
            .insert(result.task().to_string(), self.ordered.len());
        self.ordered.push(result);
        Ok(())
    }

    fn get(&self, task: &str) -> Option<&ExecutionResult> {
        self.by_task.get(task).map(|&i| &self.ordered[i])
    }

    fn into_results(self) -> Vec<ExecutionResult> {
        self.ordered
    }
}
