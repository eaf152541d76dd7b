use anyhow::{Context as _, Result, bail};
use colored::Colorize;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use super::Session;
use crate::Context;
use crate::cli::RunArgs;
use crate::privilege::ProcessPrivilege;
use crate::progress::RunProgress;
use crate::state::{AuditStore, FileDiffSink, ReportSink};
use crate::ui;
use taskflow::{
    CancelToken, DiffPlan, DiffSet, Engine, ExecutionResult, RunContext, RunSummary,
    build_diff_set,
};

pub fn run(ctx: &Context, args: RunArgs) -> Result<()> {
    let session = Session::open(ctx)?;
    let execution = &session.loaded.config.execution;
    let dry_run = args.dry_run || execution.dry_run;
    let force = args.force || execution.force;
    let jobs = args.jobs.unwrap_or(execution.jobs).max(1);

    let selection = resolve_selection(&session.engine, &args.tasks, args.with_deps)?;

    // 1. Diff prior audit results against policy
    let mut audit = AuditStore::load(&session.layout.audit_file())?;
    let plan = session.loaded.diff_plan();
    let diffs = build_diff_set(
        &plan,
        audit.results(),
        &session.loaded.document,
        &FileDiffSink::new(session.layout.diff_dir()),
    );
    let skip = skipped_tasks(&session, &plan);

    // 2. Show what will happen
    if !ctx.quiet {
        print_overview(&session.engine, selection.as_deref(), &diffs, &skip, dry_run);
    }

    // 3. Confirm (unless --yes or dry run)
    if !args.yes && !dry_run && !confirm_proceed()? {
        println!();
        println!("  {} Aborted", "✗".red());
        return Ok(());
    }

    // 4. Execute
    let cancel = CancelToken::new();
    install_signal_handlers(&cancel)?;

    let run_ctx = RunContext::new(Arc::new(ProcessPrivilege::new()))
        .dry_run(dry_run)
        .best_effort(force)
        .jobs(jobs)
        .skip(skip)
        .cancel_token(cancel);

    let mut progress = RunProgress::new(ctx.quiet);
    let mut sink = ReportSink::new(
        session.layout.reports_dir(),
        run_ctx.correlation_id.clone(),
        dry_run,
    );
    let results = session.engine.execute_and_publish(
        selection.as_deref(),
        &diffs,
        &run_ctx,
        &mut progress,
        &mut sink,
    )?;

    // 5. Feed detections back for the next run
    if merge_audit_outputs(&session.engine, &results, &mut audit) > 0 {
        audit.save()?;
    }

    let summary = RunSummary::from_results(&results);
    if !ctx.quiet {
        ui::print_summary(&summary, dry_run);
        if let Some(path) = sink.written() {
            ui::dim(&format!("Report: {}", path.display()));
        }
    }

    if !summary.is_success() {
        bail!("{} of {} tasks did not succeed", summary.problems(), summary.total());
    }
    Ok(())
}

/// Explicit selection, optionally widened with transitive dependencies
fn resolve_selection(engine: &Engine, tasks: &[String], with_deps: bool) -> Result<Option<Vec<String>>> {
    if tasks.is_empty() {
        return Ok(None);
    }

    let unknown: Vec<&str> = tasks
        .iter()
        .filter(|t| engine.descriptor(t).is_none())
        .map(String::as_str)
        .collect();
    if unknown.len() == tasks.len() {
        bail!("No known tasks selected: {}", unknown.join(", "));
    }
    for name in &unknown {
        ui::warn(&format!("Unknown task '{name}' ignored"));
    }

    let mut selected: BTreeSet<String> = tasks.iter().cloned().collect();
    if with_deps {
        let graph = engine.graph()?;
        for task in tasks {
            selected.extend(graph.transitive_dependencies(task));
        }
    }
    Ok(Some(selected.into_iter().collect()))
}

/// Tasks switched off by `[skip]`, by name or through their diff plan row
fn skipped_tasks(session: &Session, plan: &DiffPlan) -> HashSet<String> {
    let disabled: HashSet<&str> = plan.disabled_tasks().collect();
    session
        .engine
        .descriptors()
        .iter()
        .filter(|d| {
            session.loaded.config.is_skipped(d.name())
                || disabled.contains(d.name())
                || disabled.contains(d.category())
        })
        .map(|d| d.name().to_string())
        .collect()
}

/// Store the output of every successful task that declares an audit key
fn merge_audit_outputs(engine: &Engine, results: &[ExecutionResult], audit: &mut AuditStore) -> usize {
    let mut merged = 0;
    for result in results.iter().filter(|r| r.is_successful()) {
        let Some(key) = engine
            .descriptor(result.task())
            .and_then(|d| d.audit_key())
        else {
            continue;
        };
        if result.output().is_null() {
            continue;
        }
        log::debug!("Recording audit output of '{}' under '{key}'", result.task());
        audit.record(key, result.output().clone());
        merged += 1;
    }
    merged
}

fn print_overview(
    engine: &Engine,
    selection: Option<&[String]>,
    diffs: &DiffSet,
    skip: &HashSet<String>,
    dry_run: bool,
) {
    ui::header("Maintenance run");
    let count = selection.map_or(engine.descriptors().len(), <[String]>::len);
    ui::kv("tasks", &count.to_string());
    ui::kv("mode", if dry_run { "dry run" } else { "live" });
    if !skip.is_empty() {
        let mut skipped: Vec<&str> = skip.iter().map(String::as_str).collect();
        skipped.sort_unstable();
        ui::kv("skipped", &skipped.join(", "));
    }

    if !diffs.is_empty() {
        ui::section("Work lists");
        for diff in diffs.iter() {
            ui::dim(&format!("{}: {}", diff.task, diff.reason));
        }
    }
    println!();
}

/// Confirm with user
fn confirm_proceed() -> Result<bool> {
    use dialoguer::Confirm;

    let confirmed = Confirm::new()
        .with_prompt("Continue?")
        .default(true)
        .interact()?;

    Ok(confirmed)
}

/// First SIGINT/SIGTERM stops dispatch; a second one exits immediately
fn install_signal_handlers(cancel: &CancelToken) -> Result<()> {
    #[cfg(unix)]
    {
        use signal_hook::{consts::SIGINT, consts::SIGTERM, iterator::Signals};
        use std::thread;

        let mut signals =
            Signals::new([SIGINT, SIGTERM]).context("Failed to register signal handlers")?;
        let token = cancel.clone();

        thread::spawn(move || {
            for sig in signals.forever() {
                if token.is_cancelled() {
                    std::process::exit(128 + sig);
                }
                log::warn!("Received signal {sig}, cancelling remaining tasks");
                eprintln!(
                    "\n  {} Cancelling - running tasks will finish, press Ctrl-C again to abort",
                    "⚠".yellow()
                );
                token.cancel();
            }
        });
    }

    #[cfg(not(unix))]
    {
        signal_hook::flag::register(signal_hook::consts::SIGINT, cancel.flag())
            .context("Failed to register signal handlers")?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use taskflow::{
        FnEntry, PendingResult, SharedEntry, Status, TaskDescriptor, TaskInvocation, TaskOutcome,
    };

    fn engine() -> Engine {
        let entry: SharedEntry = Arc::new(FnEntry(|_: &TaskInvocation| {
            Ok(TaskOutcome::unchanged(json!({"items": []})))
        }));
        let mut engine = Engine::new();
        engine
            .register_task(
                TaskDescriptor::builder("scan", entry.clone())
                    .audit_key("temp-files")
                    .build()
                    .unwrap(),
            )
            .unwrap();
        engine
            .register_task(
                TaskDescriptor::builder("clean", entry)
                    .depends_on(["scan"])
                    .build()
                    .unwrap(),
            )
            .unwrap();
        engine
    }

    #[test]
    fn test_selection_with_deps() {
        let engine = engine();
        assert_eq!(resolve_selection(&engine, &[], false).unwrap(), None);
        assert_eq!(
            resolve_selection(&engine, &["clean".into()], false).unwrap(),
            Some(vec!["clean".to_string()])
        );
        assert_eq!(
            resolve_selection(&engine, &["clean".into()], true).unwrap(),
            Some(vec!["clean".to_string(), "scan".to_string()])
        );
        assert!(resolve_selection(&engine, &["nope".into()], false).is_err());
    }

    #[test]
    fn test_merge_audit_outputs_only_successful() {
        let engine = engine();
        let id = taskflow::CorrelationId::new();
        let results = vec![
            PendingResult::dispatch("scan", &id, 1).finish(Status::DryRun, json!({"items": [1]}), None),
            PendingResult::dispatch("clean", &id, 2).finish(Status::Success, json!("x"), None),
        ];
        let dir = tempfile::tempdir().unwrap();
        let mut audit = AuditStore::load(&dir.path().join("audit.json")).unwrap();

        assert_eq!(merge_audit_outputs(&engine, &results, &mut audit), 1);
        assert_eq!(audit.results()["temp-files"], json!({"items": [1]}));

        let failed = vec![PendingResult::dispatch("scan", &id, 1).finish(
            Status::Failed,
            json!({"items": [2]}),
            Some("boom".into()),
        )];
        assert_eq!(merge_audit_outputs(&engine, &failed, &mut audit), 0);
        assert_eq!(audit.results()["temp-files"], json!({"items": [1]}));
    }
}
