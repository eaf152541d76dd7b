//! Built-in entry points that catalog tasks can name in `entry`

use crate::paths;
use crate::runner;
use anyhow::{Context, Result};
use serde_json::{Value, json};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use taskflow::{SharedEntry, TaskEntry, TaskInvocation, TaskOutcome};
use walkdir::WalkDir;

/// All built-in entry points by name
pub fn all() -> Vec<(&'static str, SharedEntry)> {
    vec![
        ("command", Arc::new(CommandEntry) as SharedEntry),
        ("scan-dir", Arc::new(ScanDirEntry) as SharedEntry),
        ("remove-paths", Arc::new(RemovePathsEntry) as SharedEntry),
        ("noop", Arc::new(NoopEntry) as SharedEntry),
    ]
}

// ============================================================================
// command
// ============================================================================

/// Runs an external program
///
/// The program sees the run through `UPKEEP_*` environment variables, with the
/// actionable list as JSON in `UPKEEP_ACTIONABLE`. JSON on stdout becomes the
/// task output; an object with a boolean `mutated` field reports whether the
/// program changed anything.
pub struct CommandEntry;

impl TaskEntry for CommandEntry {
    fn run(&self, inv: &TaskInvocation) -> Result<TaskOutcome> {
        let program = inv
            .param_str("program")
            .with_context(|| format!("task '{}' needs a 'program' parameter", inv.task))?;
        let args: Vec<String> = inv
            .parameters
            .get("args")
            .and_then(Value::as_array)
            .map(|args| {
                args.iter()
                    .map(|a| a.as_str().map_or_else(|| a.to_string(), String::from))
                    .collect()
            })
            .unwrap_or_default();

        let envs = [
            ("UPKEEP_TASK", inv.task.clone()),
            ("UPKEEP_DRY_RUN", flag(inv.dry_run)),
            ("UPKEEP_ELEVATED", flag(inv.elevated)),
            ("UPKEEP_CORRELATION_ID", inv.correlation_id.clone()),
            (
                "UPKEEP_ACTIONABLE",
                serde_json::to_string(inv.actionable_items())?,
            ),
        ];

        log::debug!("Running {program} {}", args.join(" "));
        let stdout = runner::run_capture_with_env(program, &args, &envs)?;

        let output = if stdout.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&stdout).unwrap_or(Value::String(stdout))
        };
        let mutated = output
            .get("mutated")
            .and_then(Value::as_bool)
            .unwrap_or(!inv.dry_run);

        Ok(TaskOutcome {
            output,
            mutated,
            warnings: Vec::new(),
        })
    }
}

fn flag(on: bool) -> String {
    (if on { "1" } else { "0" }).to_string()
}

// ============================================================================
// scan-dir
// ============================================================================

/// Detection: lists files under `path` older than `older_than_days`
///
/// Output is `{ "items": [{name, path, size}], "total_size": n }`, ready for a
/// `pattern_exclude` diff row with `list_field = "items"`.
pub struct ScanDirEntry;

impl TaskEntry for ScanDirEntry {
    fn run(&self, inv: &TaskInvocation) -> Result<TaskOutcome> {
        let root = inv
            .param_str("path")
            .map(paths::expand)
            .with_context(|| format!("task '{}' needs a 'path' parameter", inv.task))?;
        let days = inv.param_i64("older_than_days").unwrap_or(0).max(0);
        let max_depth = inv.param_i64("max_depth").unwrap_or(1).max(1) as usize;

        if !root.exists() {
            return Ok(TaskOutcome::unchanged(json!({ "items": [], "total_size": 0 }))
                .with_warning(format!("{} does not exist", root.display())));
        }

        let cutoff = SystemTime::now()
            .checked_sub(Duration::from_secs(days.unsigned_abs() * 86_400))
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let mut items = Vec::new();
        let mut total_size = 0u64;

        for entry in WalkDir::new(&root)
            .min_depth(1)
            .max_depth(max_depth)
            .into_iter()
            .filter_map(|e| match e {
                Ok(entry) => Some(entry),
                Err(err) => {
                    log::debug!("Skipping unreadable entry: {err}");
                    None
                }
            })
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            if days > 0 && modified > cutoff {
                continue;
            }

            total_size += metadata.len();
            items.push(json!({
                "name": entry.file_name().to_string_lossy(),
                "path": entry.path().to_string_lossy(),
                "size": metadata.len(),
            }));
        }

        log::info!(
            "Scanned {}: {} files older than {days} days",
            root.display(),
            items.len()
        );
        Ok(TaskOutcome::unchanged(
            json!({ "items": items, "total_size": total_size }),
        ))
    }
}

// ============================================================================
// remove-paths
// ============================================================================

/// Action: deletes the `path` of every actionable item
///
/// Items that fail to delete are reported as warnings; the task only fails
/// when every removal failed.
pub struct RemovePathsEntry;

impl TaskEntry for RemovePathsEntry {
    fn run(&self, inv: &TaskInvocation) -> Result<TaskOutcome> {
        let targets: Vec<&str> = inv
            .actionable_items()
            .iter()
            .filter_map(|item| match item {
                Value::String(path) => Some(path.as_str()),
                other => other.get("path").and_then(Value::as_str),
            })
            .collect();

        if inv.dry_run {
            return Ok(TaskOutcome::unchanged(json!({ "would_remove": targets })));
        }

        let mut removed = Vec::new();
        let mut warnings = Vec::new();
        for target in &targets {
            match remove(Path::new(target)) {
                Ok(()) => removed.push(*target),
                Err(e) => warnings.push(format!("{target}: {e:#}")),
            }
        }

        if !targets.is_empty() && removed.is_empty() {
            anyhow::bail!("could not remove any of {} paths: {}", targets.len(), warnings.join("; "));
        }

        Ok(TaskOutcome {
            output: json!({ "removed": removed, "failed": warnings.len() }),
            mutated: !removed.is_empty(),
            warnings,
        })
    }
}

fn remove(path: &Path) -> Result<()> {
    let metadata = fs::symlink_metadata(path)
        .with_context(|| format!("Failed to stat {}", path.display()))?;
    if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
    .with_context(|| format!("Failed to remove {}", path.display()))
}

// ============================================================================
// noop
// ============================================================================

/// Returns its parameters unchanged
pub struct NoopEntry;

impl TaskEntry for NoopEntry {
    fn run(&self, inv: &TaskInvocation) -> Result<TaskOutcome> {
        Ok(TaskOutcome::unchanged(Value::Object(inv.parameters.clone())))
    }
}
