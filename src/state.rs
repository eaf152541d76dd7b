//! Persistent run state: audit results, diff lists and run reports

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use taskflow::{AuditResults, CorrelationId, DiffSink, ExecutionResult, ResultSink, RunSummary};

// ============================================================================
// Audit Store
// ============================================================================

/// Audit results carried between runs, keyed by audit key
#[derive(Debug, Default)]
pub struct AuditStore {
    path: PathBuf,
    results: AuditResults,
}

impl AuditStore {
    /// Load from disk, or start empty if the file doesn't exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("Audit file does not exist, starting empty");
            return Ok(Self {
                path: path.to_path_buf(),
                results: AuditResults::new(),
            });
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read audit file: {}", path.display()))?;
        let results: AuditResults = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse audit file: {}", path.display()))?;

        log::debug!("Loaded {} audit keys from {}", results.len(), path.display());
        Ok(Self {
            path: path.to_path_buf(),
            results,
        })
    }

    pub fn results(&self) -> &AuditResults {
        &self.results
    }

    /// Replace the payload stored under `key`
    pub fn record(&mut self, key: &str, payload: Value) {
        self.results.insert(key.to_string(), payload);
    }

    /// Save to disk
    pub fn save(&self) -> Result<()> {
        write_json(&self.path, &self.results)?;
        log::debug!("Saved audit results to {}", self.path.display());
        Ok(())
    }
}

// ============================================================================
// Diff Lists
// ============================================================================

/// Writes each actionable list to `<dir>/<task>.json`
#[derive(Debug, Clone)]
pub struct FileDiffSink {
    dir: PathBuf,
}

impl FileDiffSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl DiffSink for FileDiffSink {
    fn persist(&self, task: &str, items: &[Value]) -> Result<Option<String>> {
        let path = self.dir.join(format!("{}.json", file_stem(task)));
        write_json(&path, &items)?;
        Ok(Some(path.display().to_string()))
    }
}

// ============================================================================
// Run Reports
// ============================================================================

/// Everything recorded about one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub correlation_id: String,
    pub generated_at: DateTime<Utc>,
    pub dry_run: bool,
    pub summary: RunSummary,
    pub results: Vec<ExecutionResult>,
}

/// Publishes results as a timestamped report plus `latest.json`
#[derive(Debug)]
pub struct ReportSink {
    dir: PathBuf,
    correlation_id: CorrelationId,
    dry_run: bool,
    written: Option<PathBuf>,
}

impl ReportSink {
    pub fn new(dir: impl Into<PathBuf>, correlation_id: CorrelationId, dry_run: bool) -> Self {
        Self {
            dir: dir.into(),
            correlation_id,
            dry_run,
            written: None,
        }
    }

    /// Path of the report written by the last publish
    pub fn written(&self) -> Option<&Path> {
        self.written.as_deref()
    }
}

impl ResultSink for ReportSink {
    fn publish(&mut self, results: &[ExecutionResult]) -> Result<()> {
        let now = Utc::now();
        let report = RunReport {
            correlation_id: self.correlation_id.to_string(),
            generated_at: now,
            dry_run: self.dry_run,
            summary: RunSummary::from_results(results),
            results: results.to_vec(),
        };

        let name = format!(
            "{}-{}.json",
            now.format("%Y%m%dT%H%M%SZ"),
            self.correlation_id.short()
        );
        let path = self.dir.join(name);
        write_json(&path, &report)?;
        write_json(&self.dir.join("latest.json"), &report)?;

        log::info!("Wrote run report to {}", path.display());
        self.written = Some(path);
        Ok(())
    }
}

/// Load the most recent report, if any run has been recorded
pub fn load_latest_report(path: &Path) -> Result<Option<RunReport>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read report: {}", path.display()))?;
    let report = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse report: {}", path.display()))?;
    Ok(Some(report))
}

// ============================================================================
// Helpers
// ============================================================================

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    }
    let content = serde_json::to_string_pretty(value).context("Failed to serialize state")?;
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
}

/// Task names as safe file names
fn file_stem(task: &str) -> String {
    task.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
