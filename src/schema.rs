use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use taskflow::{ConfigDocument, DiffPlan, DiffPlanEntry, TaskSpec};

/// Built-in configuration; the user file is deep-merged on top of it
pub const DEFAULT_CONFIG: &str = r#"
[execution]
jobs = 1
dry_run = false
force = false
default_timeout_secs = 300

[skip]
bloatware = false
essential_apps = false
privacy = false
optimization = false
cleanup = false
updates = false

[diff.temp_files]
safe = ["*.tmp", "*.temp", "*.log", "*.old", "*.bak"]
never_touch = []
exclude = []
default_pass = false

[diff.privacy]
enabled = true

[diff.updates]
enabled = true

[[tasks]]
name = "temp-scan"
category = "detection"
entry = "scan-dir"
audit_key = "temp-files"
depends_on = []
timeout_secs = 120

[tasks.parameters]
path = "~/.cache"
older_than_days = 30
max_depth = 2

[[tasks]]
name = "temp-cleanup"
category = "cleanup"
entry = "remove-paths"
depends_on = ["temp-scan"]
timeout_secs = 300
"#;

// ============================================================================
// Config Schema
// ============================================================================

/// Typed view of the merged configuration
#[derive(Debug, Serialize, Deserialize, Default)]
pub struct UpkeepConfig {
    /// Run defaults; CLI flags take precedence
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Task catalog
    #[serde(default)]
    pub tasks: Vec<TaskSpec>,

    /// Diff plan override and strategy sections
    #[serde(default)]
    pub diff: DiffConfig,

    /// Switches that disable tasks and diff plan rows
    #[serde(default)]
    pub skip: BTreeMap<String, bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Parallel jobs per level
    #[serde(default = "default_jobs")]
    pub jobs: usize,

    #[serde(default)]
    pub dry_run: bool,

    /// Run tasks needing elevation without it (best-effort)
    #[serde(default)]
    pub force: bool,

    /// Timeout for tasks that don't declare one
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: i64,
}

fn default_jobs() -> usize {
    1
}

fn default_timeout_secs() -> i64 {
    300
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            jobs: default_jobs(),
            dry_run: false,
            force: false,
            default_timeout_secs: default_timeout_secs(),
        }
    }
}

/// `[diff]` table; strategy sections are read from the raw document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiffConfig {
    /// Replaces the standard plan rows when present
    #[serde(default)]
    pub plan: Option<Vec<DiffPlanEntry>>,
}

impl UpkeepConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.execution.jobs == 0 {
            bail!("execution.jobs must be at least 1");
        }
        if self.execution.default_timeout_secs <= 0 {
            bail!(
                "execution.default_timeout_secs must be greater than 0 (got {})",
                self.execution.default_timeout_secs
            );
        }
        Ok(())
    }

    /// Whether `[skip]` switches off `key`
    pub fn is_skipped(&self, key: &str) -> bool {
        self.skip.get(key).copied().unwrap_or(false)
    }
}

// ============================================================================
// Loading
// ============================================================================

/// Merged configuration in both raw and typed form
#[derive(Debug)]
pub struct LoadedConfig {
    /// File the overrides were read from (may not exist)
    pub path: PathBuf,
    pub document: ConfigDocument,
    pub config: UpkeepConfig,
}

impl LoadedConfig {
    /// Load `path` on top of the built-in defaults; a missing file means defaults
    pub fn load(path: &Path) -> Result<Self> {
        let overrides = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Could not read config file: {}", path.display()))?;
            log::debug!("Loaded config from {}", path.display());
            parse_toml(&content)
                .with_context(|| format!("Invalid TOML format in {}", path.display()))?
        } else {
            log::debug!("Config file {} does not exist, using defaults", path.display());
            Value::Null
        };

        Self::from_overrides(path, overrides)
    }

    /// Merge an already parsed override document onto the defaults
    pub fn from_overrides(path: &Path, overrides: Value) -> Result<Self> {
        let defaults = parse_toml(DEFAULT_CONFIG).context("Invalid built-in default config")?;
        let document = ConfigDocument::with_defaults(defaults, overrides);
        let config: UpkeepConfig = serde_json::from_value(document.root().clone())
            .context("Invalid upkeep config")?;
        config.validate()?;

        Ok(Self {
            path: path.to_path_buf(),
            document,
            config,
        })
    }

    /// Diff plan from `[[diff.plan]]` or the standard rows, with skips resolved
    pub fn diff_plan(&self) -> DiffPlan {
        let rows = self
            .config
            .diff
            .plan
            .clone()
            .unwrap_or_else(DiffPlan::standard_rows);
        DiffPlan::build(rows, &self.document)
    }
}

fn parse_toml(content: &str) -> Result<Value> {
    let table: toml::Table = toml::from_str(content)?;
    Ok(serde_json::to_value(table)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_parse() {
        let loaded = LoadedConfig::from_overrides(Path::new("none"), Value::Null).unwrap();
        assert_eq!(loaded.config.execution.jobs, 1);
        assert_eq!(loaded.config.execution.default_timeout_secs, 300);
        assert_eq!(loaded.config.tasks.len(), 2);
        assert_eq!(loaded.config.tasks[1].depends_on, Some(vec!["temp-scan".to_string()]));
        assert!(!loaded.config.is_skipped("bloatware"));
        assert!(loaded.config.diff.plan.is_none());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = LoadedConfig::load(&dir.path().join("config.toml")).unwrap();
        assert_eq!(loaded.config.tasks.len(), 2);
    }

    #[test]
    fn test_user_file_merges_onto_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[execution]
jobs = 4

[skip]
cleanup = true

[diff.startup]
never_touch = ["security*"]

[[tasks]]
name = "hello"
entry = "noop"
depends_on = []
"#
        )
        .unwrap();

        let loaded = LoadedConfig::load(file.path()).unwrap();
        let config = &loaded.config;
        assert_eq!(config.execution.jobs, 4);
        // Untouched defaults survive the merge
        assert_eq!(config.execution.default_timeout_secs, 300);
        assert!(config.is_skipped("cleanup"));
        assert!(!config.is_skipped("updates"));
        // Arrays replace wholesale
        assert_eq!(config.tasks.len(), 1);
        assert_eq!(config.tasks[0].name, "hello");
        assert_eq!(
            loaded.document.section("diff.startup.never_touch"),
            &serde_json::json!(["security*"])
        );
        assert_eq!(
            loaded.document.section("diff.temp_files.default_pass"),
            &serde_json::json!(false)
        );
    }

    #[test]
    fn test_skip_flag_disables_plan_row() {
        let overrides = serde_json::json!({"skip": {"cleanup": true}});
        let loaded = LoadedConfig::from_overrides(Path::new("none"), overrides).unwrap();
        let plan = loaded.diff_plan();
        assert!(plan.disabled_tasks().any(|t| t == "temp-cleanup"));
    }

    #[test]
    fn test_custom_plan_rows() {
        let overrides = serde_json::json!({
            "diff": {"plan": [{
                "task": "temp-cleanup",
                "audit_key": "temp-files",
                "list_field": "items",
                "strategy": "pattern_exclude",
                "config_section": "diff.temp_files"
            }]}
        });
        let loaded = LoadedConfig::from_overrides(Path::new("none"), overrides).unwrap();
        assert_eq!(loaded.diff_plan().entries().len(), 1);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let overrides = serde_json::json!({"execution": {"default_timeout_secs": 0}});
        assert!(LoadedConfig::from_overrides(Path::new("none"), overrides).is_err());

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[execution\njobs = ").unwrap();
        assert!(LoadedConfig::load(file.path()).is_err());
    }
}
