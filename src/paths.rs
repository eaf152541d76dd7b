//! Path resolution for upkeep
//!
//! # Environment Variables
//!
//! - `UPKEEP_CONFIG_DIR` - Override config directory
//! - `UPKEEP_STATE_DIR` - Override state directory (audit results, diff lists, reports)
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `UPKEEP_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/upkeep` (if set)
//! 3. Platform default:
//!    - Windows: `%APPDATA%\upkeep`
//!    - macOS/Linux: `~/.config/upkeep`
//!
//! For state_dir():
//! 1. `UPKEEP_STATE_DIR` environment variable
//! 2. `XDG_STATE_HOME/upkeep` (if set)
//! 3. Platform default:
//!    - Windows: `%LOCALAPPDATA%\upkeep`
//!    - macOS/Linux: `~/.local/state/upkeep`

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "UPKEEP_CONFIG_DIR";

/// Environment variable for state directory override
pub const ENV_STATE_DIR: &str = "UPKEEP_STATE_DIR";

const APP: &str = "upkeep";

/// Get the upkeep config directory path
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!(
            "Using config dir from {}: {}",
            ENV_CONFIG_DIR,
            path.display()
        );
        return Ok(path);
    }

    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join(APP);
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    #[cfg(windows)]
    {
        if let Some(app_data) = dirs::config_dir() {
            let path = app_data.join(APP);
            log::debug!("Using Windows config dir: {}", path.display());
            return Ok(path);
        }
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".config").join(APP);
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Get the upkeep state directory path
pub fn state_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_STATE_DIR) {
        let path = expand(&dir);
        log::debug!("Using state dir from {}: {}", ENV_STATE_DIR, path.display());
        return Ok(path);
    }

    if let Ok(xdg_state) = std::env::var("XDG_STATE_HOME") {
        let path = PathBuf::from(xdg_state).join(APP);
        log::debug!("Using XDG_STATE_HOME: {}", path.display());
        return Ok(path);
    }

    #[cfg(windows)]
    {
        if let Some(local_app_data) = dirs::data_local_dir() {
            let path = local_app_data.join(APP);
            log::debug!("Using Windows state dir: {}", path.display());
            return Ok(path);
        }
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".local").join("state").join(APP);
    log::debug!("Using default state dir: {}", path.display());
    Ok(path)
}

/// Config file path: explicit override or `config.toml` in the config dir
pub fn config_file(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(expand(&path.to_string_lossy())),
        None => Ok(config_dir()?.join("config.toml")),
    }
}

/// Layout of the state directory
#[derive(Debug, Clone)]
pub struct StateLayout {
    root: PathBuf,
}

impl StateLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Layout rooted at [`state_dir`]
    pub fn resolve() -> Result<Self> {
        Ok(Self::new(state_dir()?))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Merged audit results of previous runs
    pub fn audit_file(&self) -> PathBuf {
        self.root.join("audit.json")
    }

    /// Per-task actionable lists
    pub fn diff_dir(&self) -> PathBuf {
        self.root.join("diff")
    }

    /// Run reports
    pub fn reports_dir(&self) -> PathBuf {
        self.root.join("reports")
    }

    pub fn latest_report(&self) -> PathBuf {
        self.reports_dir().join("latest.json")
    }
}

/// Expand ~ and environment variables in a path string.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    /// Helper to run a test with temporary env var
    ///
    /// # Safety
    /// Uses unsafe env::set_var/remove_var; only call from tests that don't
    /// read the same variable concurrently.
    fn with_env_var<F, R>(key: &str, value: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let original = env::var(key).ok();
        // SAFETY: Tests run in isolation and don't read env vars concurrently
        unsafe { env::set_var(key, value) };
        let result = f();
        match original {
            // SAFETY: Tests run in isolation
            Some(v) => unsafe { env::set_var(key, v) },
            None => unsafe { env::remove_var(key) },
        }
        result
    }

    fn without_env_var<F, R>(key: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let original = env::var(key).ok();
        // SAFETY: Tests run in isolation and don't read env vars concurrently
        unsafe { env::remove_var(key) };
        let result = f();
        if let Some(v) = original {
            // SAFETY: Tests run in isolation
            unsafe { env::set_var(key, v) };
        }
        result
    }

    #[test]
    fn test_config_dir_env_override() {
        with_env_var(ENV_CONFIG_DIR, "/custom/upkeep/config", || {
            assert_eq!(config_dir().unwrap(), PathBuf::from("/custom/upkeep/config"));
        });
    }

    #[test]
    fn test_state_dir_env_override() {
        with_env_var(ENV_STATE_DIR, "/custom/upkeep/state", || {
            assert_eq!(state_dir().unwrap(), PathBuf::from("/custom/upkeep/state"));
        });
    }

    #[test]
    fn test_xdg_state_home() {
        without_env_var(ENV_STATE_DIR, || {
            with_env_var("XDG_STATE_HOME", "/tmp/xdg-upkeep-state", || {
                assert_eq!(
                    state_dir().unwrap(),
                    PathBuf::from("/tmp/xdg-upkeep-state/upkeep")
                );
            });
        });
    }

    #[test]
    fn test_config_file_explicit() {
        let path = config_file(Some(Path::new("/etc/upkeep.toml"))).unwrap();
        assert_eq!(path, PathBuf::from("/etc/upkeep.toml"));
    }

    #[test]
    fn test_state_layout() {
        let layout = StateLayout::new("/var/upkeep");
        assert_eq!(layout.audit_file(), PathBuf::from("/var/upkeep/audit.json"));
        assert_eq!(layout.diff_dir(), PathBuf::from("/var/upkeep/diff"));
        assert_eq!(
            layout.latest_report(),
            PathBuf::from("/var/upkeep/reports/latest.json")
        );
    }

    #[test]
    fn test_expand_with_tilde() {
        let result = expand("~/test/path");
        let home = dirs::home_dir().unwrap();
        assert_eq!(result, home.join("test").join("path"));
    }

    #[test]
    fn test_expand_unknown_env_var_unchanged() {
        let result = expand("/path/$UPKEEP_NONEXISTENT_12345/file");
        assert_eq!(result, PathBuf::from("/path/$UPKEEP_NONEXISTENT_12345/file"));
    }
}
