use anyhow::{Context, Result};
use std::process::{Command, Stdio};

/// Run a command with extra environment and capture stdout
///
/// Fails with the trimmed stderr when the command exits non-zero.
pub fn run_capture_with_env(cmd: &str, args: &[String], envs: &[(&str, String)]) -> Result<String> {
    let output = Command::new(cmd)
        .args(args)
        .envs(envs.iter().map(|(k, v)| (*k, v.as_str())))
        .stdin(Stdio::null())
        .output()
        .with_context(|| format!("Failed to execute: {} {}", cmd, args.join(" ")))?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let code = output
            .status
            .code()
            .map_or_else(|| "signal".to_string(), |c| c.to_string());
        anyhow::bail!("Command failed ({code}): {}", stderr.trim())
    }
}

/// Run a command silently, returning success/failure
#[cfg_attr(not(windows), allow(dead_code))]
pub fn run_quiet(cmd: &str, args: &[&str]) -> bool {
    Command::new(cmd)
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}
