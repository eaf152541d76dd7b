use colored::{ColoredString, Colorize};
use taskflow::{ExecutionResult, RunSummary, Status};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

// ============================================================================
// Results
// ============================================================================

/// Status symbol, colored by outcome
pub fn status_symbol(status: Status) -> ColoredString {
    match status {
        Status::Success => "✓".green(),
        Status::DryRun => "○".blue(),
        Status::PartialSuccess => "◐".yellow(),
        Status::Skipped => "–".dimmed(),
        Status::Cancelled => "⊘".yellow(),
        Status::Timeout => "⏱".red(),
        Status::Failed | Status::DependencyFailure => "✗".red(),
        Status::Pending | Status::Running => "…".dimmed(),
    }
}

/// One line describing a finished task
pub fn result_line(result: &ExecutionResult) -> String {
    let mut line = format!(
        "  {} {} {} {}",
        status_symbol(result.status()),
        result.task().bold(),
        result.status().as_str().dimmed(),
        format_duration(result.duration_secs()).dimmed()
    );
    if let Some(error) = result.error()
        && result.status() != Status::Skipped
    {
        line.push_str(&format!("\n      {}", truncate(error, 160).red()));
    }
    for warning in result.warnings() {
        line.push_str(&format!("\n      {} {}", "⚠".yellow(), truncate(warning, 160)));
    }
    line
}

/// Print final summary
pub fn print_summary(summary: &RunSummary, dry_run: bool) {
    println!();
    if summary.is_success() {
        let msg = if dry_run {
            "Dry run finished - no changes made"
        } else {
            "All tasks finished"
        };
        println!("  {} {}", "✓".green().bold(), msg);
    } else {
        println!(
            "  {} {} of {} tasks did not succeed",
            "⚠".yellow().bold(),
            summary.problems(),
            summary.total()
        );
    }

    let counts = [
        (summary.success, "succeeded"),
        (summary.dry_run, "dry run"),
        (summary.partial_success, "partial (not elevated)"),
        (summary.skipped, "skipped"),
        (summary.failed, "failed"),
        (summary.timeout, "timed out"),
        (summary.dependency_failure, "blocked by dependencies"),
        (summary.cancelled, "cancelled"),
    ];
    for (count, label) in counts {
        if count > 0 {
            println!("    • {count} {label}");
        }
    }
}

/// Format seconds for display
pub fn format_duration(secs: f64) -> String {
    if secs < 1.0 {
        format!("{:.0}ms", secs * 1000.0)
    } else if secs < 60.0 {
        format!("{secs:.1}s")
    } else {
        format!("{}m{:02}s", (secs / 60.0) as u64, (secs % 60.0) as u64)
    }
}

/// Shorten a message to at most `max` characters
pub fn truncate(msg: &str, max: usize) -> String {
    if msg.chars().count() <= max {
        msg.to_string()
    } else if max <= 3 {
        "...".to_string()
    } else {
        let kept: String = msg.chars().take(max - 3).collect();
        format!("{kept}...")
    }
}

// ============================================================================
// Tests
// ============================================================================
