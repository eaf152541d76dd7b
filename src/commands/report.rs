use anyhow::Result;

use crate::Context;
use crate::cli::ReportArgs;
use crate::paths::StateLayout;
use crate::state::{RunReport, load_latest_report};
use crate::ui;

/// Show the most recent run report
pub fn run(ctx: &Context, args: ReportArgs) -> Result<()> {
    let layout = StateLayout::resolve()?;
    let Some(mut report) = load_latest_report(&layout.latest_report())? else {
        if !ctx.quiet {
            ui::info("No runs recorded yet");
        }
        return Ok(());
    };

    if args.failed {
        keep_problems(&mut report);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    ui::header("Last run");
    ui::kv("correlation id", &report.correlation_id);
    ui::kv(
        "finished",
        &report.generated_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    );
    ui::kv("mode", if report.dry_run { "dry run" } else { "live" });
    println!();

    if report.results.is_empty() && args.failed {
        ui::success("No problems in the last run");
    }
    for result in &report.results {
        println!("{}", ui::result_line(result));
    }

    ui::print_summary(&report.summary, report.dry_run);
    Ok(())
}

/// Drop results that ended well; the summary still covers the whole run
fn keep_problems(report: &mut RunReport) {
    report
        .results
        .retain(|r| !r.is_successful() && r.status() != taskflow::Status::Skipped);
}
