use anyhow::Result;
use colored::Colorize;

use super::Session;
use crate::Context;
use crate::state::AuditStore;
use crate::ui;
use taskflow::{NoPersist, build_diff_set};

/// Show the diff plan rows and what each enabled row would hand its task
pub fn run(ctx: &Context) -> Result<()> {
    let session = Session::open(ctx)?;
    let plan = session.loaded.diff_plan();
    let audit = AuditStore::load(&session.layout.audit_file())?;

    ui::header("Diff plan");
    ui::kv("config", &session.loaded.path.display().to_string());
    ui::kv("audit", &session.layout.audit_file().display().to_string());

    if plan.entries().is_empty() {
        println!();
        ui::info("No diff plan rows configured");
        return Ok(());
    }

    let diffs = build_diff_set(&plan, audit.results(), &session.loaded.document, &NoPersist);

    ui::section("Rows");
    for entry in plan.entries() {
        let state = if entry.enabled {
            "enabled".green()
        } else {
            "disabled".dimmed()
        };
        println!(
            "  {} {} {} {}",
            entry.task.bold(),
            format!("[{}]", entry.strategy).cyan(),
            format!("{} -> {}", entry.audit_key, entry.config_section).dimmed(),
            state
        );

        if let Some(diff) = diffs.get(&entry.task) {
            ui::dim(&diff.reason);
            for item in diff.actionable.iter().take(5) {
                ui::dim(&format!("  • {}", ui::truncate(&item_label(item, &entry.match_field), 100)));
            }
            if diff.actionable_count() > 5 {
                ui::dim(&format!("  ... and {} more", diff.actionable_count() - 5));
            }
        } else if let Some(flag) = &entry.skip_flag {
            ui::dim(&format!("skipped via [skip] {flag}"));
        }
    }

    Ok(())
}

/// Display text for one detection
fn item_label(item: &serde_json::Value, field: &str) -> String {
    match item {
        serde_json::Value::String(s) => s.clone(),
        other => other
            .get(field)
            .and_then(|v| v.as_str())
            .map_or_else(|| other.to_string(), str::to_string),
    }
}
