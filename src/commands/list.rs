use anyhow::Result;
use colored::Colorize;

use super::Session;
use crate::Context;
use crate::ui;
use taskflow::TaskDescriptor;

pub fn run(ctx: &Context) -> Result<()> {
    let session = Session::open(ctx)?;
    let descriptors = session.engine.descriptors();

    ui::header("Tasks");
    if descriptors.is_empty() {
        ui::info("No tasks configured");
        return Ok(());
    }

    let width = descriptors.iter().map(|d| d.name().len()).max().unwrap_or(0);
    for descriptor in descriptors {
        let skipped = session.loaded.config.is_skipped(descriptor.name());
        let name = format!("{:width$}", descriptor.name());
        println!(
            "  {} {} {}{}",
            if skipped { name.dimmed() } else { name.bold() },
            format!("[{}]", descriptor.category()).cyan(),
            describe(descriptor).dimmed(),
            if skipped { " (skipped)".yellow().to_string() } else { String::new() }
        );
    }

    println!();
    ui::dim(&format!("{} tasks", descriptors.len()));
    Ok(())
}

/// Entry, dependencies, timeout and flags on one line
fn describe(descriptor: &TaskDescriptor) -> String {
    let mut parts = vec![
        format!("entry={}", descriptor.entry_name()),
        format!("timeout={}s", descriptor.timeout().as_secs()),
    ];
    if !descriptor.depends_on().is_empty() {
        let deps: Vec<&str> = descriptor.depends_on().iter().map(String::as_str).collect();
        parts.push(format!("after={}", deps.join(",")));
    }
    if descriptor.requires_elevation() {
        parts.push("root".to_string());
    }
    if let Some(key) = descriptor.audit_key() {
        parts.push(format!("audit={key}"));
    }
    parts.join(" ")
}
