use anyhow::Result;
use colored::Colorize;

use super::Session;
use crate::Context;
use crate::ui;

/// Print the execution levels of the catalog
pub fn run(ctx: &Context) -> Result<()> {
    let session = Session::open(ctx)?;
    let graph = session.engine.graph()?;
    let levels = session.engine.levels()?;

    ui::header("Execution levels");
    ui::kv("tasks", &session.engine.descriptors().len().to_string());
    ui::kv("edges", &graph.edge_count().to_string());

    for (index, level) in levels.iter().enumerate() {
        ui::section(&format!("Level {index}"));
        for name in level {
            if graph.is_declared(name) {
                println!("  • {name}");
            } else {
                println!("  • {} {}", name.dimmed(), "(undeclared, never runs)".yellow());
            }
        }
    }

    Ok(())
}
