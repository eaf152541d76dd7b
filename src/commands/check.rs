use anyhow::{Result, bail};
use std::collections::HashSet;

use super::load_config;
use crate::Context;
use crate::catalog::{self, EntryRegistry};
use crate::ui;
use taskflow::Engine;

/// Validate the catalog and report every problem found
pub fn run(ctx: &Context) -> Result<()> {
    let loaded = load_config(ctx)?;
    let registry = EntryRegistry::with_builtins();

    ui::header("Catalog check");
    ui::kv("config", &loaded.path.display().to_string());
    ui::kv("tasks", &loaded.config.tasks.len().to_string());

    let discovery = catalog::discover(
        &loaded.config.tasks,
        &registry,
        loaded.config.execution.default_timeout_secs,
    );
    let mut problems = discovery.problems;

    let mut engine = Engine::new();
    for descriptor in discovery.descriptors {
        if let Err(e) = engine.register_task(descriptor) {
            problems.push(e.to_string());
        }
    }
    problems.extend(graph_problems(&engine)?);

    println!();
    if problems.is_empty() {
        ui::success("Catalog is valid");
        return Ok(());
    }

    for problem in &problems {
        ui::error(problem);
    }
    bail!("{} catalog problem(s) found", problems.len())
}

/// Reference violations plus a cycle, if any
fn graph_problems(engine: &Engine) -> Result<Vec<String>> {
    let graph = engine.graph()?;
    let declared: HashSet<String> = engine
        .descriptors()
        .iter()
        .map(|d| d.name().to_string())
        .collect();

    let mut problems: Vec<String> = graph
        .validate_references(&declared)
        .iter()
        .map(ToString::to_string)
        .collect();
    if let Err(e) = graph.validate_acyclic() {
        problems.push(e.to_string());
    }
    Ok(problems)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::build_engine;
    use taskflow::TaskSpec;

    fn engine(specs: serde_json::Value) -> Engine {
        let specs: Vec<TaskSpec> = serde_json::from_value(specs).unwrap();
        build_engine(&specs, &EntryRegistry::with_builtins(), 60).unwrap()
    }

    #[test]
    fn test_clean_catalog() {
        let engine = engine(serde_json::json!([
            {"name": "a", "entry": "noop", "depends_on": []},
            {"name": "b", "entry": "noop", "depends_on": ["a"]},
        ]));
        assert!(graph_problems(&engine).unwrap().is_empty());
    }

    #[test]
    fn test_reports_missing_and_cycle() {
        let engine = engine(serde_json::json!([
            {"name": "a", "entry": "noop", "depends_on": ["b"]},
            {"name": "b", "entry": "noop", "depends_on": ["a"]},
            {"name": "c", "entry": "noop", "depends_on": ["ghost"]},
        ]));
        let problems = graph_problems(&engine).unwrap();
        assert_eq!(problems.len(), 2);
        assert!(problems.iter().any(|p| p.contains("ghost")));
        assert!(problems.iter().any(|p| p.contains("circular")));
    }
}
