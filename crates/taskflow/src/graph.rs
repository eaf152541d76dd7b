//! Dependency graph - node closure, cycle detection and execution levels
//!
//! Edges point from a task to the tasks it depends on. A name that only
//! appears as a dependency becomes an auto-generated node with no
//! dependencies of its own; [`DependencyGraph::is_declared`] tells the two
//! apart.

use crate::error::{Error, Result};
use crate::task::TaskDescriptor;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;

/// A batch of mutually independent tasks
pub type ExecutionLevel = Vec<String>;

/// Problem found while checking dependency references
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceViolation {
    /// Task lists itself as a dependency
    SelfDependency { task: String },
    /// Task depends on a name no available task provides
    MissingDependency { task: String, dependency: String },
}

impl fmt::Display for ReferenceViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SelfDependency { task } => write!(f, "task '{task}' depends on itself"),
            Self::MissingDependency { task, dependency } => {
                write!(f, "task '{task}' depends on unknown task '{dependency}'")
            }
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Validated-on-demand dependency graph, rebuilt for every run
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: BTreeSet<String>,
    declared: BTreeSet<String>,
    edges: BTreeMap<String, BTreeSet<String>>,
    dependents: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    /// Build a graph from `(name, depends_on)` pairs
    ///
    /// A `None` dependency list means the descriptor lacks the field entirely,
    /// which is a configuration error; an empty list is valid.
    pub fn build<I, S>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Option<Vec<String>>)>,
        S: Into<String>,
    {
        let mut graph = Self::default();

        for (name, deps) in entries {
            let name = name.into();
            let Some(deps) = deps else {
                return Err(Error::configuration(format!(
                    "task '{name}' is missing its depends_on list"
                )));
            };

            graph.nodes.insert(name.clone());
            graph.declared.insert(name.clone());
            let entry = graph.edges.entry(name.clone()).or_default();
            for dep in deps {
                entry.insert(dep);
            }
        }

        // Union closure: dependency-only names become zero-dependency nodes
        let referenced: Vec<String> = graph.edges.values().flatten().cloned().collect();
        for dep in referenced {
            graph.nodes.insert(dep.clone());
            graph.edges.entry(dep).or_default();
        }

        for (name, deps) in &graph.edges {
            for dep in deps {
                graph
                    .dependents
                    .entry(dep.clone())
                    .or_default()
                    .insert(name.clone());
            }
        }

        log::info!(
            "Dependency graph built: {} nodes ({} declared), {} edges",
            graph.nodes.len(),
            graph.declared.len(),
            graph.edge_count()
        );

        Ok(graph)
    }

    /// Build a graph from validated descriptors
    pub fn from_descriptors(descriptors: &[TaskDescriptor]) -> Result<Self> {
        Self::build(descriptors.iter().map(|d| {
            (
                d.name().to_string(),
                Some(d.depends_on().iter().cloned().collect()),
            )
        }))
    }

    /// All node names, declared or auto-generated
    pub fn nodes(&self) -> &BTreeSet<String> {
        &self.nodes
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains(name)
    }

    /// Whether the node came from a descriptor rather than a dependency reference
    pub fn is_declared(&self, name: &str) -> bool {
        self.declared.contains(name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(BTreeSet::len).sum()
    }

    /// Static in-degree: number of direct dependencies
    pub fn in_degree(&self, name: &str) -> usize {
        self.edges.get(name).map_or(0, BTreeSet::len)
    }

    /// Direct dependencies of a task
    pub fn dependencies_of(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.edges.get(name)
    }

    /// Tasks that directly depend on `name`
    pub fn dependents_of(&self, name: &str) -> Vec<&str> {
        self.dependents
            .get(name)
            .map(|d| d.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Every task `name` depends on, directly or not
    pub fn transitive_dependencies(&self, name: &str) -> HashSet<String> {
        let mut visited = HashSet::new();
        let mut stack: Vec<&str> = self
            .edges
            .get(name)
            .map(|d| d.iter().map(String::as_str).collect())
            .unwrap_or_default();

        while let Some(current) = stack.pop() {
            if !visited.insert(current.to_string()) {
                continue;
            }
            if let Some(deps) = self.edges.get(current) {
                stack.extend(deps.iter().map(String::as_str));
            }
        }

        visited.remove(name);
        visited
    }

    /// Check every declared task's references against the available names
    ///
    /// Reports every violation rather than stopping at the first one.
    pub fn validate_references(&self, available: &HashSet<String>) -> Vec<ReferenceViolation> {
        let mut violations = Vec::new();

        for task in &self.declared {
            let Some(deps) = self.edges.get(task) else {
                continue;
            };
            for dep in deps {
                if dep == task {
                    violations.push(ReferenceViolation::SelfDependency { task: task.clone() });
                } else if !available.contains(dep) {
                    violations.push(ReferenceViolation::MissingDependency {
                        task: task.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        violations
    }

    /// Depth-first search with three-colour marking
    ///
    /// Returns the first cycle found as an ordered path whose first and last
    /// entries are the same node. The graph is not modified.
    pub fn validate_acyclic(&self) -> Result<()> {
        let mut marks: HashMap<&str, Mark> =
            self.nodes.iter().map(|n| (n.as_str(), Mark::Unvisited)).collect();

        for start in &self.nodes {
            if marks.get(start.as_str()) != Some(&Mark::Unvisited) {
                continue;
            }

            // Each frame holds a node and the dependencies still to explore
            let mut stack: Vec<(&str, Vec<&str>)> = vec![(start.as_str(), self.children(start))];
            marks.insert(start.as_str(), Mark::InProgress);

            while let Some((node, pending)) = stack.last_mut() {
                let node = *node;
                let Some(next) = pending.pop() else {
                    marks.insert(node, Mark::Done);
                    stack.pop();
                    continue;
                };

                match marks.get(next).copied().unwrap_or(Mark::Unvisited) {
                    Mark::Done => {}
                    Mark::InProgress => {
                        let cycle = Self::cycle_path(&stack, next);
                        log::error!("Circular dependency detected: {}", cycle.join(" -> "));
                        return Err(Error::CircularDependency { cycle });
                    }
                    Mark::Unvisited => {
                        marks.insert(next, Mark::InProgress);
                        stack.push((next, self.children(next)));
                    }
                }
            }
        }

        Ok(())
    }

    fn children(&self, name: &str) -> Vec<&str> {
        // Reversed so that popping explores dependencies in name order
        self.edges
            .get(name)
            .map(|d| d.iter().rev().map(String::as_str).collect())
            .unwrap_or_default()
    }

    fn cycle_path(stack: &[(&str, Vec<&str>)], reentered: &str) -> Vec<String> {
        let start = stack
            .iter()
            .position(|(n, _)| *n == reentered)
            .unwrap_or(0);
        let mut cycle: Vec<String> = stack[start..].iter().map(|(n, _)| n.to_string()).collect();
        cycle.push(reentered.to_string());
        cycle
    }

    /// Kahn's algorithm, draining the whole ready queue as one level
    ///
    /// Tasks inside a level are sorted by name. Every task's dependencies
    /// appear in a strictly earlier level.
    pub fn compute_levels(&self) -> Result<Vec<ExecutionLevel>> {
        // Working copy; the graph's static in-degree stays untouched
        let mut in_degree: HashMap<&str, usize> = self
            .nodes
            .iter()
            .map(|n| (n.as_str(), self.in_degree(n)))
            .collect();

        let mut ready: Vec<&str> = self
            .nodes
            .iter()
            .map(String::as_str)
            .filter(|n| in_degree.get(n) == Some(&0))
            .collect();

        let mut levels: Vec<ExecutionLevel> = Vec::new();
        let mut placed = 0usize;

        while !ready.is_empty() {
            ready.sort_unstable();
            let level: ExecutionLevel = ready.iter().map(|n| (*n).to_string()).collect();
            let mut next = Vec::new();

            for node in &ready {
                let Some(dependents) = self.dependents.get(*node) else {
                    continue;
                };
                for dependent in dependents {
                    if let Some(degree) = in_degree.get_mut(dependent.as_str()) {
                        *degree = degree.saturating_sub(1);
                        if *degree == 0 {
                            next.push(dependent.as_str());
                        }
                    }
                }
            }

            log::debug!("Level {}: {}", levels.len(), level.join(", "));
            placed += level.len();
            levels.push(level);
            ready = next;
        }

        if placed != self.nodes.len() {
            let stuck: Vec<String> = in_degree
                .into_iter()
                .filter(|(_, d)| *d > 0)
                .map(|(n, _)| n.to_string())
                .collect();
            log::error!(
                "Leveling placed {placed} of {} nodes; unresolved: {}",
                self.nodes.len(),
                stuck.join(", ")
            );
            return Err(Error::CircularDependency { cycle: stuck });
        }

        Ok(levels)
    }

    /// Total execution order: levels concatenated in order
    pub fn execution_order(&self) -> Result<Vec<String>> {
        Ok(self.compute_levels()?.into_iter().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(entries: &[(&str, &[&str])]) -> DependencyGraph {
        DependencyGraph::build(entries.iter().map(|(name, deps)| {
            (
                (*name).to_string(),
                Some(deps.iter().map(|d| (*d).to_string()).collect()),
            )
        }))
        .unwrap()
    }

    fn level_of(levels: &[ExecutionLevel], name: &str) -> usize {
        levels
            .iter()
            .position(|l| l.iter().any(|n| n == name))
            .unwrap()
    }

    #[test]
    fn test_build_missing_dependency_field() {
        let err = DependencyGraph::build(vec![
            ("a".to_string(), Some(vec![])),
            ("b".to_string(), None),
        ])
        .unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn test_build_creates_nodes_for_undeclared_dependencies() {
        let g = graph(&[("a", &["ghost"])]);
        assert!(g.contains("ghost"));
        assert!(!g.is_declared("ghost"));
        assert!(g.is_declared("a"));
        assert_eq!(g.in_degree("a"), 1);
        assert_eq!(g.in_degree("ghost"), 0);
        assert_eq!(g.len(), 2);
    }

    #[test]
    fn test_levels_diamond() {
        let g = graph(&[
            ("a", &[]),
            ("b", &["a"]),
            ("c", &["a"]),
            ("d", &["b", "c"]),
        ]);
        let levels = g.compute_levels().unwrap();
        assert_eq!(
            levels,
            vec![
                vec!["a".to_string()],
                vec!["b".to_string(), "c".to_string()],
                vec!["d".to_string()],
            ]
        );
    }

    #[test]
    fn test_levels_respect_every_dependency() {
        let g = graph(&[
            ("audit", &[]),
            ("restore-point", &[]),
            ("bloatware", &["audit", "restore-point"]),
            ("apps", &["audit"]),
            ("updates", &["apps"]),
            ("report", &["bloatware", "updates"]),
        ]);
        let levels = g.compute_levels().unwrap();
        let total: usize = levels.iter().map(Vec::len).sum();
        assert_eq!(total, g.len());

        for node in g.nodes() {
            for dep in g.dependencies_of(node).unwrap() {
                assert!(level_of(&levels, dep) < level_of(&levels, node));
            }
        }
    }

    #[test]
    fn test_zero_dependency_tasks_in_level_zero() {
        let g = graph(&[("x", &[]), ("y", &["x"]), ("z", &[])]);
        let levels = g.compute_levels().unwrap();
        assert!(levels[0].contains(&"x".to_string()));
        assert!(levels[0].contains(&"z".to_string()));
        assert!(!levels[0].contains(&"y".to_string()));
    }

    #[test]
    fn test_execution_order_is_flattened_levels() {
        let g = graph(&[("b", &["a"]), ("a", &[]), ("c", &["b"])]);
        assert_eq!(g.execution_order().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_cycle_detected_with_full_path() {
        let g = graph(&[("a", &["b"]), ("b", &["c"]), ("c", &["a"]), ("d", &[])]);
        let err = g.validate_acyclic().unwrap_err();
        let Error::CircularDependency { cycle } = err else {
            panic!("expected cycle error");
        };
        assert_eq!(cycle.first(), cycle.last());
        assert_eq!(cycle, vec!["a", "b", "c", "a"]);
        assert!(!cycle.contains(&"d".to_string()));
    }

    #[test]
    fn test_cycle_path_excludes_lead_in_nodes() {
        // entry -> x -> y -> x: "entry" leads into the cycle but is not part of it
        let g = graph(&[("entry", &["x"]), ("x", &["y"]), ("y", &["x"])]);
        let Err(Error::CircularDependency { cycle }) = g.validate_acyclic() else {
            panic!("expected cycle error");
        };
        assert_eq!(cycle.first(), cycle.last());
        assert!(!cycle.contains(&"entry".to_string()));
        assert_eq!(cycle.len(), 3);
    }

    #[test]
    fn test_self_loop_is_a_cycle() {
        let g = graph(&[("a", &["a"])]);
        let Err(Error::CircularDependency { cycle }) = g.validate_acyclic() else {
            panic!("expected cycle error");
        };
        assert_eq!(cycle, vec!["a", "a"]);
    }

    #[test]
    fn test_levels_reject_cycle_defensively() {
        let g = graph(&[("a", &["b"]), ("b", &["a"]), ("c", &[])]);
        assert!(matches!(
            g.compute_levels(),
            Err(Error::CircularDependency { .. })
        ));
    }

    #[test]
    fn test_acyclic_graph_validates() {
        let g = graph(&[("a", &[]), ("b", &["a"]), ("c", &["a", "b"])]);
        assert!(g.validate_acyclic().is_ok());
    }

    #[test]
    fn test_transitive_dependencies() {
        let g = graph(&[
            ("a", &[]),
            ("b", &["a"]),
            ("c", &["b"]),
            ("d", &["c", "a"]),
        ]);
        let deps = g.transitive_dependencies("d");
        let expected: HashSet<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        assert_eq!(deps, expected);
        assert!(g.transitive_dependencies("a").is_empty());
        assert!(g.transitive_dependencies("missing").is_empty());
    }

    #[test]
    fn test_dependents_of() {
        let g = graph(&[("a", &[]), ("b", &["a"]), ("c", &["a"])]);
        assert_eq!(g.dependents_of("a"), vec!["b", "c"]);
        assert!(g.dependents_of("c").is_empty());
    }

    #[test]
    fn test_validate_references_reports_everything() {
        let g = graph(&[("a", &["a", "ghost"]), ("b", &["phantom"]), ("c", &["a"])]);
        let available: HashSet<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        let violations = g.validate_references(&available);
        assert_eq!(violations.len(), 3);
        assert!(violations.contains(&ReferenceViolation::SelfDependency { task: "a".into() }));
        assert!(violations.contains(&ReferenceViolation::MissingDependency {
            task: "a".into(),
            dependency: "ghost".into()
        }));
        assert!(violations.contains(&ReferenceViolation::MissingDependency {
            task: "b".into(),
            dependency: "phantom".into()
        }));
    }
}
