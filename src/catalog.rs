//! Task discovery: turns `[[tasks]]` entries into registered descriptors

use crate::builtins;
use std::collections::BTreeMap;
use taskflow::{Engine, SharedEntry, TaskDescriptor, TaskSpec};
use thiserror::Error;

/// Every problem found while building the catalog
#[derive(Debug, Error)]
#[error("invalid task catalog:\n  - {}", problems.join("\n  - "))]
pub struct CatalogError {
    pub problems: Vec<String>,
}

/// Entry points catalog tasks may refer to by name
pub struct EntryRegistry {
    entries: BTreeMap<String, SharedEntry>,
}

impl EntryRegistry {
    /// Registry without any entry points
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Registry holding the built-in entry points
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        for (name, entry) in builtins::all() {
            registry.register(name, entry);
        }
        registry
    }

    pub fn register(&mut self, name: &str, entry: SharedEntry) {
        self.entries.insert(name.to_string(), entry);
    }

    pub fn resolve(&self, name: &str) -> Option<SharedEntry> {
        self.entries.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

/// Validated descriptors plus the problems found along the way
pub struct Discovery {
    pub descriptors: Vec<TaskDescriptor>,
    pub problems: Vec<String>,
}

/// Resolve and validate every spec, collecting all problems
pub fn discover(specs: &[TaskSpec], registry: &EntryRegistry, default_timeout_secs: i64) -> Discovery {
    let mut descriptors = Vec::with_capacity(specs.len());
    let mut problems = Vec::new();

    for spec in specs {
        let Some(entry) = registry.resolve(&spec.entry) else {
            problems.push(format!(
                "task '{}': unknown entry point '{}' (available: {})",
                spec.name,
                spec.entry,
                registry.names().collect::<Vec<_>>().join(", ")
            ));
            continue;
        };

        match TaskDescriptor::from_spec(spec.clone(), entry, default_timeout_secs) {
            Ok(descriptor) => descriptors.push(descriptor),
            Err(e) => problems.push(e.to_string()),
        }
    }

    log::debug!(
        "Discovered {} tasks ({} problems)",
        descriptors.len(),
        problems.len()
    );
    Discovery {
        descriptors,
        problems,
    }
}

/// Build an engine from the catalog, failing with every problem at once
pub fn build_engine(
    specs: &[TaskSpec],
    registry: &EntryRegistry,
    default_timeout_secs: i64,
) -> Result<Engine, CatalogError> {
    let Discovery {
        descriptors,
        mut problems,
    } = discover(specs, registry, default_timeout_secs);

    let mut engine = Engine::new();
    for descriptor in descriptors {
        if let Err(e) = engine.register_task(descriptor) {
            problems.push(e.to_string());
        }
    }

    if problems.is_empty() {
        Ok(engine)
    } else {
        Err(CatalogError { problems })
    }
}
