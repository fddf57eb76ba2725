use std::{
    collections::{BTreeMap, HashSet},
    fmt::Display,
    sync::Arc,
};

use thiserror::Error;

use crate::{
    module::Module,
    wrapper::{InstanceWrapper, WrapperId},
};

/// Graph of the linked components of an application
/// Used to check circular dependencies and enables visualization of the APP
#[derive(Default)]
pub struct DependencyGraph {
    map: BTreeMap<WrapperId, DependencyGraphEntry>,
}

impl DependencyGraph {
    /// Builds the graph of every linked wrapper of the modules
    pub fn new(modules: &[Arc<Module>]) -> Self {
        let mut graph = Self::default();
        for module in modules {
            for wrapper in module.wrappers() {
                graph.add(module, &wrapper);
            }
        }
        graph
    }

    pub fn add(&mut self, module: &Module, wrapper: &InstanceWrapper) {
        let dependencies = wrapper
            .eager_edges()
            .into_iter()
            .map(|(slot, target)| DependencyEdge {
                slot,
                target: target.id(),
                name: target.name().to_string(),
            })
            .collect();
        self.map.insert(
            wrapper.id(),
            DependencyGraphEntry {
                name: wrapper.name().to_string(),
                module: module.name(),
                dependencies,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Validate the graph
    ///
    /// Returns a list of all issues
    pub fn check(&self) -> Result<(), DependencyGraphErrors> {
        let mut checked = HashSet::new();
        let mut errors = Vec::new();
        for (id, entry) in &self.map {
            let mut dependency_chain = Vec::new();
            check_recurse(self, &mut checked, &mut errors, &mut dependency_chain, *id, entry);
        }

        if !errors.is_empty() {
            return Err(DependencyGraphErrors { errors });
        }

        return Ok(());

        fn check_recurse<'a>(
            graph: &'a DependencyGraph,
            checked: &mut HashSet<WrapperId>,
            errors: &mut Vec<DependencyGraphError>,
            dependency_chain: &mut Vec<(WrapperId, &'a str)>,
            id: WrapperId,
            entry: &'a DependencyGraphEntry,
        ) {
            // Circular Dependency Check
            if let Some(start) = dependency_chain.iter().position(|(seen, _)| *seen == id) {
                let mut chain = dependency_chain[start..]
                    .iter()
                    .map(|(_, name)| name.to_string())
                    .collect::<Vec<_>>();
                chain.push(entry.name.clone());

                errors.push(DependencyGraphError::CircularDependency {
                    from: dependency_chain[start].1.to_string(),
                    to: dependency_chain
                        .last()
                        .map(|(_, name)| name.to_string())
                        .unwrap_or_default(),
                    chain,
                });
            }

            // Skip other checks if already checked
            if !checked.insert(id) {
                return;
            };

            dependency_chain.push((id, &entry.name));

            // Lazy edges are not part of the graph, they are resolved after their consumer
            for dependency in &entry.dependencies {
                let Some(next_entry) = graph.map.get(&dependency.target) else {
                    continue;
                };
                check_recurse(graph, checked, errors, dependency_chain, dependency.target, next_entry);
            }

            dependency_chain.pop();
        }
    }
}

impl Display for DependencyGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for entry in self.map.values() {
            writeln!(f, "{} ({})", entry.name, entry.module)?;
            for dependency in &entry.dependencies {
                writeln!(f, "  {} -> {}", dependency.slot, dependency.name)?;
            }
        }
        Ok(())
    }
}

struct DependencyEdge {
    /// Constructor index or property key
    slot: String,
    target: WrapperId,
    name: String,
}

struct DependencyGraphEntry {
    name: String,
    module: &'static str,
    dependencies: Vec<DependencyEdge>,
}

#[derive(Error, Debug, Clone)]
pub enum DependencyGraphError {
    #[error("A Circular Dependency exists between '{from}' and '{to}' through {} - Consider using `Lazy`", .chain.join(" -> "))]
    CircularDependency {
        from: String,
        to: String,
        chain: Vec<String>,
    },
}

impl std::fmt::Display for DependencyGraphErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut display = Vec::new();
        display.push("The dependency graph had one or more errors:".to_string());
        for error in &self.errors {
            display.push(format!("- {}", error));
        }
        f.write_str(&display.join("\n"))
    }
}

#[derive(Error, Debug, Clone)]
pub struct DependencyGraphErrors {
    pub errors: Vec<DependencyGraphError>,
}
