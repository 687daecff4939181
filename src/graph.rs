//! Dependency graph resolution.
//!
//! Turns the `depends_on` relation of a service manifest into ordered
//! start batches via Kahn's algorithm. Services in the same batch have
//! no ordering constraints between them and may start concurrently;
//! every service appears in a batch strictly after all of its
//! dependencies.

use std::collections::{HashMap, HashSet};

use crate::config::ServiceSpec;
use crate::error::{Result, StagehandError};

/// Resolves the manifest into ordered start batches.
///
/// Batch members are sorted by name so the plan is deterministic for a
/// given manifest. Fails with `UnknownDependency` if a service names a
/// dependency that is not defined, or `CycleDetected` naming the
/// services left over once all acyclic prefixes are consumed. On error
/// no partial plan is returned.
pub fn resolve_batches(services: &HashMap<String, ServiceSpec>) -> Result<Vec<Vec<String>>> {
    let mut names: Vec<&String> = services.keys().collect();
    names.sort();

    for name in &names {
        for dep in &services[*name].depends_on {
            if !services.contains_key(dep) {
                return Err(StagehandError::UnknownDependency {
                    service: (*name).clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    // Adjacency list: dependency -> dependents
    let mut adj: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut in_degree: HashMap<&str, usize> = HashMap::new();

    for name in &names {
        adj.entry(name.as_str()).or_default();
        in_degree.entry(name.as_str()).or_insert(0);
    }

    for name in &names {
        for dep in &services[*name].depends_on {
            adj.entry(dep.as_str()).or_default().push(name.as_str());
            *in_degree.entry(name.as_str()).or_insert(0) += 1;
        }
    }

    let mut batches: Vec<Vec<String>> = Vec::new();
    let mut remaining = names.len();

    let mut current: Vec<&str> = in_degree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(name, _)| *name)
        .collect();
    current.sort(); // deterministic ordering

    while !current.is_empty() {
        remaining -= current.len();

        let mut next: Vec<&str> = Vec::new();
        for name in &current {
            if let Some(dependents) = adj.get(name) {
                for &dependent in dependents {
                    if let Some(deg) = in_degree.get_mut(dependent) {
                        *deg -= 1;
                        if *deg == 0 {
                            next.push(dependent);
                        }
                    }
                }
            }
        }

        batches.push(current.iter().map(|s| s.to_string()).collect());
        next.sort();
        current = next;
    }

    if remaining > 0 {
        let processed: HashSet<&str> = batches
            .iter()
            .flatten()
            .map(|s| s.as_str())
            .collect();
        let mut cycled: Vec<String> = names
            .iter()
            .filter(|n| !processed.contains(n.as_str()))
            .map(|n| (*n).clone())
            .collect();
        cycled.sort();
        return Err(StagehandError::CycleDetected { services: cycled });
    }

    Ok(batches)
}

/// Returns the given services plus everything they transitively depend on.
pub fn dependency_closure(
    services: &HashMap<String, ServiceSpec>,
    roots: &[String],
) -> HashSet<String> {
    let mut closure: HashSet<String> = HashSet::new();
    let mut stack: Vec<&str> = roots.iter().map(|s| s.as_str()).collect();

    while let Some(name) = stack.pop() {
        if !closure.insert(name.to_string()) {
            continue;
        }
        if let Some(spec) = services.get(name) {
            for dep in &spec.depends_on {
                stack.push(dep);
            }
        }
    }

    closure
}

/// Returns the given services plus everything that transitively depends on them.
pub fn dependent_closure(
    services: &HashMap<String, ServiceSpec>,
    roots: &[String],
) -> HashSet<String> {
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for (name, spec) in services {
        for dep in &spec.depends_on {
            dependents.entry(dep.as_str()).or_default().push(name.as_str());
        }
    }

    let mut closure: HashSet<String> = HashSet::new();
    let mut stack: Vec<&str> = roots.iter().map(|s| s.as_str()).collect();

    while let Some(name) = stack.pop() {
        if !closure.insert(name.to_string()) {
            continue;
        }
        if let Some(children) = dependents.get(name) {
            stack.extend(children);
        }
    }

    closure
}
