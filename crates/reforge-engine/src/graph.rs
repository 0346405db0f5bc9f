//! Dependency graph
//!
//! A pure adjacency store over registered units. An edge `dependent ->
//! dependency` means the dependent cannot be correctly loaded unless the
//! dependency is loaded first, and must be reloaded whenever the
//! dependency's code changes. Edges are derived from host-reported
//! declarations and replaced wholesale per unit; the graph never computes
//! transitive closure (that is the impact analyzer's job) and never resolves
//! cycles (that is the planner's).

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use reforge_kernel::{ReloadError, ReloadResult};

#[derive(Default)]
struct GraphInner {
    nodes: BTreeSet<String>,
    /// unit -> units it depends on (outgoing edges)
    dependencies: BTreeMap<String, BTreeSet<String>>,
    /// unit -> units that depend on it (reverse index)
    dependents: BTreeMap<String, BTreeSet<String>>,
}

impl GraphInner {
    fn drop_outgoing(&mut self, unit: &str) {
        if let Some(old) = self.dependencies.remove(unit) {
            for dep in old {
                if let Some(rev) = self.dependents.get_mut(&dep) {
                    rev.remove(unit);
                }
            }
        }
    }
}

/// Directed dependency graph over extension units.
///
/// B-tree storage keeps every iteration order deterministic, which the
/// planner's tie-break relies on.
pub struct DependencyGraph {
    inner: Arc<RwLock<GraphInner>>,
}

impl DependencyGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(GraphInner::default())),
        }
    }

    /// Add a node. Idempotent.
    pub async fn add_node(&self, unit: &str) {
        let mut inner = self.inner.write().await;
        inner.nodes.insert(unit.to_string());
    }

    /// Remove a node and every edge touching it.
    pub async fn remove_node(&self, unit: &str) -> ReloadResult<()> {
        let mut inner = self.inner.write().await;

        if !inner.nodes.remove(unit) {
            return Err(ReloadError::UnknownUnit(unit.to_string()));
        }

        inner.drop_outgoing(unit);

        // Strip incoming edges too.
        if let Some(dependents) = inner.dependents.remove(unit) {
            for dependent in dependents {
                if let Some(deps) = inner.dependencies.get_mut(&dependent) {
                    deps.remove(unit);
                }
            }
        }

        Ok(())
    }

    /// Whether the graph knows this node.
    pub async fn contains(&self, unit: &str) -> bool {
        let inner = self.inner.read().await;
        inner.nodes.contains(unit)
    }

    /// Replace all outgoing edges from `unit` with the supplied set.
    ///
    /// Idempotent: calling twice with the same set is a no-op. Fails with
    /// `DanglingDependency` naming the first offending dependency that is
    /// not a known node; the graph is left unchanged in that case.
    pub async fn update_edges(&self, unit: &str, deps: &[String]) -> ReloadResult<()> {
        let mut inner = self.inner.write().await;

        if !inner.nodes.contains(unit) {
            return Err(ReloadError::UnknownUnit(unit.to_string()));
        }

        // Validate before mutating anything.
        for dep in deps {
            if !inner.nodes.contains(dep) {
                return Err(ReloadError::DanglingDependency {
                    unit: unit.to_string(),
                    dependency: dep.clone(),
                });
            }
        }

        debug!("Updating edges of {}: {:?}", unit, deps);

        inner.drop_outgoing(unit);

        let dep_set: BTreeSet<String> = deps.iter().cloned().collect();
        for dep in &dep_set {
            inner
                .dependents
                .entry(dep.clone())
                .or_default()
                .insert(unit.to_string());
        }
        inner.dependencies.insert(unit.to_string(), dep_set);

        Ok(())
    }

    /// Units that directly depend on `unit` (would be impacted if it
    /// changes).
    pub async fn dependents_of(&self, unit: &str) -> ReloadResult<BTreeSet<String>> {
        let inner = self.inner.read().await;

        if !inner.nodes.contains(unit) {
            return Err(ReloadError::UnknownUnit(unit.to_string()));
        }

        Ok(inner.dependents.get(unit).cloned().unwrap_or_default())
    }

    /// Units that `unit` directly depends on.
    pub async fn dependencies_of(&self, unit: &str) -> ReloadResult<BTreeSet<String>> {
        let inner = self.inner.read().await;

        if !inner.nodes.contains(unit) {
            return Err(ReloadError::UnknownUnit(unit.to_string()));
        }

        Ok(inner.dependencies.get(unit).cloned().unwrap_or_default())
    }

    /// All edges as `(dependent, dependency)` pairs, sorted. Used for
    /// read-only status reporting.
    pub async fn edges(&self) -> Vec<(String, String)> {
        let inner = self.inner.read().await;
        inner
            .dependencies
            .iter()
            .flat_map(|(unit, deps)| {
                deps.iter()
                    .map(move |dep| (unit.clone(), dep.clone()))
            })
            .collect()
    }

    /// Number of nodes.
    pub async fn node_count(&self) -> usize {
        let inner = self.inner.read().await;
        inner.nodes.len()
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}
